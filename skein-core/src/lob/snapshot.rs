//! Snapshot-driven book adapter
//!
//! The second LOB path: instead of order events it consumes the periodic
//! wire snapshots and derives the per-period series the resampler and
//! feature math read: elapsed time, traded volume/turnover, period
//! vwap, inferred trade direction, spread and mid. Each derived value is
//! appended to its own `CBuf` so downstream code always sees an aligned
//! rolling window per field.

use crate::cbuf::CBuf;
use crate::core::{price_to_cny, SnapshotRecord};

/// Rolling window length shared by all per-field buffers.
pub const SNAPSHOT_WINDOW: usize = 100;

/// Per-period series derived from the snapshot stream.
pub struct SnapshotBook {
    pub day: CBuf<u32, 2>,
    pub delta_t: CBuf<u16, SNAPSHOT_WINDOW>,
    pub prices: CBuf<f32, SNAPSHOT_WINDOW>,
    pub volumes: CBuf<f32, SNAPSHOT_WINDOW>,
    pub turnovers: CBuf<f32, SNAPSHOT_WINDOW>,
    pub vwaps: CBuf<f32, SNAPSHOT_WINDOW>,
    /// 0 price up (or buy), 1 price down (or sell).
    pub directions: CBuf<u8, SNAPSHOT_WINDOW>,
    pub spreads: CBuf<f32, SNAPSHOT_WINDOW>,
    pub mid_prices: CBuf<f32, SNAPSHOT_WINDOW>,

    last_seconds_in_day: u32,
}

impl Default for SnapshotBook {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBook {
    pub fn new() -> Self {
        Self {
            day: CBuf::new(),
            delta_t: CBuf::new(),
            prices: CBuf::new(),
            volumes: CBuf::new(),
            turnovers: CBuf::new(),
            vwaps: CBuf::new(),
            directions: CBuf::new(),
            spreads: CBuf::new(),
            mid_prices: CBuf::new(),
            last_seconds_in_day: 0,
        }
    }

    /// Ingest one gated snapshot.
    ///
    /// `is_session_start` zeroes the time delta and the inferred
    /// direction (no prior period to compare against).
    pub fn update(&mut self, snap: &SnapshotRecord, is_session_start: bool) {
        let delta_t = if is_session_start {
            0
        } else {
            snap.seconds_in_day.saturating_sub(self.last_seconds_in_day) as u16
        };

        let best_bid = price_to_cny(snap.best_bid());
        let best_ask = price_to_cny(snap.best_ask());
        let mid = (best_bid + best_ask) * 0.5;
        let spread = best_ask - best_bid;

        // Wire volume is in lots of 100 shares; turnover in CNY
        let volume = snap.volume as f32 * 100.0;
        let turnover = snap.turnover as f32;
        let prev_vwap = if self.vwaps.is_empty() {
            0.0
        } else {
            *self.vwaps.back()
        };
        let vwap = if volume > 0.0 { turnover / volume } else { prev_vwap };

        // Direction: the period's vwap move decides; an unchanged vwap
        // falls back to the snapshot's recorded last-trade direction
        let direction = if is_session_start {
            0
        } else if vwap == prev_vwap {
            snap.direction
        } else {
            u8::from(vwap < prev_vwap)
        };

        self.day.push_back(snap.date_key());
        self.delta_t.push_back(delta_t);
        self.prices.push_back(price_to_cny(snap.latest_price));
        self.volumes.push_back(volume);
        self.turnovers.push_back(turnover);
        self.vwaps.push_back(vwap);
        self.directions.push_back(direction);
        self.spreads.push_back(spread);
        self.mid_prices.push_back(mid);

        self.last_seconds_in_day = snap.seconds_in_day;
    }

    pub fn clear(&mut self) {
        self.day.clear();
        self.delta_t.clear();
        self.prices.clear();
        self.volumes.clear();
        self.turnovers.clear();
        self.vwaps.clear();
        self.directions.clear();
        self.spreads.clear();
        self.mid_prices.clear();
        self.last_seconds_in_day = 0;
    }
}
