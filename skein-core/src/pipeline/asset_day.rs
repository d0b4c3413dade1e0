//! Per-asset per-day processing context
//!
//! Owns every piece of streaming state for one asset-day: the deduction
//! book fed by the order stream, the session gate and snapshot adapter,
//! the run-bar resampler, the feature cascade, and the columnar store.
//! All components run strictly sequentially on the worker's thread;
//! nothing here blocks or suspends.

use crate::core::{price_to_cny, OrderEvent, RunBar, SnapshotRecord};
use crate::features::{
    FeatureCascade, FlowCounters, HourFeatureEngine, MinuteFeatureEngine, TickFeatureEngine,
    HOUR_FEATURES, MINUTE_FEATURES, TICK_FEATURES,
};
use crate::lob::{DeductionBook, DepthView, SnapshotBook};
use crate::sample::{RunBarConfig, RunBarResampler};
use crate::session::SessionGate;
use crate::store::{ColumnType, FeatureStore, PublicationHandle, RowValue, StoreLevel};

/// Row-count hints for the store: ~4 h of 3 s ticks, minutes, hours.
const TICK_CAPACITY: usize = 4800;
const MINUTE_CAPACITY: usize = 256;
const HOUR_CAPACITY: usize = 8;

/// Counters reported per finished asset-day.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetDayStats {
    pub order_events: u64,
    pub snapshots_seen: u64,
    pub snapshots_open: u64,
    pub tick_rows: u64,
    pub minute_rows: u64,
    pub hour_rows: u64,
    pub run_bars: u64,
    pub rejected_events: u64,
}

pub struct AssetDayContext {
    asset: String,

    book: DeductionBook,
    gate: SessionGate,
    snapshot_book: SnapshotBook,
    run_bars: RunBarResampler,
    flow: FlowCounters,

    tick_engine: TickFeatureEngine,
    minute_engine: MinuteFeatureEngine,
    hour_engine: HourFeatureEngine,
    cascade: FeatureCascade,

    store: FeatureStore,
    snapshots: Vec<SnapshotRecord>,
    bars: Vec<RunBar>,
    stats: AssetDayStats,
}

impl AssetDayContext {
    pub fn new(asset: impl Into<String>) -> Self {
        let tick_schema: Vec<(&'static str, ColumnType)> = TICK_FEATURES
            .iter()
            .map(|&name| (name, ColumnType::F32))
            .collect();

        let mut minute_schema: Vec<(&'static str, ColumnType)> = vec![
            ("mn_close", ColumnType::F64),
            ("mn_vwap", ColumnType::F64),
            ("mn_volume", ColumnType::U64),
        ];
        minute_schema.extend(MINUTE_FEATURES.iter().map(|&name| (name, ColumnType::F32)));

        let mut hour_schema: Vec<(&'static str, ColumnType)> = vec![
            ("hr_close", ColumnType::F64),
            ("hr_vwap", ColumnType::F64),
            ("hr_volume", ColumnType::U64),
            ("hr_prev_day_close", ColumnType::F64),
        ];
        hour_schema.extend(HOUR_FEATURES.iter().map(|&name| (name, ColumnType::F32)));

        let store = FeatureStore::new(
            [
                tick_schema.as_slice(),
                minute_schema.as_slice(),
                hour_schema.as_slice(),
            ],
            [TICK_CAPACITY, MINUTE_CAPACITY, HOUR_CAPACITY],
        );

        Self {
            asset: asset.into(),
            book: DeductionBook::new(),
            gate: SessionGate::new(),
            snapshot_book: SnapshotBook::new(),
            run_bars: RunBarResampler::new(RunBarConfig::for_snapshots()),
            flow: FlowCounters::new(),
            tick_engine: TickFeatureEngine::new(),
            minute_engine: MinuteFeatureEngine::new(),
            hour_engine: HourFeatureEngine::new(),
            cascade: FeatureCascade::new(),
            store,
            snapshots: Vec::with_capacity(TICK_CAPACITY),
            bars: Vec::with_capacity(1024),
            stats: AssetDayStats::default(),
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Replay one order-stream event into the book and flow tallies.
    #[inline]
    pub fn process_order(&mut self, event: &OrderEvent) {
        let accepted = self.book.apply(event);
        if !accepted {
            self.stats.rejected_events += 1;
            return;
        }
        self.stats.order_events += 1;
        let best_bid = price_to_cny(self.book.best_bid());
        let best_ask = price_to_cny(self.book.best_ask());
        self.flow.record(event, best_bid, best_ask);
    }

    /// Process one snapshot through the gate and, when the market is
    /// open, through every downstream component. Returns the run bar if
    /// this tick closed one.
    pub fn process_snapshot(&mut self, snap: &SnapshotRecord) -> Option<RunBar> {
        self.stats.snapshots_seen += 1;
        self.gate.update(snap.hour, snap.minute);
        if !self.gate.is_open() {
            return None;
        }
        self.stats.snapshots_open += 1;

        self.snapshot_book.update(snap, self.gate.is_session_start());
        self.snapshots.push(*snap);

        // Tick features: book depth when the order stream built one,
        // otherwise the snapshot's own levels
        let depth = if self.book.total_orders() > 0 {
            DepthView::from_book(&self.book)
        } else {
            DepthView::from_snapshot(snap)
        };
        let flow_window = self.flow.take();
        let delta_t = *self.snapshot_book.delta_t.back() as f32;
        if let Some(row) = self.tick_engine.update(&depth, &flow_window, delta_t) {
            let values: Vec<RowValue> = row.iter().map(|&z| RowValue::F32(z)).collect();
            self.store.push_row(StoreLevel::Tick, &values, 0);
            self.stats.tick_rows += 1;
        }

        // Cascade: minute / hour bars trigger their engines; each row
        // points back at the newest row of its parent level
        let mid = *self.snapshot_book.mid_prices.back() as f64;
        let shares = snap.volume as u64 * 100;
        let out = self.cascade.on_tick(mid, shares, snap.hour, snap.minute);
        if let Some(minute_bar) = out.minute {
            let feats = self.minute_engine.update(&minute_bar);
            let parent = self.store.size(StoreLevel::Tick).saturating_sub(1) as u32;
            let mut values = vec![
                RowValue::F64(minute_bar.close),
                RowValue::F64(minute_bar.vwap),
                RowValue::U64(minute_bar.volume),
            ];
            values.extend(feats.iter().map(|&z| RowValue::F32(z)));
            self.store.push_row(StoreLevel::Minute, &values, parent);
            self.stats.minute_rows += 1;
        }
        if let Some(hour_bar) = out.hour {
            let feats = self.hour_engine.update(&hour_bar);
            let parent = self.store.size(StoreLevel::Minute).saturating_sub(1) as u32;
            let mut values = vec![
                RowValue::F64(hour_bar.close),
                RowValue::F64(hour_bar.vwap),
                RowValue::U64(hour_bar.volume),
                RowValue::F64(hour_bar.prev_day_close),
            ];
            values.extend(feats.iter().map(|&z| RowValue::F32(z)));
            self.store.push_row(StoreLevel::Hour, &values, parent);
            self.stats.hour_rows += 1;
        }

        // Run bars off the snapshot stream
        let bar = self.run_bars.resample_snapshot(snap, &self.snapshot_book);
        if let Some(b) = bar {
            self.bars.push(b);
            self.stats.run_bars += 1;
        }
        bar
    }

    /// Finish the asset-day: flag the store complete and report totals.
    pub fn finish(&mut self) -> AssetDayStats {
        self.run_bars.close_day();
        self.store.mark_date_complete();
        self.stats.rejected_events = self.book.rejected_events();
        self.stats
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    pub fn publication(&self) -> PublicationHandle {
        self.store.publication()
    }

    pub fn snapshots(&self) -> &[SnapshotRecord] {
        &self.snapshots
    }

    pub fn bars(&self) -> &[RunBar] {
        &self.bars
    }

    pub fn stats(&self) -> AssetDayStats {
        self.stats
    }

    /// Reset for the next asset-day, keeping every allocation. The
    /// run-bar EMA state deliberately survives (it smooths across days).
    pub fn reset(&mut self, asset: impl Into<String>) {
        self.asset = asset.into();
        self.book.clear();
        self.gate.reset();
        self.snapshot_book.clear();
        self.flow.clear();
        self.tick_engine.clear();
        self.minute_engine.clear();
        self.hour_engine.clear();
        self.cascade.clear();
        self.store.clear();
        self.snapshots.clear();
        self.bars.clear();
        self.stats = AssetDayStats::default();
    }
}
