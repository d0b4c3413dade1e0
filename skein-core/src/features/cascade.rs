//! Tick → minute → hour cascading resampler
//!
//! Every tick feeds two OHLCV accumulators. A change in minute-of-day
//! closes the minute bar; a change in hour closes the hour bar. There
//! are no suspension points; rollovers are plain nested calls gated by
//! the comparison, so within an asset-day everything stays in strict
//! program order.

use crate::core::{HourBar, MinuteBar};

/// OHLCV accumulator shared by both cadences.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarAccumulator {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    sum_price_volume: f64,
}

impl BarAccumulator {
    pub fn reset(&mut self, price: f64) {
        self.open = price;
        self.high = price;
        self.low = price;
        self.volume = 0;
        self.sum_price_volume = 0.0;
    }

    pub fn update(&mut self, price: f64, volume: u64) {
        if self.volume == 0 {
            self.open = price;
        }
        if price > self.high {
            self.high = price;
        }
        if price < self.low || self.low == 0.0 {
            self.low = price;
        }
        self.sum_price_volume += price * volume as f64;
        self.volume += volume;
    }

    /// Volume-weighted average price, falling back to the open when the
    /// window traded nothing.
    pub fn vwap(&self) -> f64 {
        if self.volume > 0 {
            self.sum_price_volume / self.volume as f64
        } else {
            self.open
        }
    }
}

/// Bars produced by one tick, if any. An hour bar never appears without
/// the minute bar that closed it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CascadeOutput {
    pub minute: Option<MinuteBar>,
    pub hour: Option<HourBar>,
}

pub struct FeatureCascade {
    minute_acc: BarAccumulator,
    hour_acc: BarAccumulator,
    last_minute: u32,
    last_hour: u32,
    last_minute_close: f64,
    prev_day_close: f64,
}

impl Default for FeatureCascade {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureCascade {
    pub fn new() -> Self {
        Self {
            minute_acc: BarAccumulator::default(),
            hour_acc: BarAccumulator::default(),
            last_minute: 0,
            last_hour: 0,
            last_minute_close: 0.0,
            prev_day_close: 0.0,
        }
    }

    /// Feed one tick (mid price + traded volume in shares).
    pub fn on_tick(&mut self, mid: f64, volume: u64, hour: u8, minute: u8) -> CascadeOutput {
        let minute_now = hour as u32 * 60 + minute as u32;
        let hour_now = hour as u32;

        self.minute_acc.update(mid, volume);
        self.hour_acc.update(mid, volume);

        let mut out = CascadeOutput::default();
        if minute_now == self.last_minute {
            return out;
        }

        // Minute rollover
        let is_minute_close = (hour == 11 && minute == 30) || (hour == 15 && minute == 0);
        let minute_bar = MinuteBar {
            timestamp_min: minute_now,
            open: self.minute_acc.open,
            high: self.minute_acc.high,
            low: self.minute_acc.low,
            close: mid,
            vwap: self.minute_acc.vwap(),
            volume: self.minute_acc.volume,
            market_close: is_minute_close,
        };
        self.last_minute = minute_now;
        self.last_minute_close = minute_bar.close;
        self.minute_acc.reset(mid);
        out.minute = Some(minute_bar);

        // Hour rollover
        if hour_now != self.last_hour {
            let is_hour_close = hour == 11 || hour == 15;
            let hour_bar = HourBar {
                timestamp_hour: hour_now,
                open: self.hour_acc.open,
                high: self.hour_acc.high,
                low: self.hour_acc.low,
                close: self.last_minute_close,
                vwap: self.hour_acc.vwap(),
                volume: self.hour_acc.volume,
                market_close: is_hour_close,
                prev_day_close: self.prev_day_close,
            };
            self.last_hour = hour_now;
            if is_hour_close {
                self.prev_day_close = hour_bar.close;
            }
            self.hour_acc.reset(hour_bar.close);
            out.hour = Some(hour_bar);
        }

        out
    }

    pub fn clear(&mut self) {
        let prev_close = self.prev_day_close;
        *self = Self::new();
        // The overnight reference survives the per-day reset
        self.prev_day_close = prev_close;
    }
}
