//! Event-imbalance run bars
//!
//! A bar closes when cumulative one-sided volume (buy or sell) first
//! reaches a threshold. The threshold is re-estimated once per trading
//! day by bisection against a target bar rate, then blended across days
//! with an exponential moving average, so bar duration adapts to each
//! asset's activity level.
//!
//! Two interchangeable inputs drive the same accumulator:
//! - the order stream (taker events only), day boundary inferred from
//!   the 9-o'clock hour edge because order events carry no date;
//! - the snapshot stream (every gated snapshot is a tick), day boundary
//!   keyed on the calendar date, which is the stricter rule.

use crate::core::{EventKind, OrderEvent, RunBar, SnapshotRecord, TICK_SIZE};
use crate::lob::SnapshotBook;

/// Resampler parameters. Defaults follow the repo's base configuration:
/// 3 s snapshots resampled toward 30 s bars over a 4-hour session.
#[derive(Debug, Clone, Copy)]
pub struct RunBarConfig {
    /// Target bar length in seconds.
    pub target_period_secs: u32,
    /// Days of EMA smoothing for the daily threshold.
    pub ema_days: f32,
    /// Trading hours per day (mainland session: 4).
    pub trade_hours_per_day: f32,
    /// Minimum seconds between bars; 0 disables the guard.
    pub min_bar_secs: u32,
    /// Threshold before the first daily estimate; negative means unset
    /// (every tick forms a bar until the first day is learned).
    pub init_threshold: f32,
}

impl RunBarConfig {
    /// Order-stream mode: a positive seed threshold plus a time guard.
    pub fn for_orders() -> Self {
        Self {
            target_period_secs: 30,
            ema_days: 5.0,
            trade_hours_per_day: 4.0,
            min_bar_secs: 5,
            init_threshold: 1_000.0,
        }
    }

    /// Snapshot mode: unset threshold, no time guard.
    pub fn for_snapshots() -> Self {
        Self {
            target_period_secs: 30,
            ema_days: 5.0,
            trade_hours_per_day: 4.0,
            min_bar_secs: 0,
            init_threshold: -1.0,
        }
    }
}

pub struct RunBarResampler {
    cfg: RunBarConfig,
    expected_daily_samples: i32,
    tolerance: i32,
    alpha: f32,

    daily_labels: Vec<bool>,
    daily_volumes: Vec<f32>,

    ema_threshold: f32,
    daily_threshold: f32,
    daily_bar_count: u32,
    prev_hour: u8,
    prev_date: u32,

    cumm_buy: f32,
    cumm_sell: f32,
    cumm_volume: f32,
    cumm_turnover: f32,
    cumm_delta_t: u16,
    label_long: bool,

    ohlc_open: f32,
    ohlc_high: f32,
    ohlc_low: f32,
    ohlc_close: f32,

    last_sample_secs: Option<u32>,
}

impl RunBarResampler {
    pub fn new(cfg: RunBarConfig) -> Self {
        let expected =
            (3600.0 * cfg.trade_hours_per_day / cfg.target_period_secs as f32) as i32;
        Self {
            cfg,
            expected_daily_samples: expected,
            tolerance: (expected as f32 * 0.05) as i32,
            alpha: 2.0 / (cfg.ema_days + 1.0),
            daily_labels: Vec::with_capacity(expected as usize * 4),
            daily_volumes: Vec::with_capacity(expected as usize * 4),
            ema_threshold: cfg.init_threshold,
            daily_threshold: 0.0,
            daily_bar_count: 0,
            prev_hour: u8::MAX,
            prev_date: 0,
            cumm_buy: 0.0,
            cumm_sell: 0.0,
            cumm_volume: 0.0,
            cumm_turnover: 0.0,
            cumm_delta_t: 0,
            label_long: false,
            ohlc_open: 0.0,
            ohlc_high: f32::NEG_INFINITY,
            ohlc_low: f32::INFINITY,
            ohlc_close: 0.0,
            last_sample_secs: None,
        }
    }

    // ------------------------------------------------------------------
    // Order-stream mode
    // ------------------------------------------------------------------

    /// Feed one order event; only takers accumulate. Returns the bar on
    /// formation boundaries.
    pub fn resample(&mut self, event: &OrderEvent) -> Option<RunBar> {
        if event.kind != EventKind::Taker {
            return None;
        }

        let volume = event.volume as f32;
        let price = event.price as f32 * TICK_SIZE;
        if event.side.is_bid() {
            self.cumm_buy += volume;
            self.label_long = true;
        } else {
            self.cumm_sell += volume;
            self.label_long = false;
        }
        // Bar totals carry shares and CNY; side accumulators stay in lots
        let shares = volume * 100.0;
        self.accumulate_bar(price, shares, price * shares, 0);

        // Threshold check first: the common case is no bar
        let theta = self.cumm_buy.max(self.cumm_sell);
        if theta < self.ema_threshold.max(0.0) {
            return None;
        }

        // Time guard keeps a burst from emitting back-to-back slivers
        let now_secs = seconds_of_day(event.hour, event.minute, event.second);
        if self.cfg.min_bar_secs > 0 {
            if let Some(last) = self.last_sample_secs {
                if now_secs.saturating_sub(last) < self.cfg.min_bar_secs {
                    return None;
                }
            }
        }

        self.last_sample_secs = Some(now_secs);
        self.daily_bar_count += 1;

        // Day boundary: order events carry no date, so the first bar in
        // the 9-o'clock hour marks the new day
        if event.hour == 9 && self.prev_hour != 9 {
            self.daily_bar_count = 1;
            self.roll_day();
        }
        self.prev_hour = event.hour;

        self.daily_labels.push(self.label_long);
        self.daily_volumes.push(volume);

        let bar = self.take_bar(0, 0, 0, event.hour, event.minute, event.second, price);
        Some(bar)
    }

    // ------------------------------------------------------------------
    // Snapshot mode
    // ------------------------------------------------------------------

    /// Feed one gated snapshot; `book` must already contain it. Returns
    /// the bar on formation boundaries.
    pub fn resample_snapshot(
        &mut self,
        snap: &SnapshotRecord,
        book: &SnapshotBook,
    ) -> Option<RunBar> {
        let volume = *book.volumes.back();
        let label_long = *book.directions.back() == 0;
        let (buy_vol, sell_vol) = if label_long {
            (volume, 0.0)
        } else {
            (0.0, volume)
        };
        self.label_long = label_long;

        // Date is available here, so the stricter boundary rule applies,
        // and it runs before the new day's first tick is accumulated
        let date = snap.date_key();
        if date != self.prev_date {
            self.roll_day();
            self.daily_bar_count = 0;
            self.prev_date = date;
        }

        let price = *book.prices.back();
        self.daily_labels.push(label_long);
        self.daily_volumes.push(volume);

        self.cumm_buy += buy_vol;
        self.cumm_sell += sell_vol;
        self.accumulate_bar(
            price,
            volume,
            *book.turnovers.back(),
            *book.delta_t.back(),
        );

        let theta = self.cumm_buy.max(self.cumm_sell);
        if theta < self.ema_threshold.max(0.0) {
            return None;
        }
        if self.cfg.min_bar_secs > 0 {
            let now_secs = snap.seconds_in_day;
            if let Some(last) = self.last_sample_secs {
                if now_secs.saturating_sub(last) < self.cfg.min_bar_secs {
                    return None;
                }
            }
            self.last_sample_secs = Some(now_secs);
        }

        self.daily_bar_count += 1;
        let bar = self.take_bar(
            snap.year,
            snap.month,
            snap.day,
            snap.hour,
            snap.minute,
            snap.second,
            price,
        );
        Some(bar)
    }

    /// Explicit day boundary for callers replaying a single day.
    pub fn close_day(&mut self) {
        self.roll_day();
        self.daily_bar_count = 0;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn ema_threshold(&self) -> f32 {
        self.ema_threshold
    }

    pub fn daily_threshold(&self) -> f32 {
        self.daily_threshold
    }

    pub fn daily_bar_count(&self) -> u32 {
        self.daily_bar_count
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    #[inline]
    fn accumulate_bar(&mut self, price: f32, volume: f32, turnover: f32, delta_t: u16) {
        if self.ohlc_open == 0.0 {
            self.ohlc_open = price;
        }
        self.ohlc_high = self.ohlc_high.max(price);
        self.ohlc_low = self.ohlc_low.min(price);
        self.ohlc_close = price;
        self.cumm_volume += volume;
        self.cumm_turnover += turnover;
        self.cumm_delta_t = self.cumm_delta_t.saturating_add(delta_t);
    }

    /// Build the bar record and reset all accumulator state, with OHLC
    /// re-latched to the current tick's price.
    fn take_bar(
        &mut self,
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        price: f32,
    ) -> RunBar {
        let vwap = if self.cumm_volume > 0.0 {
            self.cumm_turnover / self.cumm_volume
        } else {
            self.ohlc_close
        };
        let bar = RunBar {
            year,
            month,
            day,
            hour,
            minute,
            second,
            open: self.ohlc_open,
            high: self.ohlc_high,
            low: self.ohlc_low,
            close: self.ohlc_close,
            vwap,
            delta_t: self.cumm_delta_t,
        };
        self.ohlc_open = price;
        self.ohlc_high = price;
        self.ohlc_low = price;
        self.cumm_buy = 0.0;
        self.cumm_sell = 0.0;
        self.cumm_volume = 0.0;
        self.cumm_turnover = 0.0;
        self.cumm_delta_t = 0;
        bar
    }

    /// Day rollover: re-estimate the threshold from the finished day
    /// (when it produced samples), fold it into the EMA, clear the day.
    fn roll_day(&mut self) {
        if !self.daily_labels.is_empty() {
            self.daily_threshold = self.find_run_threshold();
            self.ema_threshold = if self.ema_threshold < 0.0 {
                self.daily_threshold
            } else {
                self.alpha * self.daily_threshold + (1.0 - self.alpha) * self.ema_threshold
            };
        }
        self.daily_labels.clear();
        self.daily_volumes.clear();
    }

    /// Bars produced by sweeping the day at threshold `x`: independent
    /// buy/sell accumulators, either crossing emits and resets both.
    fn compute_sample_count(&self, x: f32) -> i32 {
        let mut acc_pos = 0.0f32;
        let mut acc_neg = 0.0f32;
        let mut samples = 0;
        for i in 0..self.daily_volumes.len() {
            if self.daily_labels[i] {
                acc_pos += self.daily_volumes[i];
            } else {
                acc_neg += self.daily_volumes[i];
            }
            if acc_pos >= x || acc_neg >= x {
                samples += 1;
                acc_pos = 0.0;
                acc_neg = 0.0;
            }
        }
        samples
    }

    /// Bisect the threshold that yields the expected daily bar count.
    pub fn find_run_threshold(&self) -> f32 {
        if self.daily_labels.is_empty() {
            return 0.0;
        }

        let mut x_max: f32 = self.daily_volumes.iter().sum();
        let mut x_min: f32 = self
            .daily_volumes
            .iter()
            .copied()
            .fold(f32::INFINITY, f32::min);

        let mut x_mid = 0.0;
        for _ in 0..20 {
            x_mid = 0.5 * (x_min + x_max);
            let samples = self.compute_sample_count(x_mid);

            if (samples - self.expected_daily_samples).abs() <= self.tolerance
                || (x_max - x_min) < 100.0
            {
                return x_mid;
            }
            if samples > self.expected_daily_samples {
                // Too many bars: demand more volume per bar
                x_min = x_mid;
            } else {
                x_max = x_mid;
            }
        }
        0.5 * (x_min + x_max)
    }

    #[cfg(test)]
    fn seed_day(&mut self, labels: Vec<bool>, volumes: Vec<f32>) {
        self.daily_labels = labels;
        self.daily_volumes = volumes;
    }
}

#[inline(always)]
fn seconds_of_day(hour: u8, minute: u8, second: u8) -> u32 {
    hour as u32 * 3600 + minute as u32 * 60 + second as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;
    use approx::assert_relative_eq;

    fn taker(side: Side, hour: u8, minute: u8, second: u8, price: u16, volume: u16) -> OrderEvent {
        OrderEvent {
            hour,
            minute,
            second,
            decisecond: 0,
            kind: EventKind::Taker,
            side,
            price,
            volume,
            bid_id: 1,
            ask_id: 2,
        }
    }

    fn open_snapshot(seconds: u32, price: u16, volume: u16) -> SnapshotRecord {
        let mut snap = SnapshotRecord {
            year: 2017,
            month: 1,
            day: 4,
            hour: (seconds / 3600) as u8,
            minute: ((seconds % 3600) / 60) as u8,
            second: (seconds % 60) as u8,
            seconds_in_day: seconds,
            latest_price: price,
            volume,
            turnover: price as u32 * volume as u32,
            direction: 0,
            ..Default::default()
        };
        snap.bid_prices[0] = price - 1;
        snap.bid_volumes[0] = 10;
        snap.ask_prices[0] = price + 1;
        snap.ask_volumes[0] = 10;
        snap
    }

    #[test]
    fn test_non_taker_events_ignored() {
        let mut rb = RunBarResampler::new(RunBarConfig::for_orders());
        let mut ev = taker(Side::Bid, 9, 31, 0, 1000, 10);
        ev.kind = EventKind::Maker;
        assert!(rb.resample(&ev).is_none());
        ev.kind = EventKind::Cancel;
        assert!(rb.resample(&ev).is_none());
    }

    #[test]
    fn test_snapshot_emit_resets_side_accumulators() {
        // With a learned threshold, each emit must restart the side
        // accumulators or every later tick would form a bar
        let mut cfg = RunBarConfig::for_snapshots();
        cfg.init_threshold = 15_000.0; // shares
        let mut book = SnapshotBook::new();
        let mut rb = RunBarResampler::new(cfg);

        // Each tick adds 100 lots = 10,000 shares of buy volume
        let mut feed = |book: &mut SnapshotBook, rb: &mut RunBarResampler, seconds: u32| {
            let snap = open_snapshot(seconds, 1000, 100);
            book.update(&snap, seconds == 34_201);
            rb.resample_snapshot(&snap, book)
        };

        assert!(feed(&mut book, &mut rb, 34_201).is_none()); // 10k < 15k
        assert!(feed(&mut book, &mut rb, 34_204).is_some()); // 20k >= 15k
        // Accumulators restarted: the next tick is under threshold again
        assert!(feed(&mut book, &mut rb, 34_207).is_none());
        assert!(feed(&mut book, &mut rb, 34_210).is_some());
        assert_eq!(rb.daily_bar_count(), 2);
    }

    #[test]
    fn test_bar_forms_when_one_side_crosses() {
        let mut cfg = RunBarConfig::for_orders();
        cfg.init_threshold = 100.0;
        cfg.min_bar_secs = 0;
        let mut rb = RunBarResampler::new(cfg);

        // 99 buy lots: under threshold
        assert!(rb.resample(&taker(Side::Bid, 9, 31, 0, 1000, 99)).is_none());
        // Sell side alone is still under
        assert!(rb.resample(&taker(Side::Ask, 9, 31, 1, 999, 50)).is_none());
        // Buy side crosses 100
        let bar = rb.resample(&taker(Side::Bid, 9, 31, 2, 1001, 1));
        let bar = bar.expect("bar should form");
        assert_relative_eq!(bar.open, 10.0, epsilon = 1e-6);
        assert_relative_eq!(bar.high, 10.01, epsilon = 1e-6);
        assert_relative_eq!(bar.low, 9.99, epsilon = 1e-6);
        assert_relative_eq!(bar.close, 10.01, epsilon = 1e-6);
        assert_eq!(rb.daily_bar_count(), 1);
    }

    #[test]
    fn test_time_guard_defers_emission() {
        let mut cfg = RunBarConfig::for_orders();
        cfg.init_threshold = 10.0;
        cfg.min_bar_secs = 5;
        let mut rb = RunBarResampler::new(cfg);

        assert!(rb.resample(&taker(Side::Bid, 9, 31, 0, 1000, 10)).is_some());
        // Crosses again 2 s later: guarded
        assert!(rb.resample(&taker(Side::Bid, 9, 31, 2, 1000, 10)).is_none());
        // 5 s after the last bar the pending bar emits
        assert!(rb.resample(&taker(Side::Bid, 9, 31, 5, 1000, 1)).is_some());
    }

    #[test]
    fn test_vwap_from_turnover_over_volume() {
        let mut cfg = RunBarConfig::for_orders();
        cfg.init_threshold = 30.0;
        cfg.min_bar_secs = 0;
        let mut rb = RunBarResampler::new(cfg);

        rb.resample(&taker(Side::Bid, 9, 31, 0, 1000, 10));
        rb.resample(&taker(Side::Bid, 9, 31, 1, 1002, 10));
        let bar = rb.resample(&taker(Side::Bid, 9, 31, 2, 1004, 10)).unwrap();
        // turnover = (10.00 + 10.02 + 10.04) * 10 * 100; volume = 3000 shares
        let expect = (10.00 + 10.02 + 10.04) / 3.0;
        assert_relative_eq!(bar.vwap, expect, epsilon = 1e-4);
    }

    #[test]
    fn test_bisection_hits_expected_rate() {
        // Invariant 7: the learned threshold reproduces the target count
        let mut rb = RunBarResampler::new(RunBarConfig::for_orders());
        let n = 4800;
        let labels: Vec<bool> = (0..n).map(|i| i % 2 == 0).collect();
        let volumes: Vec<f32> = vec![10.0; n];
        rb.seed_day(labels, volumes);

        let x = rb.find_run_threshold();
        let samples = rb.compute_sample_count(x);
        let expected = rb.expected_daily_samples;
        // Terminates either inside the tolerance band or on the bracket-
        // width cutoff; both land near the target rate
        assert!(x >= 10.0);
        assert!(
            samples >= expected / 3 && samples <= expected * 5,
            "samples={} expected={} x={}",
            samples,
            expected,
            x
        );
    }

    #[test]
    fn test_ema_smoothing_converges() {
        // Invariant 8: identical daily thresholds drive the EMA to them
        let mut cfg = RunBarConfig::for_orders();
        cfg.init_threshold = -1.0;
        let mut rb = RunBarResampler::new(cfg);
        let alpha = rb.alpha;

        // First day initializes the EMA directly
        rb.seed_day(vec![true; 100], vec![100.0; 100]);
        rb.roll_day();
        let d1 = rb.daily_threshold();
        assert_relative_eq!(rb.ema_threshold(), d1, epsilon = 1e-6);

        // Then N identical days pull the EMA onto their threshold
        let mut ema = rb.ema_threshold();
        let mut d2 = 0.0;
        for _ in 0..30 {
            rb.seed_day(vec![true; 100], vec![50.0; 100]);
            rb.roll_day();
            d2 = rb.daily_threshold();
            ema = alpha * d2 + (1.0 - alpha) * ema;
            assert_relative_eq!(rb.ema_threshold(), ema, epsilon = 1e-4);
        }
        assert!(d2 > 0.0 && (d2 - d1).abs() > 1e-3);
        assert_relative_eq!(rb.ema_threshold(), d2, epsilon = 1e-2);
    }

    #[test]
    fn test_order_mode_day_rollover_on_hour_edge() {
        // E3: a day of alternating takers, then the next morning's first
        // bar re-estimates the threshold and applies the smoothing law
        let mut cfg = RunBarConfig::for_orders();
        cfg.init_threshold = 1000.0;
        cfg.min_bar_secs = 0;
        let mut rb = RunBarResampler::new(cfg);
        let alpha = rb.alpha;

        let mut bars_day1 = 0;
        for i in 0..8000u32 {
            let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
            let hour = 10 + (i / 3600) as u8;
            let minute = ((i / 60) % 60) as u8;
            let second = (i % 60) as u8;
            if rb
                .resample(&taker(side, hour, minute, second, 1000, 1))
                .is_some()
            {
                bars_day1 += 1;
            }
        }
        assert!(bars_day1 >= 1, "day one must form at least one bar");
        let ema_before = rb.ema_threshold();

        // Next day, 9 o'clock: the emitting tick triggers re-estimation.
        // Threshold is still the initial 1000, so feed enough volume.
        let bar = rb.resample(&taker(Side::Bid, 9, 30, 0, 1000, 2000));
        assert!(bar.is_some());
        let daily = rb.daily_threshold();
        assert!(daily > 0.0);
        let expect_ema = alpha * daily + (1.0 - alpha) * ema_before;
        assert_relative_eq!(rb.ema_threshold(), expect_ema, epsilon = 1e-3);
        assert_eq!(rb.daily_bar_count(), 1);
    }
}
