//! Hour-level bar features

use crate::core::HourBar;
use crate::features::zscore::RollingZScore;

/// Two trading weeks of session hours.
pub const HOUR_WINDOW: usize = 48;

pub const HOUR_FEATURES: [&str; 5] = ["hr_ret", "hr_range", "hr_vwap_dev", "hr_vol", "hr_gap"];

pub const HOUR_FEATURE_COUNT: usize = HOUR_FEATURES.len();

pub struct HourFeatureEngine {
    zs: Vec<RollingZScore<HOUR_WINDOW>>,
}

impl Default for HourFeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HourFeatureEngine {
    pub fn new() -> Self {
        Self {
            zs: (0..HOUR_FEATURE_COUNT)
                .map(|_| RollingZScore::new())
                .collect(),
        }
    }

    pub fn update(&mut self, bar: &HourBar) -> [f32; HOUR_FEATURE_COUNT] {
        let ret = ratio_or_zero(bar.close - bar.open, bar.open);
        let range = ratio_or_zero(bar.high - bar.low, bar.vwap);
        let vwap_dev = ratio_or_zero(bar.close - bar.vwap, bar.vwap);
        // Overnight gap: only meaningful once a previous close exists
        let gap = ratio_or_zero(bar.open - bar.prev_day_close, bar.prev_day_close);

        let raw = [ret, range, vwap_dev, bar.volume as f32, gap];
        let mut row = [0.0f32; HOUR_FEATURE_COUNT];
        for (i, (&r, zs)) in raw.iter().zip(self.zs.iter_mut()).enumerate() {
            row[i] = zs.update(r);
        }
        row
    }

    pub fn clear(&mut self) {
        for zs in &mut self.zs {
            zs.clear();
        }
    }
}

#[inline]
fn ratio_or_zero(num: f64, den: f64) -> f32 {
    if den.abs() > f64::EPSILON {
        (num / den) as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_requires_prev_close() {
        let mut engine = HourFeatureEngine::new();
        let bar = HourBar {
            timestamp_hour: 10,
            open: 10.0,
            high: 10.2,
            low: 9.9,
            close: 10.1,
            vwap: 10.05,
            volume: 50_000,
            market_close: false,
            prev_day_close: 0.0,
        };
        let row = engine.update(&bar);
        assert!(row.iter().all(|z| z.is_finite()));
    }

    #[test]
    fn test_rows_finite_over_sequence() {
        let mut engine = HourFeatureEngine::new();
        for i in 0..10 {
            let base = 10.0 + i as f64 * 0.05;
            let bar = HourBar {
                timestamp_hour: 10 + (i % 4) as u32,
                open: base,
                high: base + 0.1,
                low: base - 0.1,
                close: base + 0.02,
                vwap: base,
                volume: 40_000 + i * 1_000,
                market_close: false,
                prev_day_close: 9.95,
            };
            let row = engine.update(&bar);
            assert!(row.iter().all(|z| z.is_finite()));
        }
    }
}
