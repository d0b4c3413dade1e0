//! Minute-level bar features

use crate::cbuf::CBuf;
use crate::core::MinuteBar;
use crate::features::zscore::RollingZScore;

/// One trading day of minutes.
pub const MINUTE_WINDOW: usize = 240;

/// Lookback for the momentum term.
const MOMENTUM_LAG: usize = 5;

pub const MINUTE_FEATURES: [&str; 5] = ["mn_ret", "mn_range", "mn_vwap_dev", "mn_vol", "mn_mom"];

pub const MINUTE_FEATURE_COUNT: usize = MINUTE_FEATURES.len();

pub struct MinuteFeatureEngine {
    zs: Vec<RollingZScore<MINUTE_WINDOW>>,
    closes: CBuf<f64, 16>,
}

impl Default for MinuteFeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MinuteFeatureEngine {
    pub fn new() -> Self {
        Self {
            zs: (0..MINUTE_FEATURE_COUNT)
                .map(|_| RollingZScore::new())
                .collect(),
            closes: CBuf::new(),
        }
    }

    pub fn update(&mut self, bar: &MinuteBar) -> [f32; MINUTE_FEATURE_COUNT] {
        let ret = ratio_or_zero(bar.close - bar.open, bar.open);
        let range = ratio_or_zero(bar.high - bar.low, bar.vwap);
        let vwap_dev = ratio_or_zero(bar.close - bar.vwap, bar.vwap);
        let momentum = if self.closes.len() >= MOMENTUM_LAG {
            let past = self.closes[self.closes.len() - MOMENTUM_LAG];
            ratio_or_zero(bar.close - past, past)
        } else {
            0.0
        };
        self.closes.push_back(bar.close);

        let raw = [ret, range, vwap_dev, bar.volume as f32, momentum];
        let mut row = [0.0f32; MINUTE_FEATURE_COUNT];
        for (i, (&r, zs)) in raw.iter().zip(self.zs.iter_mut()).enumerate() {
            row[i] = zs.update(r);
        }
        row
    }

    pub fn clear(&mut self) {
        for zs in &mut self.zs {
            zs.clear();
        }
        self.closes.clear();
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
