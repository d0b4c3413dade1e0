//! Rolling z-score normalization
//!
//! One instance per feature: a `CBuf` window of the last `W` raw values
//! plus running sum / sum-of-squares, delta-adjusted on every update so
//! the statistics stay bit-equivalent to recomputing from the window
//! contents (up to float ordering). Sub-window counts degrade gracefully
//! and the very first sample normalizes to 0.

use crate::cbuf::CBuf;

/// Floor on sigma; keeps flat windows from dividing by zero.
const SIGMA_FLOOR: f64 = 1e-8;

#[derive(Debug)]
pub struct RollingZScore<const W: usize> {
    window: CBuf<f32, W>,
    sum: f64,
    sum_sq: f64,
}

impl<const W: usize> Default for RollingZScore<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize> RollingZScore<W> {
    pub fn new() -> Self {
        Self {
            window: CBuf::new(),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Append `x`, evicting the oldest sample at capacity, and return
    /// the z-score of `x` against the updated window.
    #[inline]
    pub fn update(&mut self, x: f32) -> f32 {
        if self.window.is_full() {
            let old = *self.window.front() as f64;
            self.sum -= old;
            self.sum_sq -= old * old;
        }
        self.window.push_back(x);
        let xf = x as f64;
        self.sum += xf;
        self.sum_sq += xf * xf;

        let n = self.window.len() as f64;
        if self.window.len() < 2 {
            return 0.0;
        }
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(0.0);
        let sigma = var.sqrt().max(SIGMA_FLOOR);
        ((xf - mean) / sigma) as f32
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Current window mean.
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    /// Current window standard deviation (population).
    pub fn sigma(&self) -> f64 {
        let n = self.window.len() as f64;
        if n < 1.0 {
            return 0.0;
        }
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0).sqrt()
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
    }
}
