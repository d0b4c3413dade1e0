//! Adaptive resampling

pub mod run_bar;

pub use run_bar::{RunBarConfig, RunBarResampler};
