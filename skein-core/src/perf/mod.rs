//! Thread placement utilities

pub mod cpu;

pub use cpu::{num_cores, pin_to_core, set_realtime_priority};
