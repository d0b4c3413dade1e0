//! Core types shared across the pipeline

pub mod cached;
pub mod errors;
pub mod types;

pub use cached::Cached;
pub use errors::PipelineError;
pub use types::{
    price_to_cny, EventKind, HourBar, MinuteBar, OrderEvent, OrderId, PackedTime, Price, Qty,
    RunBar, Side, SnapshotRecord, SNAPSHOT_LEVELS, TICK_SIZE,
};
