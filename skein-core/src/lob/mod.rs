//! Limit order book reconstruction
//!
//! Two paths into book state: [`book::DeductionBook`] replays the raw
//! order stream, [`snapshot::SnapshotBook`] tracks the periodic wire
//! snapshots. [`depth::DepthView`] is the flat top-K view the feature
//! engines read from either.

pub mod book;
pub mod depth;
pub mod snapshot;

pub use book::DeductionBook;
pub use depth::{DepthView, DEPTH_LEVELS};
pub use snapshot::{SnapshotBook, SNAPSHOT_WINDOW};
