//! Skein Core - L2 Market Data Feature Pipeline
//!
//! Skein reconstructs limit order books from raw exchange Level-2 data
//! and distills them, per asset per trading day, into a hierarchy of
//! derived tables: adaptive run bars plus tick / minute / hour
//! microstructure features in a columnar store.
//!
//! ## Architecture
//! - **Deduction book**: price levels and per-order residuals rebuilt
//!   from a mixed maker/cancel/taker stream, out-of-order tolerant
//! - **Circular buffers** back every piece of rolling feature state
//! - **Adaptive run bars**: imbalance-triggered sampling with a daily
//!   bisection-learned, EMA-smoothed threshold
//! - **Cascading features**: tick rows fan into minute and hour rows
//!   with parent back-references for hierarchical joins
//! - **Worker pool**: extraction producers + core-pinned encoding
//!   consumers over a bounded, closeable folder queue
//!
//! ## Core Modules
//! - `cbuf`: fixed-capacity circular buffer with split-span views
//! - `lob`: deduction book, depth views, snapshot adapter
//! - `sample`: run-bar resampler
//! - `features`: rolling z-scores and the tick/minute/hour engines
//! - `store`: columnar, hierarchical feature store
//! - `session`: trading-session gate
//! - `pipeline`: asset-day context, workers, runtime
//! - `wire`: CSV ingestion and debug dumps

pub mod cbuf;
pub mod config;
pub mod core;
pub mod features;
pub mod lob;
pub mod perf;
pub mod pipeline;
pub mod sample;
pub mod session;
pub mod store;
pub mod wire;

// Re-export the types most callers touch
pub use crate::core::{
    EventKind, HourBar, MinuteBar, OrderEvent, OrderId, PackedTime, PipelineError, Price, Qty,
    RunBar, Side, SnapshotRecord,
};
pub use cbuf::{CBuf, SplitSpan};
pub use lob::{DeductionBook, DepthView, SnapshotBook};
pub use sample::{RunBarConfig, RunBarResampler};
pub use session::{SessionGate, SessionState};
pub use store::{FeatureStore, GlobalFeatureStore, RowValue, StoreLevel};

pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cbuf::CBuf;
    pub use crate::core::{EventKind, OrderEvent, RunBar, Side, SnapshotRecord};
    pub use crate::lob::{DeductionBook, DepthView, SnapshotBook};
    pub use crate::pipeline::{AssetDayContext, Runtime};
    pub use crate::sample::{RunBarConfig, RunBarResampler};
    pub use crate::session::{SessionGate, SessionState};
    pub use crate::store::{FeatureStore, RowValue, StoreLevel};
    pub use crate::{Error, Result};
}
