//! Worker pool and per-asset-day orchestration

pub mod asset_day;
pub mod queue;
pub mod runtime;
pub mod worker;

pub use asset_day::{AssetDayContext, AssetDayStats};
pub use queue::{ActiveFolder, AssetInfo, FolderQueue, FolderToken, FolderWorkItem, Semaphore};
pub use runtime::{init_logging, RunSummary, Runtime};
pub use worker::{decompression_worker, encoding_worker, process_asset_day, WorkerShared};
