//! Hierarchical feature computation
//!
//! Tick features fire on every gated snapshot; the cascade closes minute
//! and hour bars which trigger their own engines. All normalization runs
//! through [`zscore::RollingZScore`], and [`flow::FlowCounters`] collects
//! the inter-tick event tallies the dynamic families read.

pub mod cascade;
pub mod flow;
pub mod hour;
pub mod minute;
pub mod tick;
pub mod zscore;

pub use cascade::{BarAccumulator, CascadeOutput, FeatureCascade};
pub use flow::{FlowCounters, FlowWindow};
pub use hour::{HourFeatureEngine, HOUR_FEATURES, HOUR_FEATURE_COUNT};
pub use minute::{MinuteFeatureEngine, MINUTE_FEATURES, MINUTE_FEATURE_COUNT};
pub use tick::{TickFeatureEngine, TICK_FEATURES, TICK_FEATURE_COUNT, ZSCORE_WINDOW};
pub use zscore::RollingZScore;
