//! Pipeline error kinds
//!
//! The per-event hot path never returns errors (out-of-order input is
//! absorbed as placeholders); these variants cover the boundary work:
//! configuration, archives, CSV files, and output encoding. Workers log
//! and skip per-archive failures; configuration errors abort before any
//! worker starts.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed JSON or unparseable date in a config file. Fatal.
    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    /// Day archive not found; the day is skipped.
    #[error("archive missing: {path}")]
    ArchiveMissing { path: PathBuf },

    /// Extraction failed; the day is skipped.
    #[error("archive corrupt or extraction failed: {path}: {reason}")]
    ArchiveCorrupt { path: PathBuf, reason: String },

    /// Extracted asset folder has no snapshot CSV. Fatal for the
    /// asset-day unit: everything downstream requires snapshots.
    #[error("asset {asset} on {date} has no snapshot file")]
    AssetMissingSnapshot { asset: String, date: String },

    /// File-level CSV failure (open/read). Row-level short lines are
    /// skipped silently and never surface here.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output encoding failed; the asset-day's files are not written.
    #[error("failed to write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Whether the worker driver must abort the run rather than skip.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::ConfigInvalid { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = PipelineError::AssetMissingSnapshot {
            asset: "000001.SZ".into(),
            date: "20170104".into(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("000001.SZ"));
        assert!(msg.contains("20170104"));
    }

    #[test]
    fn test_only_config_is_fatal() {
        assert!(PipelineError::ConfigInvalid {
            reason: "bad month".into()
        }
        .is_fatal());
        assert!(!PipelineError::ArchiveMissing {
            path: PathBuf::from("/x")
        }
        .is_fatal());
    }
}
