//! Process composition root
//!
//! Owns what the pipeline shares for one run (configuration, the
//! shutdown flag, the semaphore/queue plumbing, and the log sinks) and
//! passes it by reference into the worker threads. Initialization and
//! teardown are scoped to [`Runtime::run`]; there is no process-global
//! mutable state.

use crate::config::PipelineConfig;
use crate::perf::cpu;
use crate::pipeline::worker::{decompression_worker, encoding_worker, WorkerShared};
use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{filter, fmt, prelude::*, EnvFilter};

/// Depth of the folder queue between extraction and encoding.
const FOLDER_QUEUE_DEPTH: usize = 100;

/// Totals reported after a run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub archives: usize,
    pub assets_total: usize,
    pub assets_completed: usize,
    pub elapsed: Duration,
}

pub struct Runtime {
    config: PipelineConfig,
    shared: Arc<WorkerShared>,
}

impl Runtime {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(WorkerShared::new(
            Arc::clone(&shutdown),
            config.max_temp_folders,
            FOLDER_QUEUE_DEPTH,
        ));
        Ok(Self { config, shared })
    }

    /// Flag checked by every worker; wire it to SIGINT in the binary.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.shutdown)
    }

    pub fn shared(&self) -> &Arc<WorkerShared> {
        &self.shared
    }

    /// Run the full pipeline: discover day archives, spawn the worker
    /// pool, wait for it to drain.
    pub fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        std::fs::create_dir_all(&self.config.temp_base)
            .with_context(|| format!("creating temp base {}", self.config.temp_base.display()))?;
        std::fs::create_dir_all(&self.config.output_base).with_context(|| {
            format!("creating output base {}", self.config.output_base.display())
        })?;

        // Archive discovery over the configured weekday range
        let mut archives = 0usize;
        {
            let mut queue = self.shared.archive_queue.lock();
            for day in self.config.trading_days()? {
                let path = self.config.archive_path(day);
                if path.exists() {
                    queue.push_back((day.format("%Y%m%d").to_string(), path));
                    archives += 1;
                }
            }
        }
        tracing::info!(target: "skein::decomp", "{} day archives queued", archives);

        let decomp_threads = self.config.decompression_threads;
        let encode_threads = cpu::num_cores().saturating_sub(decomp_threads).max(1);
        tracing::info!(
            "spawning {} decompression + {} encoding workers",
            decomp_threads,
            encode_threads
        );

        let mut fatal: Option<anyhow::Error> = None;
        std::thread::scope(|scope| {
            let mut decomp_handles = Vec::new();
            for _ in 0..decomp_threads {
                let shared = Arc::clone(&self.shared);
                let config = &self.config;
                decomp_handles.push(scope.spawn(move || {
                    decompression_worker(&shared, config);
                }));
            }

            let mut encode_handles = Vec::new();
            for i in 0..encode_threads {
                let shared = Arc::clone(&self.shared);
                let config = &self.config;
                let core_id = decomp_threads + i;
                encode_handles.push(scope.spawn(move || {
                    // Pinning is best-effort: containers and dev boxes
                    // may refuse it
                    if cpu::pin_to_core(core_id).is_err() {
                        tracing::debug!("could not pin encoder to core {}", core_id);
                    }
                    encoding_worker(&shared, config)
                }));
            }

            for handle in decomp_handles {
                let _ = handle.join();
            }
            // No more folders will arrive: let consumers drain and exit
            self.shared.folder_queue.close();

            for handle in encode_handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        self.shared.shutdown.store(true, Ordering::Release);
                        if fatal.is_none() {
                            fatal = Some(e.into());
                        }
                    }
                    Err(_) => {
                        if fatal.is_none() {
                            fatal = Some(anyhow::anyhow!("encoding worker panicked"));
                        }
                    }
                }
            }
        });

        if let Some(e) = fatal {
            return Err(e);
        }

        let summary = RunSummary {
            archives,
            assets_total: self.shared.total_assets.load(Ordering::Acquire),
            assets_completed: self.shared.completed_assets.load(Ordering::Acquire),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "run complete: {}/{} assets across {} archives in {:.1?}",
            summary.assets_completed,
            summary.assets_total,
            summary.archives,
            summary.elapsed
        );
        Ok(summary)
    }
}

/// Install the tracing subscriber: a console layer plus one file sink
/// per worker channel under `temp_base`, matching the targets
/// `skein::decomp` / `skein::encode` / `skein::analyze`.
pub fn init_logging(temp_base: &Path) -> Result<()> {
    std::fs::create_dir_all(temp_base)
        .with_context(|| format!("creating log dir {}", temp_base.display()))?;

    let sink = |name: &str| -> Result<Arc<File>> {
        Ok(Arc::new(File::create(temp_base.join(name))?))
    };
    let decomp = sink("decompression.log")?;
    let encode = sink("encoding.log")?;
    let analyze = sink("analyzing.log")?;

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(console_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(decomp)
                .with_filter(filter::filter_fn(|meta| {
                    meta.target().starts_with("skein::decomp")
                })),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(encode)
                .with_filter(filter::filter_fn(|meta| {
                    meta.target().starts_with("skein::encode")
                })),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(analyze)
                .with_filter(filter::filter_fn(|meta| {
                    meta.target().starts_with("skein::analyze")
                })),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing init failed: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            dir: dir.join("archives"),
            start_month: "2017-01".into(),
            end_month: "2017-01".into(),
            temp_base: dir.join("temp"),
            output_base: dir.join("output"),
            decompression_threads: 1,
            max_temp_folders: 2,
            skip_decompression: false,
        }
    }

    #[test]
    fn test_run_with_no_archives_completes_empty() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(config(dir.path())).unwrap();
        let summary = runtime.run().unwrap();
        assert_eq!(summary.archives, 0);
        assert_eq!(summary.assets_total, 0);
        assert_eq!(summary.assets_completed, 0);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut cfg = config(&PathBuf::from("/tmp"));
        cfg.start_month = "2018-01".into();
        cfg.end_month = "2017-01".into();
        assert!(Runtime::new(cfg).is_err());
    }

    #[test]
    fn test_shutdown_flag_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(config(dir.path())).unwrap();
        let flag = runtime.shutdown_flag();
        flag.store(true, Ordering::Release);
        assert!(runtime.shared().is_shutdown());
    }
}
