//! Decompression and encoding workers
//!
//! Producers (decompression workers) pull day archives off a shared
//! list, extract them into semaphore-bounded temp folders, and enqueue
//! one complete folder per day. Consumers (encoding workers, one pinned
//! per core) cooperate on a single active folder at a time: each claims
//! assets through an atomic index, replays the asset-day through an
//! [`AssetDayContext`], and writes the per-asset outputs. The last
//! completion retires the folder, which deletes its temp files through
//! the RAII token.
//!
//! The shutdown flag is honored at queue operations and folder
//! iteration boundaries; a worker never abandons an asset-day midway.

use crate::config::PipelineConfig;
use crate::core::{PackedTime, PipelineError};
use crate::pipeline::asset_day::{AssetDayContext, AssetDayStats};
use crate::pipeline::queue::{
    ActiveFolder, AssetInfo, FolderQueue, FolderToken, FolderWorkItem, Semaphore,
};
use crate::store::GlobalFeatureStore;
use crate::wire::csv::{
    merge_events, parse_order_csv, parse_snapshot_csv, parse_trade_csv, ORDER_CSV, SNAPSHOT_CSV,
    TRADE_CSV,
};
use crate::wire::dump::{dump_bar_csv, dump_snapshot_csv};
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// State shared by every worker in a run.
pub struct WorkerShared {
    pub shutdown: Arc<AtomicBool>,
    pub temp_slots: Arc<Semaphore>,
    pub folder_queue: FolderQueue,
    pub archive_queue: Mutex<VecDeque<(String, PathBuf)>>,
    pub active_folder: Mutex<Option<Arc<ActiveFolder>>>,
    pub total_assets: AtomicUsize,
    pub completed_assets: AtomicUsize,
    pub global_store: GlobalFeatureStore,
}

impl WorkerShared {
    pub fn new(shutdown: Arc<AtomicBool>, max_temp_folders: usize, queue_depth: usize) -> Self {
        Self {
            shutdown,
            temp_slots: Arc::new(Semaphore::new(max_temp_folders)),
            folder_queue: FolderQueue::new(queue_depth),
            archive_queue: Mutex::new(VecDeque::new()),
            active_folder: Mutex::new(None),
            total_assets: AtomicUsize::new(0),
            completed_assets: AtomicUsize::new(0),
            global_store: GlobalFeatureStore::new(),
        }
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Extract a day archive into `temp_root`, shelling out to `7z` (with
/// an `unrar` fallback for .rar archives).
fn extract_archive(archive: &Path, temp_root: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(temp_root).map_err(|e| PipelineError::ArchiveCorrupt {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;

    let is_rar = archive.extension().is_some_and(|ext| ext == "rar");
    let status = if is_rar {
        Command::new("unrar")
            .arg("x")
            .arg("-y")
            .arg(archive)
            .arg(temp_root)
            .output()
    } else {
        Command::new("7z")
            .arg("x")
            .arg(archive)
            .arg(format!("-o{}", temp_root.display()))
            .arg("-y")
            .output()
    };

    match status {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(PipelineError::ArchiveCorrupt {
            path: archive.to_path_buf(),
            reason: format!("extractor exited with {}", out.status),
        }),
        Err(e) => Err(PipelineError::ArchiveCorrupt {
            path: archive.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// Enumerate asset subdirectories of an extracted day folder.
fn discover_assets(day_dir: &Path) -> Vec<AssetInfo> {
    let mut assets = Vec::new();
    let Ok(entries) = std::fs::read_dir(day_dir) else {
        return assets;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(code) = path.file_name().and_then(|n| n.to_str()) {
                assets.push(AssetInfo {
                    asset_dir: path.clone(),
                    asset_code: code.to_string(),
                });
            }
        }
    }
    assets.sort_by(|a, b| a.asset_code.cmp(&b.asset_code));
    assets
}

/// Producer loop: archive → temp folder → folder queue.
pub fn decompression_worker(shared: &WorkerShared, config: &PipelineConfig) {
    while !shared.is_shutdown() {
        let Some((date_str, archive)) = shared.archive_queue.lock().pop_front() else {
            break;
        };
        if !archive.exists() {
            tracing::warn!(target: "skein::decomp", "archive missing: {}", archive.display());
            continue;
        }

        // Disk backpressure: wait for a temp slot, staying responsive
        // to shutdown
        let mut acquired = false;
        while !shared.is_shutdown() {
            if shared.temp_slots.try_acquire() {
                acquired = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        if !acquired {
            return;
        }

        let temp_root = config.temp_base.join(&date_str);
        let token = FolderToken::new(temp_root.clone(), Arc::clone(&shared.temp_slots));

        if !config.skip_decompression {
            if let Err(e) = extract_archive(&archive, &temp_root) {
                tracing::warn!(target: "skein::decomp", "skipping day {}: {}", date_str, e);
                continue; // token drops: slot released, partial files removed
            }
        }

        // Archives expand to <temp_root>/<YYYYMMDD>/<ASSET>/
        let day_dir = temp_root.join(&date_str);
        let assets = if day_dir.is_dir() {
            discover_assets(&day_dir)
        } else {
            discover_assets(&temp_root)
        };
        if assets.is_empty() {
            tracing::warn!(target: "skein::decomp", "no assets in {}", date_str);
            continue;
        }

        tracing::info!(
            target: "skein::decomp",
            "extracted {} with {} assets",
            date_str,
            assets.len()
        );
        shared.total_assets.fetch_add(assets.len(), Ordering::AcqRel);

        let mut item = FolderWorkItem {
            date_str,
            assets,
            token,
        };
        loop {
            match shared.folder_queue.try_push(item) {
                Ok(()) => break,
                Err(returned) => {
                    if shared.is_shutdown() {
                        return;
                    }
                    item = returned;
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }
}

/// Consumer loop: cooperate on the active folder until the queue is
/// closed and drained. Returns an error only on per-worker-fatal
/// conditions (an asset folder without snapshots).
pub fn encoding_worker(
    shared: &WorkerShared,
    config: &PipelineConfig,
) -> Result<(), PipelineError> {
    let mut ctx = AssetDayContext::new(String::new());

    loop {
        if shared.is_shutdown() {
            return Ok(());
        }

        // Activate the next folder if none is in flight
        let folder = {
            let mut guard = shared.active_folder.lock();
            let in_flight = guard
                .as_ref()
                .filter(|f| !f.is_finished())
                .map(Arc::clone);
            match in_flight {
                Some(folder) => folder,
                None => {
                    if let Some(item) = shared.folder_queue.try_pop() {
                        let folder = Arc::new(ActiveFolder::new(item));
                        *guard = Some(Arc::clone(&folder));
                        folder
                    } else if shared.folder_queue.is_closed_and_empty() {
                        return Ok(());
                    } else {
                        drop(guard);
                        std::thread::sleep(Duration::from_millis(10));
                        continue;
                    }
                }
            }
        };

        while let Some((_, info)) = folder.claim() {
            if shared.is_shutdown() {
                return Ok(());
            }
            ctx.reset(info.asset_code.clone());
            match process_asset_day(&mut ctx, info, &folder.date_str, config) {
                Ok(stats) => {
                    shared
                        .global_store
                        .register(&info.asset_code, ctx.publication());
                    let completed = shared.completed_assets.fetch_add(1, Ordering::AcqRel) + 1;
                    tracing::info!(
                        target: "skein::analyze",
                        "{} {} done: {} ticks, {} bars ({}/{} assets)",
                        folder.date_str,
                        info.asset_code,
                        stats.tick_rows,
                        stats.run_bars,
                        completed,
                        shared.total_assets.load(Ordering::Acquire)
                    );
                }
                Err(e @ PipelineError::AssetMissingSnapshot { .. }) => {
                    // Contract violation: snapshots are required input
                    tracing::error!(target: "skein::encode", "{}", e);
                    eprintln!("{} {}: {}", folder.date_str, info.asset_code, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "skein::encode",
                        "{} {} skipped: {}",
                        folder.date_str,
                        info.asset_code,
                        e
                    );
                    eprintln!("{} {}: {}", folder.date_str, info.asset_code, e);
                }
            }

            let done = folder.complete_one();
            if done >= folder.total {
                shared.global_store.mark_date_complete(&folder.date_str);
                let mut guard = shared.active_folder.lock();
                let retiring = guard
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &folder));
                if retiring {
                    // Last asset out retires the folder; the token
                    // cleans the temp files when the Arc drops
                    *guard = None;
                }
            }
        }

        // Claims exhausted but peers still working: idle briefly
        if !folder.is_finished() {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Replay one asset-day: parse the three CSVs, interleave order events
/// with snapshots in time order, and write the per-asset outputs.
pub fn process_asset_day(
    ctx: &mut AssetDayContext,
    info: &AssetInfo,
    date_str: &str,
    config: &PipelineConfig,
) -> Result<AssetDayStats, PipelineError> {
    let snapshot_path = info.asset_dir.join(SNAPSHOT_CSV);
    if !snapshot_path.exists() {
        return Err(PipelineError::AssetMissingSnapshot {
            asset: info.asset_code.clone(),
            date: date_str.to_string(),
        });
    }

    let snapshots = parse_snapshot_csv(&snapshot_path)?;

    let order_path = info.asset_dir.join(ORDER_CSV);
    let orders = if order_path.exists() {
        parse_order_csv(&order_path, &info.asset_code)?
    } else {
        Vec::new()
    };
    let trade_path = info.asset_dir.join(TRADE_CSV);
    let trades = if trade_path.exists() {
        parse_trade_csv(&trade_path, &info.asset_code)?
    } else {
        Vec::new()
    };
    let events = merge_events(orders, trades);

    // Interleave: all events up to and including a snapshot's second go
    // through the book before that snapshot is analyzed
    let mut next_event = 0;
    for snap in &snapshots {
        let cutoff = PackedTime::new(snap.hour, snap.minute, snap.second, u8::MAX);
        while next_event < events.len() && events[next_event].time() <= cutoff {
            ctx.process_order(&events[next_event]);
            next_event += 1;
        }
        ctx.process_snapshot(snap);
    }
    while next_event < events.len() {
        ctx.process_order(&events[next_event]);
        next_event += 1;
    }

    let stats = ctx.finish();

    let date = NaiveDate::parse_from_str(date_str, "%Y%m%d").map_err(|e| {
        PipelineError::ConfigInvalid {
            reason: format!("bad folder date {:?}: {}", date_str, e),
        }
    })?;
    let out_dir = config.output_dir(date, &info.asset_code);
    dump_snapshot_csv(ctx.snapshots(), &info.asset_code, &out_dir)?;
    dump_bar_csv(ctx.bars(), &info.asset_code, &out_dir)?;

    Ok(stats)
}
