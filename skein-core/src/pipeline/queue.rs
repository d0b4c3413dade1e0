//! Work-queue plumbing shared by the worker pool
//!
//! Three pieces, mirroring the extraction → encode handoff:
//! - a counting [`Semaphore`] bounding extracted temp folders on disk;
//! - a move-only RAII [`FolderToken`] that owns one temp folder, giving
//!   its permit back and deleting the folder when dropped, including
//!   on panic or early shutdown, so no partial output survives;
//! - a bounded, closeable MPMC [`FolderQueue`] of complete day folders,
//!   plus the [`ActiveFolder`] state all encoders cooperate on.

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Counting semaphore: one permit per extracted temp folder.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Block until a permit is free.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Non-blocking variant for shutdown-aware loops.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    pub fn release(&self) {
        *self.permits.lock() += 1;
        self.available.notify_one();
    }

    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }
}

/// Move-only ownership of one extracted temp folder.
///
/// Dropping the token releases its disk permit immediately and deletes
/// the folder on a detached thread so workers never block on teardown.
pub struct FolderToken {
    temp_root: PathBuf,
    slots: Arc<Semaphore>,
    armed: bool,
}

impl FolderToken {
    /// The caller must already hold one permit from `slots`.
    pub fn new(temp_root: PathBuf, slots: Arc<Semaphore>) -> Self {
        Self {
            temp_root,
            slots,
            armed: true,
        }
    }

    pub fn temp_root(&self) -> &PathBuf {
        &self.temp_root
    }

    /// Keep the folder on disk (debug mode); the permit is still
    /// returned on drop.
    pub fn keep_files(&mut self) -> PathBuf {
        self.armed = false;
        self.temp_root.clone()
    }
}

impl Drop for FolderToken {
    fn drop(&mut self) {
        self.slots.release();
        if self.armed && self.temp_root.exists() {
            let path = self.temp_root.clone();
            std::thread::spawn(move || {
                let _ = std::fs::remove_dir_all(path);
            });
        }
    }
}

/// One asset inside a day folder.
#[derive(Debug, Clone)]
pub struct AssetInfo {
    pub asset_dir: PathBuf,
    pub asset_code: String,
}

/// A fully-extracted day folder, ready for encoding.
pub struct FolderWorkItem {
    /// `YYYYMMDD` of the day archive.
    pub date_str: String,
    pub assets: Vec<AssetInfo>,
    pub token: FolderToken,
}

/// Bounded, closeable MPMC queue of complete day folders.
pub struct FolderQueue {
    queue: ArrayQueue<FolderWorkItem>,
    closed: AtomicBool,
}

impl FolderQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
        }
    }

    /// Non-blocking push; returns the item back when the queue is full
    /// so the producer can re-check the shutdown flag and retry.
    pub fn try_push(&self, item: FolderWorkItem) -> Result<(), FolderWorkItem> {
        self.queue.push(item)
    }

    pub fn try_pop(&self) -> Option<FolderWorkItem> {
        self.queue.pop()
    }

    /// Signal that no further folders will arrive. Consumers exit once
    /// closed and drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_closed_and_empty(&self) -> bool {
        self.is_closed() && self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The single folder all encoders currently cooperate on. Workers claim
/// assets with a fetch-add over `next_asset_index` and count completions
/// in `processed`; the last completion retires the folder (and its
/// token).
pub struct ActiveFolder {
    pub date_str: String,
    pub assets: Vec<AssetInfo>,
    pub total: usize,
    next_asset_index: AtomicUsize,
    processed: AtomicUsize,
    _token: FolderToken,
}

impl ActiveFolder {
    pub fn new(item: FolderWorkItem) -> Self {
        let total = item.assets.len();
        Self {
            date_str: item.date_str,
            assets: item.assets,
            total,
            next_asset_index: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            _token: item.token,
        }
    }

    /// Claim the next unprocessed asset, if any remain.
    pub fn claim(&self) -> Option<(usize, &AssetInfo)> {
        let index = self.next_asset_index.fetch_add(1, Ordering::Relaxed);
        self.assets.get(index).map(|info| (index, info))
    }

    /// Record one finished asset; returns the running total.
    pub fn complete_one(&self) -> usize {
        self.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.processed() >= self.total
    }
}
