//! CPU affinity for encoder threads
//!
//! Each encoding worker is pinned to its own core so a day's replay
//! keeps its book and feature state hot in cache instead of migrating
//! between cores. Pinning is best-effort: containers and restricted
//! environments may refuse, and the pipeline still runs unpinned.

use anyhow::Result;
use core_affinity::CoreId;

/// Pin the current thread to one CPU core.
pub fn pin_to_core(core: usize) -> Result<()> {
    let core_id = CoreId { id: core };
    if core_affinity::set_for_current(core_id) {
        tracing::debug!("pinned thread to core {}", core);
        Ok(())
    } else {
        anyhow::bail!("failed to pin thread to core {}", core)
    }
}

/// Number of CPU cores visible to the process.
pub fn num_cores() -> usize {
    core_affinity::get_core_ids()
        .map(|ids| ids.len())
        .unwrap_or(1)
}

/// Raise the current thread to SCHED_FIFO at the given priority.
/// Requires CAP_SYS_NICE; callers treat failure as advisory.
#[cfg(target_os = "linux")]
pub fn set_realtime_priority(priority: i32) -> Result<()> {
    use libc::{sched_param, sched_setscheduler, SCHED_FIFO};

    // SAFETY: sched_setscheduler only reads the param struct
    unsafe {
        let param = sched_param {
            sched_priority: priority,
        };
        if sched_setscheduler(0, SCHED_FIFO, &param) == 0 {
            tracing::debug!("thread scheduler set to SCHED_FIFO:{}", priority);
            Ok(())
        } else {
            anyhow::bail!("sched_setscheduler failed (needs CAP_SYS_NICE)")
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority(_priority: i32) -> Result<()> {
    tracing::warn!("realtime priority is only supported on Linux");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_cores_positive() {
        assert!(num_cores() >= 1);
    }

    #[test]
    fn test_pin_does_not_panic() {
        // May fail without permissions; only the absence of a panic
        // matters here
        let _ = pin_to_core(0);
    }
}
