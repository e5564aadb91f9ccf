//! Per-worker progress accounting. Workers push with relaxed atomics; renderers poll snapshots.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, TryLockError};
use std::time::Instant;

use crate::state::WorkerStatus;

struct WorkerSlot {
    written: AtomicU64,
    expected: AtomicU64,
    status: AtomicU8,
    started_at: Instant,
}

impl WorkerSlot {
    fn new(expected: u64) -> Self {
        Self {
            written: AtomicU64::new(0),
            expected: AtomicU64::new(expected),
            status: AtomicU8::new(WorkerStatus::Pending as u8),
            started_at: Instant::now(),
        }
    }
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub index: usize,
    pub bytes_written: u64,
    pub expected: u64,
    pub percent: u8,
    pub status: WorkerStatus,
    pub bytes_per_sec: u64,
}

/// `floor(written / expected * 100)` clamped to `[0, 100]`; empty ranges are complete.
pub fn percent(written: u64, expected: u64) -> u8 {
    if expected == 0 {
        return 100;
    }
    let pct = (written as u128 * 100) / expected as u128;
    pct.min(100) as u8
}

/// Shared progress state for one run.
///
/// The slot table is only replaced by [`ProgressTracker::reset`] at the start of a
/// run. Workers keep a [`WorkerProgress`] handle to their own slot, so updates on
/// the write path are plain atomic stores.
pub struct ProgressTracker {
    slots: RwLock<Arc<[Arc<WorkerSlot>]>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Replaces all slots with one fresh slot per expected range length and hands
    /// back the matching worker handles in index order.
    pub fn reset(&self, expected: &[u64]) -> Vec<WorkerProgress> {
        let slots: Arc<[Arc<WorkerSlot>]> = expected
            .iter()
            .map(|&len| Arc::new(WorkerSlot::new(len)))
            .collect();
        let handles = slots
            .iter()
            .map(|slot| WorkerProgress {
                slot: Arc::clone(slot),
            })
            .collect();
        *self.slots.write().unwrap_or_else(|e| e.into_inner()) = slots;
        handles
    }

    fn table(&self) -> Arc<[Arc<WorkerSlot>]> {
        let guard = self.slots.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Handle for the worker at `index`, or `None` if no such slot exists.
    pub fn handle(&self, index: usize) -> Option<WorkerProgress> {
        self.table()
            .get(index)
            .map(|slot| WorkerProgress { slot: Arc::clone(slot) })
    }

    /// Records progress for a worker by index. Unknown indices are ignored.
    ///
    /// Never blocks: while [`ProgressTracker::reset`] is swapping the slot table
    /// the update is dropped, since it would land in a slot about to be replaced.
    pub fn record(&self, index: usize, bytes_written: u64, expected: u64) {
        let table = match self.slots.try_read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(TryLockError::Poisoned(e)) => Arc::clone(&*e.into_inner()),
            Err(TryLockError::WouldBlock) => return,
        };
        if let Some(slot) = table.get(index) {
            slot.expected.store(expected, Ordering::Relaxed);
            slot.written.store(bytes_written, Ordering::Relaxed);
        }
    }

    pub fn worker_count(&self) -> usize {
        self.table().len()
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.table()
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let bytes_written = slot.written.load(Ordering::Relaxed);
                let expected = slot.expected.load(Ordering::Relaxed);
                let elapsed = slot.started_at.elapsed().as_secs_f64();
                let bytes_per_sec = if elapsed > 0.0 {
                    (bytes_written as f64 / elapsed) as u64
                } else {
                    0
                };
                WorkerSnapshot {
                    index,
                    bytes_written,
                    expected,
                    percent: percent(bytes_written, expected),
                    status: WorkerStatus::from_u8(slot.status.load(Ordering::Relaxed)),
                    bytes_per_sec,
                }
            })
            .collect()
    }

    pub fn total_written(&self) -> u64 {
        self.table()
            .iter()
            .map(|s| s.written.load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_expected(&self) -> u64 {
        self.table()
            .iter()
            .map(|s| s.expected.load(Ordering::Relaxed))
            .sum()
    }

    /// True once every worker has reached a terminal status.
    pub fn all_settled(&self) -> bool {
        self.table()
            .iter()
            .all(|s| WorkerStatus::from_u8(s.status.load(Ordering::Relaxed)).is_terminal())
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A worker's private view of its own slot.
#[derive(Clone)]
pub struct WorkerProgress {
    slot: Arc<WorkerSlot>,
}

impl WorkerProgress {
    pub fn set_written(&self, bytes_written: u64) {
        self.slot.written.store(bytes_written, Ordering::Relaxed);
    }

    pub fn set_status(&self, status: WorkerStatus) {
        self.slot.status.store(status as u8, Ordering::Relaxed);
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.slot.status.load(Ordering::Relaxed))
    }
}
