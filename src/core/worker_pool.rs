//! Worker pools backing schedulers.
//!
//! A `WorkerPool` is a fixed set of dedicated OS threads fed by a bounded channel.
//! The registry owns one pool per shared [`PoolKind`](crate::core::PoolKind); each
//! custom scheduler owns an exclusive one.
//!
//! # Key Features
//!
//! - **Admission control**: a pool admits at most `worker_count + queue_depth`
//!   unfinished jobs. Each holds a [`Permit`]; `try_reserve` fails as soon as none
//!   is free, `reserve_waiting` blocks until one frees
//! - **Panic isolation**: a panicking job is counted as failed, the worker survives
//! - **Bounded shutdown**: workers that do not exit before the deadline are detached

mod native;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

pub use native::WorkerPool;

/// Unit of work run by a worker thread.
///
/// The job receives the permit it was admitted with. Dropping it frees the slot,
/// so a job can free it before publishing its result.
pub(crate) type Job = Box<dyn FnOnce(Permit) + Send + 'static>;

/// Why a pool refused work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refused {
    /// Every worker is busy and the queue is full.
    Busy,
    /// The pool has been shut down.
    Shutdown,
    /// The submitter stopped waiting for a slot.
    Withdrawn,
}

/// Admission slots of one pool.
#[derive(Debug)]
pub(crate) struct Slots {
    capacity: usize,
    used: Mutex<usize>,
    freed: Condvar,
}

impl Slots {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            used: Mutex::new(0),
            freed: Condvar::new(),
        })
    }

    pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut used = self.used.lock();
        if *used >= self.capacity {
            return None;
        }
        *used += 1;
        Some(Permit {
            slots: Arc::clone(self),
        })
    }

    /// Wait up to `timeout` for a slot.
    pub(crate) fn acquire_for(self: &Arc<Self>, timeout: Duration) -> Option<Permit> {
        let mut used = self.used.lock();
        if *used >= self.capacity {
            // Spurious wakeups just end the slice early.
            let _ = self.freed.wait_for(&mut used, timeout);
        }
        if *used >= self.capacity {
            return None;
        }
        *used += 1;
        Some(Permit {
            slots: Arc::clone(self),
        })
    }

    pub(crate) fn in_use(&self) -> usize {
        *self.used.lock()
    }
}

/// One admitted job's claim on pool capacity. Freed on drop.
#[derive(Debug)]
pub(crate) struct Permit {
    slots: Arc<Slots>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut used = self.slots.used.lock();
        *used = used.saturating_sub(1);
        self.slots.freed.notify_one();
    }
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Configured queue depth.
    pub queue_depth: usize,
    /// Accepted jobs not yet finished, out of `worker_count + queue_depth`.
    pub reserved_slots: usize,
    /// Currently executing jobs.
    pub active_tasks: u64,
    /// Jobs waiting in the queue.
    pub queued_tasks: u64,
    /// Jobs completed without panicking.
    pub completed_tasks: u64,
    /// Jobs that panicked.
    pub failed_tasks: u64,
    /// Jobs accepted.
    pub submitted_tasks: u64,
    /// Jobs refused because the pool was busy.
    pub rejected_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub rejected_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize, queue_depth: usize, reserved_slots: usize) -> PoolStats {
        PoolStats {
            worker_count,
            queue_depth,
            reserved_slots,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            rejected_tasks: self.rejected_tasks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_default() {
        let stats = PoolStats::default();
        assert_eq!(stats.worker_count, 0);
        assert_eq!(stats.active_tasks, 0);
        assert_eq!(stats.completed_tasks, 0);
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.submitted_tasks.fetch_add(10, Ordering::Relaxed);
        counters.completed_tasks.fetch_add(5, Ordering::Relaxed);
        counters.rejected_tasks.fetch_add(2, Ordering::Relaxed);

        let stats = counters.snapshot(4, 8, 3);
        assert_eq!(stats.worker_count, 4);
        assert_eq!(stats.queue_depth, 8);
        assert_eq!(stats.reserved_slots, 3);
        assert_eq!(stats.submitted_tasks, 10);
        assert_eq!(stats.completed_tasks, 5);
        assert_eq!(stats.rejected_tasks, 2);
    }

    #[test]
    fn test_permits_bound_capacity() {
        let slots = Slots::new(2);
        let a = slots.try_acquire().unwrap();
        let _b = slots.try_acquire().unwrap();
        assert!(slots.try_acquire().is_none());
        assert!(slots.acquire_for(Duration::from_millis(10)).is_none());
        assert_eq!(slots.in_use(), 2);

        drop(a);
        assert_eq!(slots.in_use(), 1);
        assert!(slots.acquire_for(Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_waiter_woken_when_permit_freed() {
        let slots = Slots::new(1);
        let held = slots.try_acquire().unwrap();
        let waiter = {
            let slots = Arc::clone(&slots);
            std::thread::spawn(move || slots.acquire_for(Duration::from_secs(5)).is_some())
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(held);
        assert!(waiter.join().unwrap());
    }
}
