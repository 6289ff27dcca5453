//! `WorkerPool` implementation on dedicated OS threads.
//!
//! # Design Principles
//!
//! - **No polling on the hot path**: workers block on channel recv
//! - **Clean shutdown**: dropping the sender unblocks idle workers naturally
//! - **Lock-free counters**: statistics are plain atomics

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::core::SchedulerError;

use super::{Job, Permit, PoolCounters, PoolStats, Refused, Slots};

/// How long a waiting submitter blocks before re-checking whether to keep waiting.
const WAIT_SLICE: Duration = Duration::from_millis(50);

type Envelope = (Job, Permit);

/// Fixed-size pool of worker threads.
pub struct WorkerPool {
    /// Pool name, used as worker thread name prefix.
    name: String,

    /// Pool configuration.
    config: PoolConfig,

    /// Job sender (to workers). `None` once shut down.
    job_tx: Mutex<Option<Sender<Envelope>>>,

    /// `worker_count + queue_depth` admission slots.
    slots: Arc<Slots>,

    /// Pool statistics counters.
    counters: Arc<PoolCounters>,

    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `config.worker_count` worker threads named `<name>-worker-<n>`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::Internal` if a worker thread cannot be spawned
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let name = name.into();

        // Permits bound what is in the channel, so a send never finds it full.
        let capacity = config.worker_count + config.queue_depth;
        let (job_tx, job_rx) = bounded::<Envelope>(capacity);
        let counters = Arc::new(PoolCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker = spawn_worker(
                &name,
                worker_id,
                job_rx.clone(),
                Arc::clone(&counters),
                Arc::clone(&shutdown),
                config.thread_stack_size,
            );
            match worker {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Workers already spawned exit once the sender drops.
                    shutdown.store(true, Ordering::Release);
                    return Err(SchedulerError::Internal(format!(
                        "failed to spawn worker {worker_id} for pool `{name}`: {e}"
                    )));
                }
            }
        }

        info!(
            pool = %name,
            worker_count = config.worker_count,
            queue_depth = config.queue_depth,
            "WorkerPool initialized"
        );

        Ok(Self {
            name,
            config,
            job_tx: Mutex::new(Some(job_tx)),
            slots: Slots::new(capacity),
            counters,
            shutdown,
            workers: Mutex::new(workers),
        })
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Claim a slot without blocking.
    pub(crate) fn try_reserve(&self) -> Result<Permit, Refused> {
        if self.is_shutdown() {
            return Err(Refused::Shutdown);
        }
        self.slots.try_acquire().ok_or_else(|| {
            self.counters.rejected_tasks.fetch_add(1, Ordering::Relaxed);
            debug!(pool = %self.name, "Worker pool saturated");
            Refused::Busy
        })
    }

    /// Claim a slot, blocking until one frees.
    ///
    /// `keep_waiting` is checked every slice; once it returns `false` the call gives
    /// up with `Refused::Withdrawn`. Never returns `Refused::Busy`.
    pub(crate) fn reserve_waiting(&self, keep_waiting: impl Fn() -> bool) -> Result<Permit, Refused> {
        loop {
            if self.is_shutdown() {
                return Err(Refused::Shutdown);
            }
            if !keep_waiting() {
                return Err(Refused::Withdrawn);
            }
            if let Some(permit) = self.slots.acquire_for(WAIT_SLICE) {
                return Ok(permit);
            }
        }
    }

    /// Queue `job` under a slot claimed from this pool.
    pub(crate) fn execute(&self, permit: Permit, job: Job) -> Result<(), Refused> {
        let job_tx = self.job_tx.lock();
        let Some(tx) = job_tx.as_ref() else {
            return Err(Refused::Shutdown);
        };

        // Count before sending so a fast worker never decrements below zero.
        self.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        match tx.try_send((job, permit)) {
            Ok(()) => {
                self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                self.counters.rejected_tasks.fetch_add(1, Ordering::Relaxed);
                error!(pool = %self.name, "Job queue full despite a free slot");
                Err(Refused::Busy)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                Err(Refused::Shutdown)
            }
        }
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(
            self.config.worker_count,
            self.config.queue_depth,
            self.slots.in_use(),
        )
    }

    /// Shut the pool down, waiting up to `timeout` for workers to exit.
    ///
    /// Queued jobs that have not started are dropped. Workers still busy at the
    /// deadline are detached. Returns the number of detached workers; a second
    /// call is a no-op returning 0.
    pub fn shutdown(&self, timeout: Duration) -> usize {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return 0;
        }

        info!(pool = %self.name, "Shutting down worker pool");

        // Drop the sender to unblock all workers waiting on recv()
        {
            let mut job_tx = self.job_tx.lock();
            *job_tx = None;
        }

        let deadline = Instant::now() + timeout;
        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        let mut detached = 0;

        for (idx, worker) in workers.drain(..).enumerate() {
            if worker.is_finished() {
                let _ = worker.join();
                continue;
            }

            let (tx, rx) = bounded(1);
            let join_thread = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });

            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(true) => {
                    debug!(pool = %self.name, worker_id = idx, "Worker joined");
                }
                Ok(false) => {
                    warn!(pool = %self.name, worker_id = idx, "Worker panicked");
                }
                Err(_) => {
                    warn!(
                        pool = %self.name,
                        worker_id = idx,
                        "Worker did not exit within timeout - detaching"
                    );
                    detached += 1;
                    continue;
                }
            }
            let _ = join_thread.join();
        }

        info!(
            pool = %self.name,
            worker_count = worker_count,
            detached = detached,
            "Worker pool shut down complete"
        );
        detached
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join; explicit shutdown() is the graceful path.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let mut job_tx = self.job_tx.lock();
            *job_tx = None;
            debug!(pool = %self.name, "WorkerPool dropped without explicit shutdown");
        }
    }
}

/// Spawn a worker thread.
fn spawn_worker(
    pool_name: &str,
    worker_id: usize,
    job_rx: Receiver<Envelope>,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    let pool = pool_name.to_string();
    thread::Builder::new()
        .name(format!("{pool_name}-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(pool = %pool, worker_id = worker_id, "Worker thread started");

            // When every sender is dropped, recv returns Err and the worker exits.
            while let Ok((job, permit)) = job_rx.recv() {
                counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);

                if shutdown.load(Ordering::Acquire) {
                    debug!(pool = %pool, worker_id = worker_id, "Dropping job received after shutdown");
                    drop(job);
                    drop(permit);
                    break;
                }

                counters.active_tasks.fetch_add(1, Ordering::Relaxed);
                let outcome = panic::catch_unwind(AssertUnwindSafe(move || job(permit)));
                counters.active_tasks.fetch_sub(1, Ordering::Relaxed);

                if outcome.is_ok() {
                    counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                    error!(pool = %pool, worker_id = worker_id, "Job panicked");
                }
            }

            debug!(pool = %pool, worker_id = worker_id, "Worker thread exiting");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config(workers: usize, queue: usize) -> PoolConfig {
        PoolConfig::new(workers).with_queue_depth(queue)
    }

    fn run(pool: &WorkerPool, job: impl FnOnce() + Send + 'static) -> Result<(), Refused> {
        let permit = pool.try_reserve()?;
        pool.execute(permit, Box::new(move |_permit: Permit| job()))
    }

    #[test]
    fn test_worker_pool_runs_jobs() {
        let pool = WorkerPool::new("test", config(2, 8)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = bounded(8);

        for _ in 0..4 {
            let count = Arc::clone(&count);
            let done_tx = done_tx.clone();
            let queued = run(&pool, move || {
                count.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(());
            });
            assert!(queued.is_ok());
        }
        for _ in 0..4 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(pool.stats().submitted_tasks, 4);
        assert_eq!(pool.shutdown(Duration::from_secs(2)), 0);
    }

    #[test]
    fn test_sequential_jobs_on_idle_unqueued_pool() {
        let pool = WorkerPool::new("seq", config(1, 0)).unwrap();
        for i in 0..500 {
            let (done_tx, done_rx) = bounded::<usize>(1);
            let permit = pool.try_reserve().expect("idle pool refused a job");
            let queued = pool.execute(
                permit,
                Box::new(move |permit: Permit| {
                    // Freed before the result is published.
                    drop(permit);
                    let _ = done_tx.send(i);
                }),
            );
            assert!(queued.is_ok());
            assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), i);
        }
        assert_eq!(pool.stats().rejected_tasks, 0);
        pool.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn test_full_pool_reports_busy() {
        let pool = WorkerPool::new("busy", config(1, 1)).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);

        assert!(run(&pool, move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        })
        .is_ok());
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(run(&pool, || {}).is_ok());

        assert_eq!(run(&pool, || {}), Err(Refused::Busy));
        let stats = pool.stats();
        assert_eq!(stats.reserved_slots, 2);
        assert_eq!(stats.rejected_tasks, 1);

        release_tx.send(()).unwrap();
        pool.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn test_waiting_reserve_withdraws() {
        let pool = WorkerPool::new("withdraw", config(1, 0)).unwrap();
        let held = pool.try_reserve().unwrap();
        let checks = AtomicUsize::new(0);

        let outcome = pool.reserve_waiting(|| checks.fetch_add(1, Ordering::SeqCst) < 2);
        assert!(matches!(outcome, Err(Refused::Withdrawn)));
        assert_eq!(checks.load(Ordering::SeqCst), 3);

        drop(held);
        assert!(pool.reserve_waiting(|| true).is_ok());
        pool.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new("panic", config(1, 4)).unwrap();
        let (done_tx, done_rx) = bounded(1);

        assert!(run(&pool, || panic!("boom")).is_ok());
        assert!(run(&pool, move || {
            let _ = done_tx.send(());
        })
        .is_ok());

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.failed_tasks, 1);
        pool.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_refuses_work() {
        let pool = WorkerPool::new("stop", config(2, 2)).unwrap();
        let permit = pool.try_reserve().unwrap();
        assert_eq!(pool.shutdown(Duration::from_secs(2)), 0);
        assert_eq!(pool.shutdown(Duration::from_secs(2)), 0);
        assert!(pool.is_shutdown());
        assert_eq!(pool.try_reserve().err(), Some(Refused::Shutdown));
        assert_eq!(pool.reserve_waiting(|| true).err(), Some(Refused::Shutdown));
        assert_eq!(pool.execute(permit, Box::new(|_| {})), Err(Refused::Shutdown));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = WorkerPool::new("bad", config(0, 0)).err().unwrap();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }
}
