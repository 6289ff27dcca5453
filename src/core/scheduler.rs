//! Scheduler handles: task submission, delayed and periodic work, and stop.
//!
//! A [`SchedulerHandle`] is bound to one worker pool. Shared kinds dispatch into the
//! registry's process-wide pool for that kind; custom schedulers own their pool and
//! shut it down when they stop.
//!
//! # Stop semantics
//!
//! 1. the state moves to `Stopping` and every new submission fails with `Rejected`;
//! 2. delayed and periodic timers are cancelled and joined, so nothing fires later;
//! 3. in-flight tasks get up to `timeout` to finish;
//! 4. if they do not, queued work is abandoned (skipped when it reaches a worker)
//!    and `StopTimeout` is returned;
//! 5. either way the state ends in `Stopped`. Further stop calls return `Ok(())`.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, select, tick, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SchedulerOptions;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::pool_kind::owner_of;
use crate::core::task::{panic_message, ResultSlot, SlotCompleter, TaskHandle};
use crate::core::worker_pool::{Job, Permit, Refused, WorkerPool};
use crate::core::{PoolKind, SchedulerError};
use crate::util::clock::now_ms;

/// Grace period for an exclusive pool's idle workers to exit after stop.
const MIN_POOL_GRACE: Duration = Duration::from_millis(100);

/// Lifecycle state of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Constructed, not yet accepting work.
    Created,
    /// Accepting work.
    Running,
    /// Stop in progress; new work is rejected.
    Stopping,
    /// Terminal.
    Stopped,
}

impl SchedulerState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Identity and configuration snapshot of a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerInfo {
    /// Scheduler name.
    pub name: String,
    /// Owner prefix of the name.
    pub owner: String,
    /// Pool kind.
    pub kind: PoolKind,
    /// Exclusive worker count (custom only).
    pub max_concurrent_tasks: Option<usize>,
    /// Whether submitters block on a saturated pool.
    pub wait_allowed: bool,
    /// Creation time in milliseconds since epoch.
    pub created_at_ms: u128,
    /// Current state.
    pub state: SchedulerState,
}

/// Per-scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Tasks accepted and not yet finished.
    pub in_flight: usize,
    /// Tasks accepted by the pool.
    pub submitted: u64,
    /// Tasks that ran to completion.
    pub completed: u64,
    /// Tasks that panicked.
    pub failed: u64,
    /// Submissions refused (stopped or busy).
    pub rejected: u64,
    /// Live delayed/periodic timers.
    pub timers: usize,
}

/// State shared with jobs in flight.
struct TaskContext {
    name: String,
    state: AtomicU8,
    in_flight: Mutex<usize>,
    drained: Condvar,
    abandoned: AtomicBool,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl TaskContext {
    fn new(name: String) -> Self {
        Self {
            name,
            state: AtomicU8::new(SchedulerState::Created.as_u8()),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
            abandoned: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Count a task as in flight until the returned guard drops.
    fn begin(self: &Arc<Self>) -> FlightGuard {
        *self.in_flight.lock() += 1;
        FlightGuard {
            ctx: Arc::clone(self),
        }
    }

    /// Wait for in-flight work to reach zero. Whatever is left at the deadline is
    /// abandoned and returned.
    fn drain_or_abandon(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            if self.drained.wait_until(&mut in_flight, deadline).timed_out() {
                break;
            }
        }
        if *in_flight > 0 {
            self.abandoned.store(true, Ordering::Release);
        }
        *in_flight
    }

    /// Run `start` for a job reaching its worker, unless its work was abandoned.
    ///
    /// Holds the in-flight lock, so a job either starts before `drain_or_abandon`
    /// gives up or never starts.
    fn admit(&self, start: impl FnOnce() -> bool) -> bool {
        let _in_flight = self.in_flight.lock();
        !self.abandoned.load(Ordering::Acquire) && start()
    }

    fn reject(&self) -> SchedulerError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        SchedulerError::Rejected(self.name.clone())
    }
}

struct FlightGuard {
    ctx: Arc<TaskContext>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.ctx.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.ctx.drained.notify_all();
        }
    }
}

/// Pool a scheduler dispatches into.
pub(crate) enum PoolBinding {
    /// Registry-owned pool shared with every scheduler of the same kind.
    Shared(Arc<WorkerPool>),
    /// Pool owned by this scheduler alone.
    Exclusive(WorkerPool),
}

impl PoolBinding {
    fn pool(&self) -> &WorkerPool {
        match self {
            Self::Shared(pool) => pool,
            Self::Exclusive(pool) => pool,
        }
    }
}

/// Dropping the sender wakes the timer thread's `select!`.
#[derive(Debug, Clone)]
struct CancelSignal(Arc<Mutex<Option<Sender<()>>>>);

impl CancelSignal {
    fn new(tx: Sender<()>) -> Self {
        Self(Arc::new(Mutex::new(Some(tx))))
    }

    /// Returns `true` if this call did the cancelling.
    fn fire(&self) -> bool {
        self.0.lock().take().is_some()
    }

    fn is_fired(&self) -> bool {
        self.0.lock().is_none()
    }
}

struct Timer {
    cancel: CancelSignal,
    thread: JoinHandle<()>,
}

/// Handle to a periodic task.
#[derive(Debug, Clone)]
pub struct CancellableHandle {
    scheduler: String,
    cancel: CancelSignal,
    fires: Arc<AtomicU64>,
}

impl CancellableHandle {
    /// Stop future runs. A run already in progress completes. Returns `true` if the
    /// task was still active.
    pub fn cancel(&self) -> bool {
        self.cancel.fire()
    }

    /// Whether the task was cancelled directly or by its scheduler stopping.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_fired()
    }

    /// Number of runs that have started.
    #[must_use]
    pub fn fire_count(&self) -> u64 {
        self.fires.load(Ordering::SeqCst)
    }

    /// Name of the owning scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }
}

/// Clears the overlap flag and signals completion when a periodic run ends,
/// whether it ran or was dropped.
struct RunGuard {
    running: Arc<AtomicBool>,
    done: Option<Sender<()>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(done) = self.done.take() {
            let _ = done.try_send(());
        }
    }
}

struct PeriodicTask {
    task: Arc<dyn Fn() + Send + Sync>,
    running: Arc<AtomicBool>,
    fires: Arc<AtomicU64>,
}

impl PeriodicTask {
    /// Dispatch one run. `Ok(false)` when the previous run is still going.
    fn fire(
        &self,
        ctx: &Arc<TaskContext>,
        pool: &WorkerPool,
        done: Option<Sender<()>>,
    ) -> Result<bool, SchedulerError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let run_guard = RunGuard {
            running: Arc::clone(&self.running),
            done,
        };
        let permit = reserve(ctx, pool, false)?;
        let flight = ctx.begin();
        if !ctx.is_running() {
            drop(flight);
            return Err(ctx.reject());
        }

        let task = Arc::clone(&self.task);
        let fires = Arc::clone(&self.fires);
        let job_ctx = Arc::clone(ctx);
        let job: Job = Box::new(move |permit: Permit| {
            let _flight = flight;
            let _run_guard = run_guard;
            let _permit = permit;
            let started = job_ctx.admit(|| {
                fires.fetch_add(1, Ordering::SeqCst);
                true
            });
            if !started {
                return;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| task())) {
                Ok(()) => {
                    job_ctx.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    job_ctx.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        scheduler = %job_ctx.name,
                        error = %panic_message(payload.as_ref()),
                        "Periodic task panicked"
                    );
                }
            }
        });
        dispatch(ctx, pool, permit, job).map(|()| true)
    }
}

fn refusal(ctx: &TaskContext, refused: Refused) -> SchedulerError {
    match refused {
        Refused::Busy => {
            ctx.rejected.fetch_add(1, Ordering::Relaxed);
            SchedulerError::PoolBusy(ctx.name.clone())
        }
        Refused::Shutdown | Refused::Withdrawn => ctx.reject(),
    }
}

/// Claim a pool slot. A waiting claim gives up as soon as the scheduler leaves
/// `Running`.
fn reserve(ctx: &TaskContext, pool: &WorkerPool, wait: bool) -> Result<Permit, SchedulerError> {
    let reserved = if wait {
        pool.reserve_waiting(|| ctx.is_running())
    } else {
        pool.try_reserve()
    };
    reserved.map_err(|refused| refusal(ctx, refused))
}

/// Hand a job to the pool under its claimed slot.
fn dispatch(
    ctx: &TaskContext,
    pool: &WorkerPool,
    permit: Permit,
    job: Job,
) -> Result<(), SchedulerError> {
    pool.execute(permit, job)
        .map(|()| {
            ctx.submitted.fetch_add(1, Ordering::Relaxed);
        })
        .map_err(|refused| refusal(ctx, refused))
}

/// Wrap a one-shot task with accounting and dispatch it.
fn enqueue_task<F, T>(
    ctx: &Arc<TaskContext>,
    pool: &WorkerPool,
    task: F,
    completer: SlotCompleter<T>,
    wait: bool,
) -> Result<(), SchedulerError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    // Not in flight while waiting for a slot, so stop never waits on us.
    let permit = reserve(ctx, pool, wait)?;
    let flight = ctx.begin();
    // Checked after counting, so a concurrent stop either waits for us or we see it.
    if !ctx.is_running() {
        drop(flight);
        return Err(ctx.reject());
    }

    let job_ctx = Arc::clone(ctx);
    let job: Job = Box::new(move |permit: Permit| {
        let _flight = flight;
        if !job_ctx.admit(|| completer.claim()) {
            return;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        // The slot frees before the result is visible to a waiting submitter.
        drop(permit);
        match outcome {
            Ok(value) => {
                job_ctx.completed.fetch_add(1, Ordering::Relaxed);
                completer.finish(Ok(value));
            }
            Err(payload) => {
                job_ctx.failed.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(payload.as_ref());
                warn!(scheduler = %job_ctx.name, error = %message, "Task panicked");
                completer.finish(Err(SchedulerError::TaskFailed(message)));
            }
        }
    });
    dispatch(ctx, pool, permit, job)
}

struct Inner {
    ctx: Arc<TaskContext>,
    kind: PoolKind,
    options: SchedulerOptions,
    created_at_ms: u128,
    pool: PoolBinding,
    timers: Mutex<Vec<Timer>>,
    stop_lock: Mutex<()>,
    default_stop_timeout: Duration,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.ctx.state() != SchedulerState::Stopped {
            warn!(
                scheduler = %self.ctx.name,
                "Scheduler dropped without being stopped; cancelling its timers"
            );
            self.ctx.set_state(SchedulerState::Stopped);
            for timer in self.timers.get_mut().drain(..) {
                timer.cancel.fire();
            }
        }
    }
}

/// Handle to one scheduler. Clones share the same scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<Inner>,
}

impl SchedulerHandle {
    pub(crate) fn new(
        name: String,
        kind: PoolKind,
        options: SchedulerOptions,
        pool: PoolBinding,
        default_stop_timeout: Duration,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: Arc::new(TaskContext::new(name)),
                kind,
                options,
                created_at_ms: now_ms(),
                pool,
                timers: Mutex::new(Vec::new()),
                stop_lock: Mutex::new(()),
                default_stop_timeout,
                audit,
            }),
        }
    }

    /// `Created` → `Running`.
    pub(crate) fn mark_running(&self) {
        let _ = self.inner.ctx.state.compare_exchange(
            SchedulerState::Created.as_u8(),
            SchedulerState::Running.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Scheduler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.ctx.name
    }

    /// Owner prefix of the name.
    #[must_use]
    pub fn owner(&self) -> String {
        owner_of(self.name())
    }

    /// Pool kind.
    #[must_use]
    pub fn kind(&self) -> PoolKind {
        self.inner.kind
    }

    /// Exclusive worker count; `None` for shared kinds.
    #[must_use]
    pub fn max_concurrent_tasks(&self) -> Option<usize> {
        self.inner.options.max_concurrent_tasks
    }

    /// Creation time in milliseconds since epoch.
    #[must_use]
    pub fn created_at_ms(&self) -> u128 {
        self.inner.created_at_ms
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.inner.ctx.state()
    }

    /// Whether the scheduler reached `Stopped`.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state() == SchedulerState::Stopped
    }

    /// Timeout used by [`stop_default`](Self::stop_default).
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.inner
            .options
            .shutdown_timeout
            .unwrap_or(self.inner.default_stop_timeout)
    }

    /// Whether two handles refer to the same scheduler.
    #[must_use]
    pub fn same_scheduler(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity snapshot.
    #[must_use]
    pub fn info(&self) -> SchedulerInfo {
        SchedulerInfo {
            name: self.name().to_string(),
            owner: self.owner(),
            kind: self.kind(),
            max_concurrent_tasks: self.max_concurrent_tasks(),
            wait_allowed: self.inner.options.wait_allowed,
            created_at_ms: self.created_at_ms(),
            state: self.state(),
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let ctx = &self.inner.ctx;
        SchedulerStats {
            in_flight: *ctx.in_flight.lock(),
            submitted: ctx.submitted.load(Ordering::Relaxed),
            completed: ctx.completed.load(Ordering::Relaxed),
            failed: ctx.failed.load(Ordering::Relaxed),
            rejected: ctx.rejected.load(Ordering::Relaxed),
            timers: self
                .inner
                .timers
                .lock()
                .iter()
                .filter(|t| !t.thread.is_finished())
                .count(),
        }
    }

    fn ensure_running(&self) -> Result<(), SchedulerError> {
        if self.inner.ctx.is_running() {
            Ok(())
        } else {
            Err(self.inner.ctx.reject())
        }
    }

    /// Submit a task.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Rejected` once the scheduler is stopping or stopped
    /// - `SchedulerError::PoolBusy` if every worker is busy, the queue is full and
    ///   waiting is not allowed
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_running()?;
        let slot = Arc::new(ResultSlot::new());
        enqueue_task(
            &self.inner.ctx,
            self.inner.pool.pool(),
            task,
            SlotCompleter::new(Arc::clone(&slot)),
            self.inner.options.wait_allowed,
        )?;
        debug!(scheduler = %self.name(), "Task submitted");
        Ok(TaskHandle::new(slot, self.name().to_string()))
    }

    /// Run `task` once after `delay`.
    ///
    /// The task is dispatched without waiting when due; if the pool is busy or the
    /// scheduler has stopped by then, the handle reports `Cancelled`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Rejected` if the scheduler is not running.
    pub fn schedule<F, T>(&self, task: F, delay: Duration) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_running()?;
        let slot = Arc::new(ResultSlot::new());
        let completer = SlotCompleter::new(Arc::clone(&slot));
        let weak = Arc::downgrade(&self.inner);

        self.spawn_timer("delayed", move |cancel_rx| {
            select! {
                recv(cancel_rx) -> _ => return,
                recv(after(delay)) -> _ => {}
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(e) = enqueue_task(&inner.ctx, inner.pool.pool(), task, completer, false) {
                warn!(scheduler = %inner.ctx.name, error = %e, "Delayed task not dispatched");
            }
        })?;
        Ok(TaskHandle::new(slot, self.name().to_string()))
    }

    /// Run `task` every `period`, first after `initial_delay`.
    ///
    /// Runs never overlap: a tick that arrives while the previous run is still
    /// going is skipped. A tick that finds the pool busy is skipped as well.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Rejected` if the scheduler is not running
    /// - `SchedulerError::InvalidConfig` if `period` is zero
    pub fn schedule_at_fixed_rate<F>(
        &self,
        task: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<CancellableHandle, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ensure_running()?;
        if period.is_zero() {
            return Err(SchedulerError::InvalidConfig("period must be greater than 0".into()));
        }
        let periodic = PeriodicTask {
            task: Arc::new(task),
            running: Arc::new(AtomicBool::new(false)),
            fires: Arc::new(AtomicU64::new(0)),
        };
        let fires = Arc::clone(&periodic.fires);
        let weak = Arc::downgrade(&self.inner);

        let cancel = self.spawn_timer("fixed-rate", move |cancel_rx| {
            select! {
                recv(cancel_rx) -> _ => return,
                recv(after(initial_delay)) -> _ => {}
            }
            let ticker = tick(period);
            loop {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match periodic.fire(&inner.ctx, inner.pool.pool(), None) {
                    Ok(true) => {}
                    Ok(false) => debug!(scheduler = %inner.ctx.name, "Previous run still active, tick skipped"),
                    Err(SchedulerError::PoolBusy(_)) => {
                        warn!(scheduler = %inner.ctx.name, "Pool busy, tick skipped");
                    }
                    Err(_) => break,
                }
                drop(inner);
                select! {
                    recv(cancel_rx) -> _ => break,
                    recv(ticker) -> _ => {}
                }
            }
        })?;

        Ok(CancellableHandle {
            scheduler: self.name().to_string(),
            cancel,
            fires,
        })
    }

    /// Run `task` repeatedly with `delay` between the end of one run and the start
    /// of the next, first after `initial_delay`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Rejected` if the scheduler is not running.
    pub fn schedule_with_fixed_delay<F>(
        &self,
        task: F,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<CancellableHandle, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ensure_running()?;
        let periodic = PeriodicTask {
            task: Arc::new(task),
            running: Arc::new(AtomicBool::new(false)),
            fires: Arc::new(AtomicU64::new(0)),
        };
        let fires = Arc::clone(&periodic.fires);
        let weak = Arc::downgrade(&self.inner);

        let cancel = self.spawn_timer("fixed-delay", move |cancel_rx| {
            select! {
                recv(cancel_rx) -> _ => return,
                recv(after(initial_delay)) -> _ => {}
            }
            loop {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let (done_tx, done_rx) = bounded::<()>(1);
                let fired = periodic.fire(&inner.ctx, inner.pool.pool(), Some(done_tx));
                let name = inner.ctx.name.clone();
                drop(inner);
                match fired {
                    Ok(_) => {
                        select! {
                            recv(cancel_rx) -> _ => break,
                            recv(done_rx) -> _ => {}
                        }
                    }
                    Err(SchedulerError::PoolBusy(_)) => {
                        warn!(scheduler = %name, "Pool busy, run postponed");
                    }
                    Err(_) => break,
                }
                select! {
                    recv(cancel_rx) -> _ => break,
                    recv(after(delay)) -> _ => {}
                }
            }
        })?;

        Ok(CancellableHandle {
            scheduler: self.name().to_string(),
            cancel,
            fires,
        })
    }

    fn spawn_timer<B>(&self, label: &str, body: B) -> Result<CancelSignal, SchedulerError>
    where
        B: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let cancel = CancelSignal::new(cancel_tx);
        let thread = thread::Builder::new()
            .name(format!("{}-{label}", self.name()))
            .spawn(move || body(cancel_rx))
            .map_err(|e| SchedulerError::Internal(format!("failed to spawn timer: {e}")))?;

        {
            let mut timers = self.inner.timers.lock();
            timers.retain(|t| !t.thread.is_finished());
            timers.push(Timer {
                cancel: cancel.clone(),
                thread,
            });
        }
        // A stop that raced past ensure_running has already drained the timer list.
        if !self.inner.ctx.is_running() {
            cancel.fire();
            return Err(self.inner.ctx.reject());
        }
        Ok(cancel)
    }

    /// Stop with [`shutdown_timeout`](Self::shutdown_timeout).
    ///
    /// # Errors
    ///
    /// See [`stop`](Self::stop).
    pub fn stop_default(&self) -> Result<(), SchedulerError> {
        self.stop(self.shutdown_timeout())
    }

    /// Stop the scheduler, letting in-flight tasks finish for up to `timeout`.
    ///
    /// Idempotent: once stopped, further calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::StopTimeout` if tasks were still in flight at the deadline.
    /// The scheduler is `Stopped` regardless.
    pub fn stop(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let _serial = self.inner.stop_lock.lock();
        if self.is_stopped() {
            debug!(scheduler = %self.name(), "Scheduler already stopped");
            return Ok(());
        }

        let started = Instant::now();
        let ctx = &self.inner.ctx;
        ctx.set_state(SchedulerState::Stopping);
        info!(scheduler = %ctx.name, kind = %self.kind(), "Stopping scheduler");

        let timers = std::mem::take(&mut *self.inner.timers.lock());
        for timer in timers {
            timer.cancel.fire();
            if timer.thread.join().is_err() {
                warn!(scheduler = %ctx.name, "Timer thread panicked");
            }
        }

        let remaining = ctx.drain_or_abandon(timeout);
        let result = if remaining == 0 {
            Ok(())
        } else {
            warn!(
                scheduler = %ctx.name,
                abandoned = remaining,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Scheduler did not drain in time; abandoning remaining tasks"
            );
            Err(SchedulerError::StopTimeout {
                name: ctx.name.clone(),
                abandoned: remaining,
            })
        };

        if let PoolBinding::Exclusive(pool) = &self.inner.pool {
            pool.shutdown(timeout.saturating_sub(started.elapsed()).max(MIN_POOL_GRACE));
        }

        ctx.set_state(SchedulerState::Stopped);
        let (action, detail) = match &result {
            Ok(()) => (AuditAction::Stop, None),
            Err(e) => (AuditAction::StopTimeout, Some(e.to_string())),
        };
        self.record(action, detail);
        info!(
            scheduler = %ctx.name,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Scheduler stopped"
        );
        result
    }

    pub(crate) fn record(&self, action: AuditAction, detail: Option<String>) {
        if let Some(audit) = &self.inner.audit {
            audit.record(build_audit_event(self.name(), action, detail));
        }
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
