//! Task result slots and the handles callers wait on.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::SchedulerError;

/// Outcome of a submitted task.
pub type TaskResult<T> = Result<T, SchedulerError>;

enum SlotState<T> {
    /// Accepted, not started.
    Pending,
    /// A worker claimed it.
    Running,
    /// Finished, cancelled or failed; result not taken yet.
    Ready(TaskResult<T>),
    /// Result handed to the caller.
    Taken,
}

/// Single-result rendezvous between a worker and the submitting caller.
pub(crate) struct ResultSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> ResultSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }

    /// Move `Pending` to `Running`. `false` if the task was cancelled first.
    fn claim(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Running;
            true
        } else {
            false
        }
    }

    /// Store an outcome unless one is already there.
    fn complete(&self, outcome: TaskResult<T>) {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Pending | SlotState::Running) {
            *state = SlotState::Ready(outcome);
            self.ready.notify_all();
        }
    }

    fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Ready(Err(SchedulerError::Cancelled));
            self.ready.notify_all();
            true
        } else {
            false
        }
    }

    fn is_done(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Ready(_) | SlotState::Taken)
    }

    fn take_ready(state: &mut SlotState<T>) -> Option<TaskResult<T>> {
        match std::mem::replace(state, SlotState::Taken) {
            SlotState::Ready(outcome) => Some(outcome),
            SlotState::Taken => Some(Err(SchedulerError::Internal(
                "task result already taken".into(),
            ))),
            other => {
                *state = other;
                None
            }
        }
    }

    fn try_take(&self) -> Option<TaskResult<T>> {
        Self::take_ready(&mut self.state.lock())
    }

    fn wait_for(&self, timeout: Duration) -> TaskResult<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = Self::take_ready(&mut state) {
                return outcome;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return Self::take_ready(&mut state).unwrap_or(Err(SchedulerError::Timeout));
            }
        }
    }
}

/// Worker-side owner of a slot.
///
/// Dropping it without calling [`finish`](Self::finish) marks the task cancelled,
/// which covers jobs discarded by a pool shutdown or skipped after abandonment.
pub(crate) struct SlotCompleter<T> {
    slot: Option<Arc<ResultSlot<T>>>,
}

impl<T> SlotCompleter<T> {
    pub(crate) const fn new(slot: Arc<ResultSlot<T>>) -> Self {
        Self { slot: Some(slot) }
    }

    /// See [`ResultSlot::claim`].
    pub(crate) fn claim(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.claim())
    }

    pub(crate) fn finish(mut self, outcome: TaskResult<T>) {
        if let Some(slot) = self.slot.take() {
            slot.complete(outcome);
        }
    }
}

impl<T> Drop for SlotCompleter<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.complete(Err(SchedulerError::Cancelled));
        }
    }
}

/// Caller-side handle to a submitted task's eventual result.
pub struct TaskHandle<T> {
    slot: Arc<ResultSlot<T>>,
    scheduler: String,
}

impl<T> TaskHandle<T> {
    pub(crate) const fn new(slot: Arc<ResultSlot<T>>, scheduler: String) -> Self {
        Self { slot, scheduler }
    }

    /// Name of the scheduler the task was submitted to.
    #[must_use]
    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }

    /// Whether an outcome is available (or was already taken).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.slot.is_done()
    }

    /// Cancel the task if it has not started. Returns `true` if it was cancelled.
    ///
    /// A task already running is not interrupted.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    /// Take the outcome if it is ready, without blocking.
    pub fn try_take(&self) -> Option<TaskResult<T>> {
        self.slot.try_take()
    }

    /// Block up to `timeout` for the outcome.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Timeout` if nothing arrived in time
    /// - `SchedulerError::Cancelled` if the task was cancelled or abandoned
    /// - `SchedulerError::TaskFailed` if the task panicked
    pub fn wait(&self, timeout: Duration) -> TaskResult<T> {
        self.slot.wait_for(timeout)
    }
}

#[cfg(feature = "tokio-runtime")]
impl<T: Send + 'static> TaskHandle<T> {
    /// Async variant of [`wait`](Self::wait).
    ///
    /// The condvar wait runs on tokio's blocking pool so the caller's runtime is
    /// never blocked.
    pub async fn join_async(&self, timeout: Duration) -> TaskResult<T> {
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || slot.wait_for(timeout))
            .await
            .unwrap_or_else(|e| Err(SchedulerError::Internal(format!("join failed: {e}"))))
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("scheduler", &self.scheduler)
            .field("done", &self.is_done())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}
