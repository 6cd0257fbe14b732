//! §3/§4.4: the task state machine — `Waiting → Locked → Running →
//! {Finished, Failed, Aborted}` (plus `Waiting → Aborted` on destruction
//! before running) — and the [`TaskBody`] trait user task subclasses
//! implement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use labcore_error::{ExceptionContainer, Result};
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum_macros::Display)]
pub enum TaskState {
    Waiting,
    Locked,
    Running,
    Finished,
    Failed,
    Aborted,
}

/// What a task asks the instrument loop to do once it has run to
/// completion without throwing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskOutcome {
    /// Keep draining the queue (the common case).
    Continue,
    /// `ExitTask`'s result: stop the instrument loop after this task.
    Terminate,
    /// §7: "non-zero error code returned from `RunChild`" — the task ends
    /// `Failed` but does *not* throw, so no exception propagates out of the
    /// run loop.
    Failed,
}

/// Cooperative cancellation handle a running [`TaskBody`] polls at its own
/// granularity (§4.4: "the task machinery never forcibly stops a running
/// task").
#[derive(Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_aborting(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The work a task performs once popped and locked. `Init`/`Exit`/`Update`/
/// `ArriveAtLatch` task kinds (§3) are just particular `TaskBody`
/// implementations; user task subclasses are any other implementation.
#[async_trait]
pub trait TaskBody: Send {
    async fn run_child(&mut self, abort: &AbortSignal) -> Result<TaskOutcome>;
}

/// Closure-backed `TaskBody` for ad hoc tasks (`fn-task` style), mirroring
/// how `MakeAndEnqueueEvent` wraps a bound member-function call for modules.
pub struct FnTask<F>(pub F)
where
    F: FnMut(&AbortSignal) -> Result<TaskOutcome> + Send;

#[async_trait]
impl<F> TaskBody for FnTask<F>
where
    F: FnMut(&AbortSignal) -> Result<TaskOutcome> + Send,
{
    async fn run_child(&mut self, abort: &AbortSignal) -> Result<TaskOutcome> {
        (self.0)(abort)
    }
}

/// Closure-backed `TaskBody` for a task whose work is itself async — the
/// shape `InstrumentObject`'s generated init/update/exit tasks need, since
/// an instrument body's hooks are `async fn`s.
pub struct AsyncFnTask<F>(pub F)
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<TaskOutcome>> + Send>>
        + Send;

#[async_trait]
impl<F> TaskBody for AsyncFnTask<F>
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<TaskOutcome>> + Send>>
        + Send,
{
    async fn run_child(&mut self, _abort: &AbortSignal) -> Result<TaskOutcome> {
        (self.0)().await
    }
}

pub type TerminalCallback = Box<dyn FnOnce(&mut ExceptionContainer) + Send>;

/// One unit of work on an instrument's FIFO (§3/§4.4). Exactly one
/// [`Task::run`] or implicit abort-on-drop fires the terminal callback —
/// §8's "for all tasks T: T's callback is invoked exactly once".
pub struct Task {
    body: Mutex<Option<Box<dyn TaskBody>>>,
    state: Mutex<TaskState>,
    abort: AbortSignal,
    keep_finished: bool,
    callback: Mutex<Option<TerminalCallback>>,
}

impl Task {
    #[must_use]
    pub fn new(body: Box<dyn TaskBody>, keep_finished: bool, callback: Option<TerminalCallback>) -> Self {
        Self {
            body: Mutex::new(Some(body)),
            state: Mutex::new(TaskState::Waiting),
            abort: AbortSignal::new(),
            keep_finished,
            callback: Mutex::new(callback),
        }
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    #[must_use]
    pub fn keep_finished(&self) -> bool {
        self.keep_finished
    }

    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Only callable by the queue: transitions `Waiting → Locked`. Returns
    /// `false` (no-op) if the task wasn't `Waiting`.
    pub(crate) fn lock_for_execution(&self) -> bool {
        let mut state = self.state.lock();
        if *state != TaskState::Waiting {
            return false;
        }
        *state = TaskState::Locked;
        true
    }

    /// Run the task to a terminal state and fire its callback exactly once.
    /// Returns the `ExceptionContainer` the callback left behind (possibly
    /// cleared) alongside the non-error outcome, for the instrument loop to
    /// act on.
    pub async fn run(&self) -> (ExceptionContainer, TaskOutcome) {
        *self.state.lock() = TaskState::Running;
        let mut body = self
            .body
            .lock()
            .take()
            .expect("task body already consumed");
        let result = body.run_child(&self.abort).await;

        let (final_state, mut container, outcome) = match result {
            Ok(TaskOutcome::Failed) => (TaskState::Failed, ExceptionContainer::empty(), TaskOutcome::Continue),
            Ok(outcome) => (TaskState::Finished, ExceptionContainer::empty(), outcome),
            Err(error) => (TaskState::Failed, ExceptionContainer::from_error(error), TaskOutcome::Continue),
        };
        *self.state.lock() = final_state;

        if let Some(callback) = self.callback.lock().take() {
            callback(&mut container);
        }
        (container, outcome)
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // §8 "abort-before-run": a task destroyed while still `Waiting`
        // transitions to `Aborted` and its callback fires with an empty
        // container, exactly once.
        let mut state = self.state.lock();
        if *state == TaskState::Waiting {
            *state = TaskState::Aborted;
            drop(state);
            if let Some(callback) = self.callback.lock().take() {
                let mut container = ExceptionContainer::empty();
                callback(&mut container);
            }
        }
    }
}

/// Runs once before regular work; concrete instruments chain every base's
/// init step into this in registration order (§4.4/§9).
pub struct InitTask {
    steps: Vec<Box<dyn FnMut() -> Result<()> + Send>>,
}

impl InitTask {
    #[must_use]
    pub fn new(steps: Vec<Box<dyn FnMut() -> Result<()> + Send>>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl TaskBody for InitTask {
    async fn run_child(&mut self, _abort: &AbortSignal) -> Result<TaskOutcome> {
        for step in &mut self.steps {
            step()?;
        }
        Ok(TaskOutcome::Continue)
    }
}

/// Runs last and stops the instrument loop (§4.4: "`ExitTask` returns a
/// result with 'terminate' set").
pub struct ExitTask {
    pub on_exit: Option<Box<dyn FnMut() -> Result<()> + Send>>,
}

#[async_trait]
impl TaskBody for ExitTask {
    async fn run_child(&mut self, _abort: &AbortSignal) -> Result<TaskOutcome> {
        if let Some(on_exit) = &mut self.on_exit {
            on_exit()?;
        }
        Ok(TaskOutcome::Terminate)
    }
}

/// Periodic internal task; enqueued without waking the queue's notifier so
/// the update interval paces itself instead of busy-looping (§4.4).
pub struct UpdateTask {
    pub on_update: Box<dyn FnMut() -> Result<()> + Send>,
}

#[async_trait]
impl TaskBody for UpdateTask {
    async fn run_child(&mut self, _abort: &AbortSignal) -> Result<TaskOutcome> {
        (self.on_update)()?;
        Ok(TaskOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn callback_fires_once_on_success() {
        let calls = Arc::new(Mutex::new(0));
        let calls2 = Arc::clone(&calls);
        let task = Task::new(
            Box::new(FnTask(|_: &AbortSignal| Ok(TaskOutcome::Continue))),
            false,
            Some(Box::new(move |container: &mut ExceptionContainer| {
                *calls2.lock() += 1;
                assert!(container.is_empty());
            })),
        );
        assert!(task.lock_for_execution());
        task.run().await;
        assert_eq!(*calls.lock(), 1);
        assert_eq!(task.state(), TaskState::Finished);
    }

    #[tokio::test]
    async fn callback_can_clear_error_to_suppress_propagation() {
        let task = Task::new(
            Box::new(FnTask(|_: &AbortSignal| {
                Err(labcore_error::InternalCoreSnafu {
                    message: "boom".to_string(),
                }
                .into())
            })),
            false,
            Some(Box::new(|container: &mut ExceptionContainer| {
                *container = ExceptionContainer::empty();
            })),
        );
        assert!(task.lock_for_execution());
        let (container, _) = task.run().await;
        assert!(container.is_empty());
        assert_eq!(task.state(), TaskState::Failed);
    }

    #[tokio::test]
    async fn uncleared_error_propagates() {
        let task = Task::new(
            Box::new(FnTask(|_: &AbortSignal| {
                Err(labcore_error::InternalCoreSnafu {
                    message: "boom".to_string(),
                }
                .into())
            })),
            false,
            None,
        );
        assert!(task.lock_for_execution());
        let (container, _) = task.run().await;
        assert!(!container.is_empty());
    }

    #[test]
    fn dropping_a_waiting_task_fires_callback_with_empty_container() {
        let fired = Arc::new(Mutex::new(false));
        let fired2 = Arc::clone(&fired);
        let task = Task::new(
            Box::new(FnTask(|_: &AbortSignal| Ok(TaskOutcome::Continue))),
            false,
            Some(Box::new(move |container: &mut ExceptionContainer| {
                assert!(container.is_empty());
                *fired2.lock() = true;
            })),
        );
        drop(task);
        assert!(*fired.lock());
    }

    #[test]
    fn locked_task_is_not_aborted_on_drop() {
        // Once locked, dropping it (simulating normal post-execution
        // teardown after `Finished`/`Failed`) must not re-fire the
        // callback via the abort path.
        let task = Task::new(
            Box::new(FnTask(|_: &AbortSignal| Ok(TaskOutcome::Continue))),
            false,
            None,
        );
        assert!(task.lock_for_execution());
        drop(task); // no panic, no callback double-fire
    }
}
