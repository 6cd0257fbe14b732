//! §3/§4.4: the instrument's task FIFO. Holds only `Waiting` tasks; the
//! currently executing task is held separately by the instrument loop once
//! [`TaskQueue::pop_next`] has locked it, so nothing in the queue itself is
//! ever observed in the `Locked` state.
//!
//! `CloseQueue()` (§4.4) rejects all further non-self enqueues; the
//! instrument thread itself may still enqueue during shutdown via
//! [`TaskQueue::enqueue_internal`].

use std::{collections::VecDeque, sync::Arc};

use labcore_error::Result;
use labcore_sync::OneToOneNotifier;
use parking_lot::Mutex;
use snafu::IntoError;

use crate::task::Task;

struct Inner {
    waiting: VecDeque<Arc<Task>>,
    finished: Vec<Arc<Task>>,
    closed: bool,
}

/// A bounded FIFO of [`Task`]s plus the unbounded `FinishedTasks` list (§3).
/// `notifier` is what the instrument loop sleeps on between drains.
pub struct TaskQueue {
    inner: Mutex<Inner>,
    notifier: OneToOneNotifier,
    capacity: usize,
}

impl TaskQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                waiting: VecDeque::new(),
                finished: Vec::new(),
                closed: false,
            }),
            notifier: OneToOneNotifier::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn notifier(&self) -> OneToOneNotifier {
        self.notifier.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Append to the back of the waiting region. Rejected with
    /// [`labcore_error::Error::InvalidState`] once the queue is closed.
    pub fn enqueue(&self, task: Arc<Task>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(labcore_error::InvalidStateSnafu {
                message: "task queue is closed".to_string(),
            }
            .into_error(snafu::NoneError));
        }
        if inner.waiting.len() >= self.capacity {
            return Err(labcore_error::OutOfRangeSnafu {
                message: format!("task queue is at capacity ({})", self.capacity),
            }
            .into_error(snafu::NoneError));
        }
        inner.waiting.push_back(task);
        drop(inner);
        self.notifier.notify();
        Ok(())
    }

    /// `EnqueuePriorityTask`: inserts at the front of the still-`Waiting`
    /// region (§4.4/§9). Since the currently executing task has already
    /// been taken out of `waiting` by [`TaskQueue::pop_next`], this always
    /// lands behind whatever is presently locked/running, resolving the
    /// open question in §9.
    pub fn enqueue_priority(&self, task: Arc<Task>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(labcore_error::InvalidStateSnafu {
                message: "task queue is closed".to_string(),
            }
            .into_error(snafu::NoneError));
        }
        inner.waiting.push_front(task);
        drop(inner);
        self.notifier.notify();
        Ok(())
    }

    /// The instrument's own worker thread may still enqueue (an `ExitTask`,
    /// say) after `close()` — §4.4: "the instrument thread itself may still
    /// enqueue during shutdown."
    pub fn enqueue_internal(&self, task: Arc<Task>) {
        let mut inner = self.inner.lock();
        inner.waiting.push_back(task);
        drop(inner);
        self.notifier.notify();
    }

    /// Pop the front task and lock it for execution. Does not notify; the
    /// instrument loop drains until this returns `None`.
    pub fn pop_next(&self) -> Option<Arc<Task>> {
        let mut inner = self.inner.lock();
        let task = inner.waiting.pop_front()?;
        if task.lock_for_execution() {
            Some(task)
        } else {
            // Only reachable if something outside this queue already
            // locked/ran the task, which never happens in the single-
            // consumer design — defensive rather than load-bearing.
            None
        }
    }

    /// Called once a popped task reaches a terminal state: either drop it
    /// or retain it on `FinishedTasks`, per the task's own preference.
    pub fn retire(&self, task: Arc<Task>) {
        if task.keep_finished() {
            self.inner.lock().finished.push(task);
        }
    }

    #[must_use]
    pub fn finished_tasks(&self) -> Vec<Arc<Task>> {
        self.inner.lock().finished.clone()
    }

    /// Reject all further non-internal enqueues and discard the remaining
    /// waiting tasks (each reverts to `Aborted` on drop, per the task's
    /// drop behavior — §4.4: "On instrument termination, all non-front
    /// tasks are discarded").
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.waiting.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use labcore_error::Result as LResult;

    use super::*;
    use crate::task::{AbortSignal, FnTask, TaskOutcome};

    fn task(log: Arc<StdMutex<String>>, letter: char) -> Arc<Task> {
        Arc::new(Task::new(
            Box::new(FnTask(move |_: &AbortSignal| -> LResult<TaskOutcome> {
                log.lock().unwrap().push(letter);
                Ok(TaskOutcome::Continue)
            })),
            false,
            None,
        ))
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let queue = TaskQueue::new(16);
        let log = Arc::new(StdMutex::new(String::new()));
        queue.enqueue(task(log.clone(), 'A')).unwrap();
        queue.enqueue(task(log.clone(), 'B')).unwrap();
        queue.enqueue(task(log.clone(), 'C')).unwrap();

        while let Some(t) = queue.pop_next() {
            t.run().await;
            queue.retire(t);
        }
        assert_eq!(*log.lock().unwrap(), "ABC");
    }

    #[tokio::test]
    async fn priority_enqueue_jumps_ahead_of_waiting_tasks() {
        let queue = TaskQueue::new(16);
        let log = Arc::new(StdMutex::new(String::new()));
        queue.enqueue(task(log.clone(), 'B')).unwrap();
        queue.enqueue_priority(task(log.clone(), 'A')).unwrap();

        while let Some(t) = queue.pop_next() {
            t.run().await;
            queue.retire(t);
        }
        assert_eq!(*log.lock().unwrap(), "AB");
    }

    #[test]
    fn closed_queue_rejects_enqueue_but_not_internal() {
        let queue = TaskQueue::new(16);
        queue.close();
        let log = Arc::new(StdMutex::new(String::new()));
        assert!(queue.enqueue(task(log.clone(), 'X')).is_err());
        queue.enqueue_internal(task(log, 'Y'));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn keep_finished_preference_controls_retention() {
        let queue = TaskQueue::new(16);
        let kept = Arc::new(Task::new(
            Box::new(FnTask(|_: &AbortSignal| Ok(TaskOutcome::Continue))),
            true,
            None,
        ));
        let dropped = Arc::new(Task::new(
            Box::new(FnTask(|_: &AbortSignal| Ok(TaskOutcome::Continue))),
            false,
            None,
        ));
        queue.enqueue(kept).unwrap();
        queue.enqueue(dropped).unwrap();

        while let Some(t) = queue.pop_next() {
            t.run().await;
            queue.retire(t);
        }
        assert_eq!(queue.finished_tasks().len(), 1);
    }
}
