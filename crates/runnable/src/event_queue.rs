//! §3/§4.5: a module's event FIFO. Unlike [`crate::task_queue::TaskQueue`]
//! there is no `Locked`/`FinishedTasks` bookkeeping — an [`crate::event::Event`]
//! has no state machine, just "pop and invoke" — and no stated capacity
//! bound, so this queue is unbounded.
//!
//! `close()` rejects further non-internal enqueues, mirroring
//! `TaskQueue::close` so a module's own termination sequence
//! (`OnExit`/deregistration) can still enqueue after the owner has asked it
//! to stop accepting new work.

use std::{collections::VecDeque, sync::Arc};

use labcore_error::Result;
use labcore_sync::OneToOneNotifier;
use parking_lot::Mutex;
use snafu::IntoError;

use crate::event::Event;

struct Inner {
    waiting: VecDeque<Arc<Event>>,
    closed: bool,
}

pub struct EventQueue {
    inner: Mutex<Inner>,
    notifier: OneToOneNotifier,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                waiting: VecDeque::new(),
                closed: false,
            }),
            notifier: OneToOneNotifier::new(),
        }
    }

    #[must_use]
    pub fn notifier(&self) -> OneToOneNotifier {
        self.notifier.clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().waiting.is_empty()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// `MakeAndEnqueueEvent`: append to the back of the queue. Rejected
    /// with [`labcore_error::Error::InvalidState`] once the queue is closed.
    pub fn enqueue(&self, event: Arc<Event>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(labcore_error::InvalidStateSnafu {
                message: "event queue is closed".to_string(),
            }
            .into_error(snafu::NoneError));
        }
        inner.waiting.push_back(event);
        drop(inner);
        self.notifier.notify();
        Ok(())
    }

    /// The module's own worker thread may still enqueue (`OnExit`, the
    /// framework's deregistration step) after `close()`.
    pub fn enqueue_internal(&self, event: Arc<Event>) {
        let mut inner = self.inner.lock();
        inner.waiting.push_back(event);
        drop(inner);
        self.notifier.notify();
    }

    pub fn pop_next(&self) -> Option<Arc<Event>> {
        self.inner.lock().waiting.pop_front()
    }

    /// Reject all further non-internal enqueues. Unlike
    /// [`crate::task_queue::TaskQueue::close`], already-waiting events are
    /// left in place — a module's exit/deregistration events are enqueued
    /// immediately afterward via `enqueue_internal` and must still drain in
    /// order behind anything already pending.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use labcore_error::Result as LResult;

    use super::*;
    use crate::event::AsyncFnEvent;

    fn event(log: Arc<StdMutex<String>>, letter: char) -> Arc<Event> {
        Arc::new(Event::new(Box::new(AsyncFnEvent(
            move || -> std::pin::Pin<Box<dyn std::future::Future<Output = LResult<()>> + Send>> {
                let log = Arc::clone(&log);
                Box::pin(async move {
                    log.lock().unwrap().push(letter);
                    Ok(())
                })
            },
        ))))
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let queue = EventQueue::new();
        let log = Arc::new(StdMutex::new(String::new()));
        queue.enqueue(event(log.clone(), 'A')).unwrap();
        queue.enqueue(event(log.clone(), 'B')).unwrap();

        while let Some(e) = queue.pop_next() {
            e.invoke().await.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), "AB");
    }

    #[test]
    fn closed_queue_rejects_enqueue_but_not_internal() {
        let queue = EventQueue::new();
        queue.close();
        let log = Arc::new(StdMutex::new(String::new()));
        assert!(queue.enqueue(event(log.clone(), 'X')).is_err());
        queue.enqueue_internal(event(log, 'Y'));
        assert!(!queue.is_empty());
    }
}
