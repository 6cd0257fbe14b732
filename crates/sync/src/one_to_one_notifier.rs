//! A coalesced single-producer/single-consumer wakeup (§4.1).
//!
//! `Wait()` blocks until `Notify()` is called; several notifications before
//! a wait still only wake the waiter once. This is the primitive an
//! instrument or module worker loop sleeps on between queue drains
//! (§4.4/§4.5: "sleep on the queue's notifier until either a new task
//! arrives or the update interval expires"), grounded in the teacher's
//! `WorkerContext::notified`/`NotifyDriver` pairing in
//! `common/worker/src/context.rs` and `driver.rs`.

use std::{sync::Arc, time::Duration};

use tokio::sync::Notify;

/// Single-producer/single-consumer notifier. Cheaply cloneable; all clones
/// share the same underlying wakeup, matching the "one pair of threads"
/// contract — one enqueuer side calls [`OneToOneNotifier::notify`], one
/// worker-loop side calls [`OneToOneNotifier::wait`]/[`OneToOneNotifier::wait_timeout`].
#[derive(Clone, Default)]
pub struct OneToOneNotifier {
    inner: Arc<Notify>,
}

impl OneToOneNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Notify::new()),
        }
    }

    /// Wake the waiter. Notifications that arrive before a `wait` call are
    /// coalesced into a single permit (`tokio::sync::Notify`'s
    /// `notify_one` semantics), never lost and never double-counted.
    pub fn notify(&self) {
        self.inner.notify_one();
    }

    /// Block until [`OneToOneNotifier::notify`] is called.
    pub async fn wait(&self) {
        self.inner.notified().await;
    }

    /// Block until notified or `timeout` elapses, whichever comes first.
    /// Returns `true` if woken by a notification, `false` on timeout — used
    /// by the runnable loop to distinguish "new work arrived" from "update
    /// interval expired" (§4.4).
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_before_wait_is_not_lost() {
        let notifier = OneToOneNotifier::new();
        notifier.notify();
        // Must not block: the pre-wait notification is coalesced, not
        // dropped.
        notifier.wait().await;
    }

    #[tokio::test]
    async fn wait_timeout_reports_timeout_when_not_notified() {
        let notifier = OneToOneNotifier::new();
        let woken = notifier.wait_timeout(Duration::from_millis(5)).await;
        assert!(!woken);
    }

    #[tokio::test]
    async fn wait_timeout_reports_wakeup_when_notified() {
        let notifier = OneToOneNotifier::new();
        let clone = notifier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            clone.notify();
        });
        let woken = notifier.wait_timeout(Duration::from_secs(1)).await;
        assert!(woken);
    }
}
