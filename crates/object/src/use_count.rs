//! Use-count bookkeeping shared between an object and every
//! [`crate::LinkedObjectWrapper`] that currently references it.
//!
//! §3: "a use-count reflecting how many other objects currently link to
//! it"; "An object may be `Reset()` only while its use-count is zero."

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use labcore_error::Result;
use snafu::IntoError;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct UseCounter {
    count: AtomicUsize,
    zero_notify: Notify,
}

impl UseCounter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.zero_notify.notify_waiters();
        }
    }

    /// Block until the count reaches zero or `timeout` elapses (§4.2
    /// `BlockIfUnused`).
    pub(crate) async fn wait_zero(&self, timeout: Duration) -> Result<()> {
        if self.get() == 0 {
            return Ok(());
        }
        // Poll-with-notify: a notification that arrives between the check
        // and the `notified()` call below is not missed because
        // `Notify::notify_waiters` only wakes currently-registered waiters,
        // so register interest first, then re-check.
        let notified = self.zero_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.get() == 0 {
            return Ok(());
        }
        tokio::time::timeout(timeout, notified).await.map_err(|_| {
            labcore_error::TimeoutSnafu {
                message: "timed out waiting for use-count to reach zero".to_string(),
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into_error(snafu::NoneError)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_zero_returns_immediately_when_already_zero() {
        let counter = UseCounter::new();
        counter.wait_zero(Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn wait_zero_times_out_while_in_use() {
        let counter = UseCounter::new();
        counter.increment();
        let err = counter.wait_zero(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, labcore_error::Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn wait_zero_wakes_on_decrement() {
        let counter = UseCounter::new();
        counter.increment();
        let waiter = Arc::clone(&counter);
        let handle = tokio::spawn(async move { waiter.wait_zero(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        counter.decrement();
        handle.await.unwrap().unwrap();
    }
}
