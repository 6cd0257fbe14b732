//! A recursive, timeout-bearing mutex (§4.1).
//!
//! All cross-thread access to an object's data block goes through a
//! `RecursiveLock`. It is reentrant on the acquiring thread — a composite
//! operation may call a helper that locks the same block again without
//! deadlocking itself — and every acquisition carries a timeout instead of
//! blocking forever.

use std::time::Duration;

use labcore_error::Result;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use snafu::IntoError;

/// Default timeout for a data-block lock (§5: "default timeouts are one
/// second for data blocks").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// Default timeout for a UI observer's lock attempt (§5: "ten milliseconds
/// for UI observers").
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(10);
/// Default timeout for a hardware critical section (§5: "one hundred
/// milliseconds for hardware critical sections").
pub const HARDWARE_TIMEOUT: Duration = Duration::from_millis(100);

/// A recursive mutex with a configurable default acquisition timeout.
///
/// Reentrant: the same thread may call [`RecursiveLock::acquire`] again
/// while already holding a guard from an earlier call without blocking.
/// Guards from different threads serialize as usual.
pub struct RecursiveLock {
    mutex: ReentrantMutex<()>,
    default_timeout: Duration,
}

impl RecursiveLock {
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            mutex: ReentrantMutex::new(()),
            default_timeout,
        }
    }

    /// Acquire the lock with this lock's default timeout.
    pub fn acquire(&self) -> Result<RecursiveLockGuard<'_>> {
        self.acquire_for(self.default_timeout)
    }

    /// Acquire the lock, timing out with [`Error::Timeout`] after `timeout`.
    pub fn acquire_for(&self, timeout: Duration) -> Result<RecursiveLockGuard<'_>> {
        self.mutex
            .try_lock_for(timeout)
            .map(|guard| RecursiveLockGuard { _guard: guard })
            .ok_or_else(|| {
                labcore_error::TimeoutSnafu {
                    message: "failed to acquire recursive lock".to_string(),
                    duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into_error(snafu::NoneError)
            })
    }
}

/// Proof that the enclosing [`RecursiveLock`] is held for the guard's
/// lifetime. Carries no data of its own — pair it with a
/// [`crate::synchronized_pointer::SynchronizedPointer`] to touch the guarded
/// value.
pub struct RecursiveLockGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_acquire_on_same_thread_succeeds() {
        let lock = RecursiveLock::new(DEFAULT_TIMEOUT);
        let _outer = lock.acquire().unwrap();
        let _inner = lock.acquire().unwrap();
    }

    #[test]
    fn acquire_from_other_thread_times_out() {
        let lock = std::sync::Arc::new(RecursiveLock::new(Duration::from_millis(1)));
        let held = lock.acquire().unwrap();

        let other = std::sync::Arc::clone(&lock);
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            tx.send(other.acquire_for(Duration::from_millis(20)).is_err())
                .unwrap();
        });

        assert!(rx.recv().unwrap());
        drop(held);
    }
}
