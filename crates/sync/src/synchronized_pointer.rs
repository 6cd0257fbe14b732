//! Scoped lock + typed pointer: the sole way to touch a shared data block
//! from outside its owning thread (§4.1).
//!
//! The data block is stored type-erased (`Box<dyn Any + Send>`) behind an
//! `Arc`-owned reentrant mutex. Locking hands back a [`SynchronizedPointer<T>`]
//! that owns the guard itself (via `parking_lot`'s `arc_lock` feature), so
//! there is no lifetime parameter to thread through `Instrument`/`Module`
//! APIs. Casting to a base/derived type moves the held guard into the new
//! wrapper and re-checks the dynamic type — exactly the "preserve the lock
//! across the cast" discipline called for in the design notes.

use std::{
    any::Any,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::Duration,
};

use labcore_error::{Error, Result};
use parking_lot::{ArcReentrantMutexGuard, RawMutex, RawThreadId, ReentrantMutex};
use snafu::IntoError;

use crate::recursive_lock::DEFAULT_TIMEOUT;

type BoxedAny = Box<dyn Any + Send>;
type ArcGuard = ArcReentrantMutexGuard<RawMutex, RawThreadId, BoxedAny>;

/// Owns a type-erased value behind a reentrant mutex. Clone cheaply (it is
/// an `Arc` internally); every clone locks the same underlying value.
#[derive(Clone)]
pub struct DataBlock {
    mutex: Arc<ReentrantMutex<BoxedAny>>,
}

impl DataBlock {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            mutex: Arc::new(ReentrantMutex::new(Box::new(value))),
        }
    }

    /// Lock the block and view it as `T`, using `timeout`. Fails with
    /// [`Error::Timeout`] if the lock can't be acquired in time, or
    /// [`Error::TypeError`] if the stored value isn't actually a `T`.
    pub fn lock_as<T: Any>(&self, timeout: Duration) -> Result<SynchronizedPointer<T>> {
        let guard = self.mutex.try_lock_arc_for(timeout).ok_or_else(|| {
            labcore_error::TimeoutSnafu {
                message: "failed to acquire data block lock".to_string(),
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into_error(snafu::NoneError)
        })?;
        if !(**guard).is::<T>() {
            return Err(labcore_error::TypeErrorSnafu {
                message: "data block does not hold the requested type".to_string(),
            }
            .into_error(snafu::NoneError));
        }
        Ok(SynchronizedPointer {
            guard,
            _marker: PhantomData,
        })
    }

    /// Lock with the crate's default data-block timeout (§5: one second).
    pub fn lock(&self) -> Result<SynchronizedPointer<dyn Any + Send>> {
        self.lock_any(DEFAULT_TIMEOUT)
    }

    /// Lock as the type-erased `dyn Any + Send`, deferring the downcast.
    pub fn lock_any(&self, timeout: Duration) -> Result<SynchronizedPointer<dyn Any + Send>> {
        let guard = self.mutex.try_lock_arc_for(timeout).ok_or_else(|| {
            labcore_error::TimeoutSnafu {
                message: "failed to acquire data block lock".to_string(),
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into_error(snafu::NoneError)
        })?;
        Ok(SynchronizedPointer {
            guard,
            _marker: PhantomData,
        })
    }
}

/// A held lock plus a typed view of the guarded data. Move-only (the inner
/// guard is), and convertible to a different `U` via [`SynchronizedPointer::cast`]
/// without releasing the lock in between.
pub struct SynchronizedPointer<T: ?Sized> {
    guard: ArcGuard,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> SynchronizedPointer<T> {
    /// Re-view the same held lock as `U`. Fails with [`Error::TypeError`] on
    /// a dynamic type mismatch; the original pointer is dropped on error
    /// along with its lock (matching "conversion with an invalid dynamic
    /// type fails").
    pub fn cast<U: Any>(self) -> Result<SynchronizedPointer<U>> {
        if !(*self.guard).is::<U>() {
            return Err(labcore_error::TypeErrorSnafu {
                message: "synchronized pointer cast target type mismatch".to_string(),
            }
            .into_error(snafu::NoneError));
        }
        Ok(SynchronizedPointer {
            guard: self.guard,
            _marker: PhantomData,
        })
    }
}

impl<T: Any> Deref for SynchronizedPointer<T> {
    type Target = T;

    fn deref(&self) -> &T {
        (*self.guard)
            .downcast_ref::<T>()
            .expect("type was checked when this pointer was constructed")
    }
}

impl<T: Any> DerefMut for SynchronizedPointer<T> {
    fn deref_mut(&mut self) -> &mut T {
        (*self.guard)
            .downcast_mut::<T>()
            .expect("type was checked when this pointer was constructed")
    }
}

/// An empty wrapper (no held lock) always fails to cast, mirroring
/// `InvalidArgException` on conversion of an empty `SynchronizedPointer`.
pub fn empty_cast_error() -> Error {
    labcore_error::InvalidArgSnafu {
        message: "cannot cast an empty synchronized pointer".to_string(),
    }
    .into_error(snafu::NoneError)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base {
        value: i32,
    }

    #[test]
    fn lock_and_mutate_through_pointer() {
        let block = DataBlock::new(Base { value: 1 });
        {
            let mut ptr = block.lock_as::<Base>(DEFAULT_TIMEOUT).unwrap();
            ptr.value = 42;
        }
        let ptr = block.lock_as::<Base>(DEFAULT_TIMEOUT).unwrap();
        assert_eq!(ptr.value, 42);
    }

    #[test]
    fn lock_as_wrong_type_is_type_error() {
        let block = DataBlock::new(Base { value: 1 });
        let err = block.lock_as::<String>(DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }

    #[test]
    fn cast_preserves_lock_and_rejects_wrong_type() {
        let block = DataBlock::new(Base { value: 7 });
        let ptr = block.lock_as::<Base>(DEFAULT_TIMEOUT).unwrap();
        let err = ptr.cast::<String>().unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }

    #[test]
    fn concurrent_lock_from_other_thread_times_out() {
        let block = DataBlock::new(Base { value: 0 });
        let held = block.lock_as::<Base>(DEFAULT_TIMEOUT).unwrap();

        let other = block.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let result = other.lock_as::<Base>(Duration::from_millis(20));
            tx.send(result.is_err()).unwrap();
        });

        assert!(rx.recv().unwrap());
        drop(held);
    }
}
