//! Primitive synchronization utilities (§4.1).
//!
//! Every cross-thread touch of shared state in LabCore goes through one of
//! these three primitives:
//!
//! - [`RecursiveLock`] — a reentrant, timeout-bearing mutex.
//! - [`OneToOneNotifier`] — a coalesced single-producer/single-consumer
//!   wakeup, used by instrument and module worker loops to sleep between
//!   queue drains.
//! - [`SynchronizedPointer`] — a scoped lock+pointer handle that is the sole
//!   way to touch a shared data block from outside its owning thread, with
//!   a lock-preserving up/downcast between base and derived data types.

mod one_to_one_notifier;
mod recursive_lock;
mod synchronized_pointer;

pub use one_to_one_notifier::OneToOneNotifier;
pub use recursive_lock::{
    DEFAULT_TIMEOUT, HARDWARE_TIMEOUT, RecursiveLock, RecursiveLockGuard, SHORT_TIMEOUT,
};
pub use synchronized_pointer::{DataBlock, SynchronizedPointer};
