//! Tokio runtime factories for the LabCore runnable substrate.
//!
//! Two distinct runtime shapes cover §2/§5's thread model:
//!
//! - [`spawn_runnable_thread`] hands each instrument/module its own
//!   dedicated OS thread running a current-thread Tokio runtime — the
//!   literal "worker thread" every `Runnable` owns.
//! - [`hardware_io_runtime`] is the single shared multi-thread runtime every
//!   hardware adapter's worker ultimately runs its I/O on.

mod error;
mod factory;
mod global;
mod options;

pub use error::{Error, Result};
pub use factory::{create_current_thread_runtime, spawn_runnable_thread};
pub use global::{block_on_hardware_io, hardware_io_runtime, init_hardware_io_runtime, spawn_hardware_io};
pub use options::{RunnableThreadOptions, SharedIoRuntimeOptions};
pub use tokio::{runtime::Runtime, task::JoinHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedicated_thread_runs_its_own_runtime() {
        let options = RunnableThreadOptions::builder()
            .thread_name("test-runnable".to_string())
            .build();
        let join = spawn_runnable_thread(options, |_handle| async {
            std::thread::current().name().map(str::to_owned)
        });
        let name = join.join().unwrap().unwrap();
        assert_eq!(name.as_deref(), Some("test-runnable"));
    }

    #[test]
    fn current_thread_runtime_blocks_on_futures() {
        let options = RunnableThreadOptions::builder()
            .thread_name("single-thread".to_string())
            .build();
        let runtime = create_current_thread_runtime(&options).unwrap();
        let value = runtime.block_on(async { 42 });
        assert_eq!(value, 42);
    }

    #[test]
    fn shared_hardware_io_runtime_can_spawn() {
        init_hardware_io_runtime(&SharedIoRuntimeOptions::builder().io_threads(1).build());

        let handle = spawn_hardware_io(async { 5 });
        let value = block_on_hardware_io(handle).unwrap();
        assert_eq!(value, 5);
    }
}
