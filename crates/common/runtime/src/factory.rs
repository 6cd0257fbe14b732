use std::sync::atomic::{AtomicUsize, Ordering};

use snafu::ResultExt;
use tokio::runtime::{Builder as TokioBuilder, Runtime};

use crate::{
    error::{self, Result},
    options::{RunnableThreadOptions, SharedIoRuntimeOptions},
};

impl SharedIoRuntimeOptions {
    /// Build the shared multi-thread runtime hardware-adapter I/O workers
    /// run on.
    pub fn create(self) -> Result<Runtime> {
        let mut builder = TokioBuilder::new_multi_thread();
        builder.worker_threads(self.io_threads.max(1));
        builder.enable_io();
        builder.enable_time();

        let counter = AtomicUsize::new(0);
        builder.thread_name_fn(move || {
            let idx = counter.fetch_add(1, Ordering::SeqCst);
            format!("labcore-io-{idx}")
        });

        builder.build().context(error::BuildSnafu)
    }
}

/// Build a single-threaded runtime with all drivers enabled, one per
/// instrument or module. Running this runtime's `block_on` on a freshly
/// spawned `std::thread` gives the runnable exactly the dedicated OS thread
/// §2/§5 require, while `tokio::sync::Notify`/`tokio::time::timeout` remain
/// available for the runnable's suspension points.
pub fn create_current_thread_runtime(options: &RunnableThreadOptions) -> Result<Runtime> {
    let mut builder = TokioBuilder::new_current_thread();
    builder.enable_io();
    if options.enable_time {
        builder.enable_time();
    }
    builder.thread_name(&options.thread_name);
    builder.build().context(error::BuildSnafu)
}

/// Spawns a dedicated OS thread running a single-threaded Tokio runtime that
/// drives `make_future(rt_handle)` to completion via `block_on`. Returns the
/// `JoinHandle` the manager joins on termination (§3 lifecycle: "terminated
/// (worker joins after processing the exit task/event)").
pub fn spawn_runnable_thread<F, Fut, T>(
    options: RunnableThreadOptions,
    make_future: F,
) -> std::thread::JoinHandle<Result<T>>
where
    F: FnOnce(tokio::runtime::Handle) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = T>,
    T: Send + 'static,
{
    let thread_name = options.thread_name.clone();
    std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            let runtime = create_current_thread_runtime(&options)?;
            let handle = runtime.handle().clone();
            Ok(runtime.block_on(make_future(handle)))
        })
        .expect("failed to spawn runnable OS thread")
}
