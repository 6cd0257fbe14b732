use std::{future::Future, sync::Arc};

use once_cell::sync::OnceCell;
use tokio::{runtime::Runtime, task::JoinHandle};

use crate::options::SharedIoRuntimeOptions;

static SHARED_IO_RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

fn build(options: &SharedIoRuntimeOptions) -> Arc<Runtime> {
    Arc::new(
        options
            .clone()
            .create()
            .expect("failed to create shared hardware-adapter I/O runtime"),
    )
}

/// Initialize the shared hardware I/O runtime with custom options.
///
/// # Panics
/// Panics if called more than once.
pub fn init_hardware_io_runtime(options: &SharedIoRuntimeOptions) {
    SHARED_IO_RUNTIME
        .set(build(options))
        .expect("shared hardware I/O runtime already initialized");
}

#[must_use]
pub fn hardware_io_runtime() -> Arc<Runtime> {
    Arc::clone(SHARED_IO_RUNTIME.get_or_init(|| build(&SharedIoRuntimeOptions::default())))
}

/// Spawns `future` onto the shared hardware I/O runtime — the "one shared
/// I/O worker thread" every serial adapter's worker ultimately runs on
/// (§4.3: "it is the only thread that calls into the underlying channel
/// API").
pub fn spawn_hardware_io<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    hardware_io_runtime().handle().spawn(future)
}

pub fn block_on_hardware_io<F>(future: F) -> F::Output
where
    F: Future,
{
    hardware_io_runtime().block_on(future)
}
