use std::thread::available_parallelism;

use bon::Builder;
use smart_default::SmartDefault;

/// Tuning for the single shared multi-thread runtime hardware adapters hand
/// their I/O workers off to (§2: "one shared I/O worker thread (or one per
/// hardware adapter, at the implementation's choice)"). Set `io_threads` to
/// `1` to reproduce the single-shared-thread choice; the default scales with
/// CPU count so many adapters still get parallel I/O.
#[derive(Debug, Clone, SmartDefault, Builder)]
#[builder(finish_fn = build)]
pub struct SharedIoRuntimeOptions {
    #[default(cpu_threads())]
    #[builder(default = cpu_threads())]
    pub io_threads: usize,
}

/// Tuning for a single dedicated runnable thread (one instrument or one
/// module). Always single-threaded: the whole point is that exactly one OS
/// thread executes this runnable's loop.
#[derive(Debug, Clone, SmartDefault, Builder)]
#[builder(finish_fn = build)]
pub struct RunnableThreadOptions {
    #[default("labcore-runnable".to_string())]
    #[builder(default = "labcore-runnable".to_string())]
    pub thread_name: String,

    #[default(true)]
    #[builder(default = true)]
    pub enable_time: bool,
}

pub(crate) fn cpu_threads() -> usize {
    available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
        .max(1)
}
