//! Runnable substrate: `Task`/`TaskQueue`/`Instrument` and
//! `Event`/`InterModuleEvent`/`Module` worker loops (§4.4/§4.5).
//!
//! This is layer 3 of the core (~40% of it): the dedicated-worker-thread
//! execution model that turns an `Object` into something with a task or
//! event FIFO, a run loop, and the pause/resume and exception-propagation
//! discipline the embedding UI observes.

mod event;
mod event_queue;
mod inter_module_event;
mod instrument;
mod latch;
mod module;
mod runnable;
mod task;
mod task_queue;

pub use event::{AsyncFnEvent, Event, EventBody};
pub use event_queue::EventQueue;
pub use inter_module_event::{Handler, InterModuleEventRegistry, ModuleKey};
pub use instrument::{
    DATA_LOCK_TIMEOUT as INSTRUMENT_DATA_LOCK_TIMEOUT, DEFAULT_QUEUE_CAPACITY, InstrumentBody,
    InstrumentObject, InstrumentState,
};
pub use latch::{ArriveAtLatchTask, Latch, wait_for_instruments};
pub use module::{
    DATA_LOCK_TIMEOUT as MODULE_DATA_LOCK_TIMEOUT, ModuleBody, ModuleLoopOutcome, ModuleObject,
    ModuleState, PAUSE_POLL_INTERVAL, WARNING_STREAK_LIMIT,
};
pub use runnable::Runnable;
pub use task::{
    AbortSignal, AsyncFnTask, ExitTask, FnTask, InitTask, Task, TaskBody, TaskOutcome, TaskState,
    UpdateTask,
};
pub use task_queue::TaskQueue;
