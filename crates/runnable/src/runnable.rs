//! §5: the common slice of the observer interface (§6) every object that
//! owns a worker thread exposes — `IsRunning`, `IsPaused`,
//! `GetReasonWhyPaused` — plus cooperative `Terminate`.

use std::time::Duration;

use async_trait::async_trait;
use labcore_error::Result;
use labcore_object::Object;

/// An [`Object`] that owns a dedicated worker thread (instrument or
/// module, §2). `Terminate` aborts the current front unit of work, drops
/// everything still waiting, enqueues the runnable's exit task/event,
/// closes its queue, and joins the worker thread.
#[async_trait]
pub trait Runnable: Object {
    fn is_running(&self) -> bool;
    fn is_paused(&self) -> bool;
    fn reason_why_paused(&self) -> Option<String>;

    /// Stop the worker thread. `force` skips waiting for the current unit
    /// of work to cooperatively abort before joining.
    async fn terminate(&self, force: bool, join_timeout: Duration) -> Result<()>;

    /// Type-erased self, so a manager holding `Arc<dyn Runnable>` can still
    /// answer `Filter<T>()` (§4.6) by downcasting back to the concrete
    /// instrument/module body type it was constructed with.
    fn as_any(&self) -> &dyn std::any::Any;
}
