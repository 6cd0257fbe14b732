//! §3/§4.5: `Event` — a heap-allocated callable bound to `(receiver module,
//! member function, captured arguments)`, run on the receiver module's
//! thread. Simpler than [`crate::task::Task`]: the spec gives events no
//! state machine and no terminal callback, only "pop and invoke".

use async_trait::async_trait;
use labcore_error::Result;
use parking_lot::Mutex;

/// The work an event performs once popped off its module's queue.
#[async_trait]
pub trait EventBody: Send {
    async fn invoke(&mut self) -> Result<()>;
}

type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Closure-backed [`EventBody`] for an async closure, the shape
/// `ModuleObject::enqueue_event` needs since a module body's hooks are
/// `async fn`s that close over the module's locked payload.
pub struct AsyncFnEvent<F>(pub F)
where
    F: FnMut() -> BoxFuture<Result<()>> + Send;

#[async_trait]
impl<F> EventBody for AsyncFnEvent<F>
where
    F: FnMut() -> BoxFuture<Result<()>> + Send,
{
    async fn invoke(&mut self) -> Result<()> {
        (self.0)().await
    }
}

/// One unit of work on a module's FIFO (§3/§4.5). `Event::run` consumes the
/// body exactly once; unlike [`crate::task::Task`] there is no `Aborted`
/// state to observe and no terminal callback — a dropped, never-run event
/// is simply discarded, matching "Events are heap-allocated callables" with
/// no further lifecycle contract in the spec.
pub struct Event {
    body: Mutex<Option<Box<dyn EventBody>>>,
}

impl Event {
    #[must_use]
    pub fn new(body: Box<dyn EventBody>) -> Self {
        Self {
            body: Mutex::new(Some(body)),
        }
    }

    /// Run the event to completion. Panics if called more than once on the
    /// same instance (the module event loop only ever calls this once per
    /// popped event).
    pub async fn invoke(&self) -> Result<()> {
        let mut body = self.body.lock().take().expect("event body already consumed");
        body.invoke().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    #[tokio::test]
    async fn invoke_runs_the_closure_once() {
        let calls = Arc::new(StdMutex::new(0));
        let calls2 = Arc::clone(&calls);
        let event = Event::new(Box::new(AsyncFnEvent(move || -> BoxFuture<Result<()>> {
            let calls = Arc::clone(&calls2);
            Box::pin(async move {
                *calls.lock().unwrap() += 1;
                Ok(())
            })
        })));
        event.invoke().await.unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
