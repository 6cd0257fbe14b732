//! §3/§4.5: `Module` — a [`labcore_object::Object`] that owns a dedicated
//! worker thread and an [`EventQueue`] of [`Event`]s, plus the pause/resume
//! discipline that keys off its linked objects' readiness.
//!
//! As with [`labcore_runnable::InstrumentObject`](crate::InstrumentObject),
//! the core ships one concrete generic implementation, [`ModuleObject`],
//! parameterized over a [`ModuleBody`] that supplies the module-specific
//! payload and its init/pause/resume/main-loop/exit hooks.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use labcore_error::{Error, Result};
use labcore_object::{Object, ObjectBase};
use labcore_sync::{DataBlock, SynchronizedPointer};
use labcore_telemetry::metrics::{
    RUNNABLE_ACTIVE, RUNNABLE_ERRORS, RUNNABLE_PAUSED, RUNNABLE_RESUMED, RUNNABLE_STARTED,
    RUNNABLE_STOPPED, RUNNABLE_TASKS_EXECUTED, RUNNABLE_TASKS_FAILED,
    RUNNABLE_TASK_DURATION_SECONDS,
};
use parking_lot::Mutex;
use snafu::IntoError;

use crate::{
    event::{AsyncFnEvent, Event},
    event_queue::EventQueue,
    inter_module_event::{Handler, InterModuleEventRegistry},
    runnable::Runnable,
};

/// §4.5: "sleep 100 ms" while paused, polling linked-object readiness.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// §4.5/§7: "most exceptions from the main loop or events become warnings
/// up to N=10 consecutive, then terminate the module". §9 leaves whether
/// derived modules may tune this undocumented; this implementation keeps it
/// a fixed framework constant rather than exposing it as a per-module knob,
/// so the invariant is uniform across every module type.
pub const WARNING_STREAK_LIMIT: usize = 10;

/// Default timeout for locking a module's data block from outside its own
/// worker thread (§5: "one second for data blocks").
pub const DATA_LOCK_TIMEOUT: Duration = labcore_sync::DEFAULT_TIMEOUT;

type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// What [`ModuleBody::main_loop_step`] asks the module loop to do once it
/// has run to completion without throwing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModuleLoopOutcome {
    Continue,
    Terminate,
}

/// Everything a [`ModuleObject`] shares under one lock: the module-specific
/// payload plus the bookkeeping every module needs (§3: "an event FIFO and
/// a stored exception pointer", §6: "`GetReasonWhyPaused()`").
pub struct ModuleState<P> {
    pub payload: P,
    pub paused: bool,
    pub reason_why_paused: Option<String>,
    pub exception: Option<Error>,
}

/// The module-specific half of a [`ModuleObject`]: its payload type and
/// init/pause/resume/main-loop/exit hooks. Concrete modules (positioner
/// control, a time-tagger network server) are out of scope (§1); this is
/// the seam user modules of the embedding program implement against.
#[async_trait]
pub trait ModuleBody: Send + Sync + 'static {
    type Payload: Send + 'static;

    fn initial_payload(&self) -> Self::Payload;

    /// Runs once, before the main loop (§4.5: "on start: enqueue `OnInit`
    /// event"). The natural place to acquire `LinkedObjectWrapper`s and
    /// subscribe to inter-module events via
    /// [`ModuleObject::subscribe`](crate::ModuleObject::subscribe).
    async fn on_init(&self) -> Result<()> {
        Ok(())
    }

    /// Whether every object this module links is ready right now, and if
    /// not, a human-readable reason (§6: `GetReasonWhyPaused`). The default
    /// of "always ready" suits a module with no hardware/instrument links.
    async fn linked_objects_ready(&self) -> (bool, Option<String>) {
        (true, None)
    }

    async fn on_pause(&self) {}
    async fn on_resume(&self) {}

    /// `None` means "never" — the main loop step runs only via its own
    /// enqueued events thereafter (§4.4/§4.5: "sleep on the notifier for
    /// `min(interval, ∞)`").
    fn main_loop_interval(&self) -> Option<Duration> {
        None
    }

    async fn main_loop_step(&self, payload: &mut Self::Payload) -> Result<ModuleLoopOutcome> {
        let _ = payload;
        Ok(ModuleLoopOutcome::Continue)
    }

    /// §4.5: "on termination: enqueue `OnExit`". Modules are expected to
    /// deregister their own subscriptions here too, though the framework's
    /// own cleanup (§4.5/§8) makes that a belt-and-braces step rather than
    /// a correctness requirement.
    async fn on_exit(&self) -> Result<()> {
        Ok(())
    }

    /// Called with whatever exception terminated the worker loop. Must not
    /// throw (§7: "invokes the object's `OnError` hook (which must not
    /// throw)").
    async fn on_error(&self, error: &Error) {
        let _ = error;
    }
}

/// Concrete `Module` (§3): one dedicated worker thread, one [`EventQueue`],
/// one lockable [`ModuleState`] of `B::Payload`.
pub struct ModuleObject<B: ModuleBody> {
    base: Arc<ObjectBase>,
    body: Arc<B>,
    queue: Arc<EventQueue>,
    data: DataBlock,
    running: Arc<AtomicBool>,
    should_terminate: Arc<AtomicBool>,
    subscriptions: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    worker: Mutex<Option<std::thread::JoinHandle<Result<()>>>>,
}

impl<B: ModuleBody> ModuleObject<B> {
    #[must_use]
    pub fn new(base: ObjectBase, body: B) -> Arc<Self> {
        let payload = body.initial_payload();
        Arc::new(Self {
            base: Arc::new(base),
            body: Arc::new(body),
            queue: Arc::new(EventQueue::new()),
            data: DataBlock::new(ModuleState {
                payload,
                paused: false,
                reason_why_paused: None,
                exception: None,
            }),
            running: Arc::new(AtomicBool::new(false)),
            should_terminate: Arc::new(AtomicBool::new(false)),
            subscriptions: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn event_queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Lock the module's payload/pause-state/exception block. Readers (UI)
    /// should pass a short timeout per §5.
    pub fn lock_data(&self, timeout: Duration) -> Result<SynchronizedPointer<ModuleState<B::Payload>>> {
        self.data.lock_as::<ModuleState<B::Payload>>(timeout)
    }

    /// `MakeAndEnqueueEvent(this, &Self::Member, args…)`: enqueue an
    /// arbitrary async closure to run on this module's own thread.
    pub fn enqueue_event<F>(&self, body: F) -> Result<()>
    where
        F: FnMut() -> BoxFuture<Result<()>> + Send + 'static,
    {
        self.queue
            .enqueue(Arc::new(Event::new(Box::new(AsyncFnEvent(body)))))
    }

    /// Subscribe to an inter-module event kind's static registry and record
    /// the matching deregistration so the framework's own cleanup (§4.5/§8)
    /// can undo it even if the module never calls
    /// [`ModuleObject::unsubscribe`] itself.
    pub fn subscribe<Args>(&self, registry: &'static InterModuleEventRegistry<Args>, handler: Handler<Args>)
    where
        Args: Clone + Send + 'static,
    {
        let id = self.base.id();
        registry.register(id, handler);
        self.subscriptions
            .lock()
            .push(Box::new(move || registry.deregister(id)));
    }

    fn deregister_all_subscriptions(&self) {
        let cleanups = std::mem::take(&mut *self.subscriptions.lock());
        for cleanup in cleanups {
            cleanup();
        }
    }

    fn labels(&self) -> [String; 3] {
        [
            self.base.category().to_string(),
            self.base.library_name().to_string(),
            self.base.id().to_string(),
        ]
    }
}

#[async_trait]
impl<B: ModuleBody> Object for ModuleObject<B> {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    async fn on_ensure_ready(&self, _is_auto_startup: bool) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        let base = Arc::clone(&self.base);
        let body = Arc::clone(&self.body);
        let queue = Arc::clone(&self.queue);
        let data = self.data.clone();
        let running = Arc::clone(&self.running);
        let should_terminate = Arc::clone(&self.should_terminate);
        let labels = self.labels();

        running.store(true, Ordering::SeqCst);
        let thread_name = format!("labcore-module-{}", self.base.id());
        let options = labcore_runtime::RunnableThreadOptions::builder()
            .thread_name(thread_name)
            .build();
        let handle = labcore_runtime::spawn_runnable_thread(options, move |_rt| async move {
            run_loop::<B>(base, body, queue, data, running, should_terminate, labels).await
        });
        *self.worker.lock() = Some(
            std::thread::Builder::new()
                .spawn(move || match handle.join() {
                    Ok(Ok(result)) => result,
                    Ok(Err(_runtime_error)) => Err(labcore_error::InternalCoreSnafu {
                        message: "module worker runtime failed to build".to_string(),
                    }
                    .into_error(snafu::NoneError)),
                    Err(_panic) => Err(labcore_error::InternalCoreSnafu {
                        message: "module worker thread panicked".to_string(),
                    }
                    .into_error(snafu::NoneError)),
                })
                .expect("failed to spawn module join-shim thread"),
        );
        RUNNABLE_STARTED
            .with_label_values(&label_refs(&self.labels()))
            .inc();
        RUNNABLE_ACTIVE
            .with_label_values(&label_refs(&self.labels()))
            .set(1);
        Ok(())
    }

    async fn on_reset(&self) -> Result<()> {
        Runnable::terminate(self, false, Duration::from_secs(5)).await
    }

    fn is_ready(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.base().exception().is_none()
    }
}

#[async_trait]
impl<B: ModuleBody> Runnable for ModuleObject<B> {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.data
            .lock_as::<ModuleState<B::Payload>>(labcore_sync::SHORT_TIMEOUT)
            .map(|ptr| ptr.paused)
            .unwrap_or(false)
    }

    fn reason_why_paused(&self) -> Option<String> {
        self.data
            .lock_as::<ModuleState<B::Payload>>(labcore_sync::SHORT_TIMEOUT)
            .ok()
            .and_then(|ptr| ptr.reason_why_paused.clone())
    }

    async fn terminate(&self, _force: bool, join_timeout: Duration) -> Result<()> {
        self.queue.close();
        let body = Arc::clone(&self.body);
        let should_terminate = Arc::clone(&self.should_terminate);
        self.queue.enqueue_internal(Arc::new(Event::new(Box::new(AsyncFnEvent(
            move || -> BoxFuture<Result<()>> {
                let body = Arc::clone(&body);
                let should_terminate = Arc::clone(&should_terminate);
                Box::pin(async move {
                    let result = body.on_exit().await;
                    should_terminate.store(true, Ordering::SeqCst);
                    result
                })
            },
        ))));

        let labels = self.labels();
        if let Some(handle) = self.worker.lock().take() {
            let joined = tokio::task::spawn_blocking(move || handle.join());
            let _ = tokio::time::timeout(join_timeout, joined).await;
        }
        self.deregister_all_subscriptions();
        self.running.store(false, Ordering::SeqCst);
        RUNNABLE_STOPPED.with_label_values(&label_refs(&labels)).inc();
        RUNNABLE_ACTIVE.with_label_values(&label_refs(&labels)).set(0);
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn label_refs(labels: &[String; 3]) -> [&str; 3] {
    [labels[0].as_str(), labels[1].as_str(), labels[2].as_str()]
}

fn is_link_resolution_error(error: &Error) -> bool {
    matches!(
        error,
        Error::LinkedObjectNotLocked { .. } | Error::InvalidObjectLink { .. }
    ) || matches!(error, Error::Forwarded { source, .. } if is_link_resolution_error(source))
}

async fn run_loop<B: ModuleBody>(
    base: Arc<ObjectBase>,
    body: Arc<B>,
    queue: Arc<EventQueue>,
    data: DataBlock,
    running: Arc<AtomicBool>,
    should_terminate: Arc<AtomicBool>,
    labels: [String; 3],
) -> Result<()> {
    let body_init = Arc::clone(&body);
    queue.enqueue_internal(Arc::new(Event::new(Box::new(AsyncFnEvent(
        move || -> BoxFuture<Result<()>> {
            let body = Arc::clone(&body_init);
            Box::pin(async move { body.on_init().await })
        },
    )))));

    let main_loop_interval = body.main_loop_interval();
    let mut last_loop_step = Instant::now();
    let mut consecutive_warnings: usize = 0;
    let notifier = queue.notifier();
    let label_slice = label_refs(&labels);
    let mut currently_paused = false;

    let terminate_with = |error: Error| -> Result<()> {
        RUNNABLE_ERRORS.with_label_values(&label_slice).inc();
        RUNNABLE_ACTIVE.with_label_values(&label_slice).set(0);
        running.store(false, Ordering::SeqCst);
        Err(error)
    };

    loop {
        if should_terminate.load(Ordering::SeqCst) {
            running.store(false, Ordering::SeqCst);
            RUNNABLE_ACTIVE.with_label_values(&label_slice).set(0);
            return Ok(());
        }

        let (ready, reason) = body.linked_objects_ready().await;
        if !ready {
            if !currently_paused {
                body.on_pause().await;
                currently_paused = true;
                RUNNABLE_PAUSED.with_label_values(&label_slice).inc();
            }
            if let Ok(mut ptr) = data.lock_as::<ModuleState<B::Payload>>(DATA_LOCK_TIMEOUT) {
                ptr.paused = true;
                ptr.reason_why_paused = reason;
            }
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
            continue;
        } else if currently_paused {
            currently_paused = false;
            body.on_resume().await;
            RUNNABLE_RESUMED.with_label_values(&label_slice).inc();
            if let Ok(mut ptr) = data.lock_as::<ModuleState<B::Payload>>(DATA_LOCK_TIMEOUT) {
                ptr.paused = false;
                ptr.reason_why_paused = None;
            }
        }

        // §9 open question: events enqueued while the module was paused
        // are delivered, not dropped, once its linked objects become ready
        // again — the queue is never closed by a pause, only by
        // `terminate`, so nothing here discards them.
        while let Some(event) = queue.pop_next() {
            let started = Instant::now();
            let result = event.invoke().await;
            RUNNABLE_TASK_DURATION_SECONDS
                .with_label_values(&label_slice)
                .observe(started.elapsed().as_secs_f64());

            match result {
                Ok(()) => {
                    RUNNABLE_TASKS_EXECUTED.with_label_values(&label_slice).inc();
                    consecutive_warnings = 0;
                }
                Err(error) if is_link_resolution_error(&error) => {
                    RUNNABLE_TASKS_FAILED.with_label_values(&label_slice).inc();
                    let mut ptr = data.lock_as::<ModuleState<B::Payload>>(DATA_LOCK_TIMEOUT)?;
                    ptr.exception = Some(error.clone());
                    drop(ptr);
                    base.set_exception(error.clone());
                    body.on_error(&error).await;
                    return terminate_with(error);
                }
                Err(error) => {
                    RUNNABLE_TASKS_FAILED.with_label_values(&label_slice).inc();
                    consecutive_warnings += 1;
                    tracing::warn!(error = %error, consecutive_warnings, "module event raised a warning");
                    if consecutive_warnings >= WARNING_STREAK_LIMIT {
                        let mut ptr = data.lock_as::<ModuleState<B::Payload>>(DATA_LOCK_TIMEOUT)?;
                        ptr.exception = Some(error.clone());
                        drop(ptr);
                        base.set_exception(error.clone());
                        body.on_error(&error).await;
                        return terminate_with(error);
                    }
                }
            }
        }

        let now = Instant::now();
        let due = main_loop_interval
            .map_or(true, |interval| now.duration_since(last_loop_step) >= interval);
        if due {
            let outcome = {
                let mut ptr = data.lock_as::<ModuleState<B::Payload>>(DATA_LOCK_TIMEOUT)?;
                body.main_loop_step(&mut ptr.payload).await
            };
            match outcome {
                Ok(ModuleLoopOutcome::Continue) => {
                    last_loop_step = now;
                }
                Ok(ModuleLoopOutcome::Terminate) => {
                    running.store(false, Ordering::SeqCst);
                    RUNNABLE_ACTIVE.with_label_values(&label_slice).set(0);
                    return Ok(());
                }
                Err(error) if is_link_resolution_error(&error) => {
                    let mut ptr = data.lock_as::<ModuleState<B::Payload>>(DATA_LOCK_TIMEOUT)?;
                    ptr.exception = Some(error.clone());
                    drop(ptr);
                    base.set_exception(error.clone());
                    body.on_error(&error).await;
                    return terminate_with(error);
                }
                Err(error) => {
                    consecutive_warnings += 1;
                    tracing::warn!(error = %error, consecutive_warnings, "module main loop raised a warning");
                    if consecutive_warnings >= WARNING_STREAK_LIMIT {
                        let mut ptr = data.lock_as::<ModuleState<B::Payload>>(DATA_LOCK_TIMEOUT)?;
                        ptr.exception = Some(error.clone());
                        drop(ptr);
                        base.set_exception(error.clone());
                        body.on_error(&error).await;
                        return terminate_with(error);
                    }
                    last_loop_step = now;
                }
            }
        }

        let wait = main_loop_interval.unwrap_or(Duration::from_secs(3600));
        notifier.wait_timeout(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use labcore_object::{Category, ItemId};

    use super::*;

    struct NoopBody;

    #[async_trait]
    impl ModuleBody for NoopBody {
        type Payload = i64;

        fn initial_payload(&self) -> Self::Payload {
            0
        }
    }

    fn module() -> Arc<ModuleObject<NoopBody>> {
        ModuleObject::new(
            ObjectBase::new(ItemId::new(1), Category::Module, "NoopModule"),
            NoopBody,
        )
    }

    #[tokio::test]
    async fn start_runs_init_then_user_events_in_order() {
        let module = module();
        Object::ensure_ready_state(module.as_ref(), false).await.unwrap();

        let log = Arc::new(StdMutex::new(String::new()));
        for letter in ['A', 'B', 'C'] {
            let log = Arc::clone(&log);
            module
                .enqueue_event(move || -> BoxFuture<Result<()>> {
                    let log = Arc::clone(&log);
                    Box::pin(async move {
                        log.lock().unwrap().push(letter);
                        Ok(())
                    })
                })
                .unwrap();
        }

        for _ in 0..50 {
            if *log.lock().unwrap() == "ABC" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*log.lock().unwrap(), "ABC");

        Runnable::terminate(module.as_ref(), false, Duration::from_secs(1))
            .await
            .unwrap();
    }

    struct AlwaysPausedBody;

    #[async_trait]
    impl ModuleBody for AlwaysPausedBody {
        type Payload = ();

        fn initial_payload(&self) -> Self::Payload {}

        async fn linked_objects_ready(&self) -> (bool, Option<String>) {
            (false, Some("waiting on hardware".to_string()))
        }
    }

    #[tokio::test]
    async fn paused_module_reports_its_reason() {
        let module = ModuleObject::new(
            ObjectBase::new(ItemId::new(2), Category::Module, "AlwaysPaused"),
            AlwaysPausedBody,
        );
        Object::ensure_ready_state(module.as_ref(), false).await.unwrap();

        for _ in 0..50 {
            if Runnable::is_paused(module.as_ref()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(Runnable::is_paused(module.as_ref()));
        assert_eq!(
            Runnable::reason_why_paused(module.as_ref()).as_deref(),
            Some("waiting on hardware")
        );

        Runnable::terminate(module.as_ref(), false, Duration::from_secs(1))
            .await
            .unwrap();
    }

    struct FlakyBody {
        counter: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ModuleBody for FlakyBody {
        type Payload = ();

        fn initial_payload(&self) -> Self::Payload {}

        fn main_loop_interval(&self) -> Option<Duration> {
            Some(Duration::from_millis(5))
        }

        async fn main_loop_step(&self, _payload: &mut Self::Payload) -> Result<ModuleLoopOutcome> {
            self.counter.fetch_add(1, Ordering::SeqCst);
            Err(labcore_error::InternalCoreSnafu {
                message: "transient".to_string(),
            }
            .into())
        }
    }

    #[tokio::test]
    async fn main_loop_errors_become_warnings_until_the_streak_limit() {
        let module = ModuleObject::new(
            ObjectBase::new(ItemId::new(3), Category::Module, "Flaky"),
            FlakyBody {
                counter: std::sync::atomic::AtomicUsize::new(0),
            },
        );
        Object::ensure_ready_state(module.as_ref(), false).await.unwrap();

        for _ in 0..200 {
            if !module.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!module.running.load(Ordering::SeqCst));
        let ptr = module.lock_data(DATA_LOCK_TIMEOUT).unwrap();
        assert!(ptr.exception.is_some());
        drop(ptr);
        // §7: GetException reads the object, not the data block, so a
        // crashed module can be found by ResourceManager::failed_resource_ids
        // and later reset (§4.6).
        assert!(module.base().exception().is_some());
    }
}
