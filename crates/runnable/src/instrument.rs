//! §3/§4.4: `Instrument` — a [`labcore_object::Object`] that owns a
//! dedicated worker thread and a [`TaskQueue`] of [`Task`]s.
//!
//! As with [`labcore_hardware::SerialAdapter`], the core ships one concrete
//! generic implementation, [`InstrumentObject`], parameterized over an
//! [`InstrumentBody`] that supplies the instrument-specific payload (the
//! "current position/velocity/status/etc." §3 describes) and its
//! init/update/exit hooks.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use labcore_error::{Error, ExceptionContainer, Result};
use labcore_object::{Object, ObjectBase};
use labcore_sync::{DataBlock, SynchronizedPointer};
use labcore_telemetry::metrics::{
    RUNNABLE_ACTIVE, RUNNABLE_ERRORS, RUNNABLE_STARTED, RUNNABLE_STOPPED, RUNNABLE_TASKS_EXECUTED,
    RUNNABLE_TASKS_FAILED, RUNNABLE_TASK_DURATION_SECONDS,
};
use parking_lot::Mutex;
use snafu::IntoError;

use crate::{
    runnable::Runnable,
    task::{AsyncFnTask, InitTask, Task, TaskOutcome},
    task_queue::TaskQueue,
};

/// Default capacity of an instrument's task queue. The source bounds it
/// "to avoid unbounded memory growth from a runaway enqueuer" (§3: "a
/// bounded FIFO `TaskQueue`").
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Default timeout for locking an instrument's data block from outside its
/// own worker thread (§5: "one second for data blocks").
pub const DATA_LOCK_TIMEOUT: Duration = labcore_sync::DEFAULT_TIMEOUT;

/// Everything [`InstrumentObject`] shares under one lock: the
/// instrument-specific payload plus the bookkeeping every instrument needs
/// (§3: "a last-update timestamp, and a stored exception pointer").
pub struct InstrumentState<P> {
    pub payload: P,
    pub last_update: Instant,
    pub exception: Option<Error>,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The instrument-specific half of an [`InstrumentObject`]: its payload
/// type and init/update/exit hooks. Concrete instruments (positioner
/// control, a time-tagger's local state, …) are out of scope (§1); this is
/// the seam user modules of the embedding program implement against.
#[async_trait]
pub trait InstrumentBody: Send + Sync + 'static {
    type Payload: Send + 'static;

    fn initial_payload(&self) -> Self::Payload;

    /// `None` means "never" (§4.4: "sleep on the notifier for
    /// `min(updateInterval, ∞)`").
    fn update_interval(&self) -> Option<Duration> {
        None
    }

    /// Run once, in order, before any regular task (§4.4/§9: "`InitTask`
    /// must call into every base's init in order before returning").
    /// Concrete instrument types push one closure per base class during
    /// construction.
    fn init_steps(&self) -> Vec<Box<dyn FnMut() -> Result<()> + Send>> {
        Vec::new()
    }

    async fn on_update(&self, payload: &mut Self::Payload) -> Result<()> {
        let _ = payload;
        Ok(())
    }

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

/// Concrete `Instrument` (§3): one dedicated worker thread, one
/// [`TaskQueue`], one lockable [`InstrumentState`] of `B::Payload`.
pub struct InstrumentObject<B: InstrumentBody> {
    base: Arc<ObjectBase>,
    body: Arc<B>,
    queue: Arc<TaskQueue>,
    data: DataBlock,
    initialized: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<std::thread::JoinHandle<Result<()>>>>,
}

impl<B: InstrumentBody> InstrumentObject<B> {
    #[must_use]
    pub fn new(base: ObjectBase, body: B) -> Arc<Self> {
        let payload = body.initial_payload();
        Arc::new(Self {
            base: Arc::new(base),
            body: Arc::new(body),
            queue: Arc::new(TaskQueue::new(DEFAULT_QUEUE_CAPACITY)),
            data: DataBlock::new(InstrumentState {
                payload,
                last_update: Instant::now(),
                exception: None,
            }),
            initialized: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn task_queue(&self) -> &TaskQueue {
        &self.queue
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Lock the instrument's payload/timestamp/exception block. Readers
    /// (UI, modules) should pass a short timeout per §5.
    pub fn lock_data(&self, timeout: Duration) -> Result<SynchronizedPointer<InstrumentState<B::Payload>>> {
        self.data.lock_as::<InstrumentState<B::Payload>>(timeout)
    }

    /// §5 `AsSyncTask`: enqueue `body` and block until its terminal
    /// callback fires. The caller must not be holding this instrument's
    /// data lock (that would self-deadlock against the worker thread
    /// trying to take it).
    pub async fn run_task_and_wait(&self, body: Box<dyn crate::task::TaskBody>) -> Result<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let task = Arc::new(Task::new(
            body,
            false,
            Some(Box::new(move |container: &mut ExceptionContainer| {
                let _ = tx.send(container.clone());
            })),
        ));
        self.queue.enqueue(Arc::clone(&task))?;
        let container = rx
            .await
            .map_err(|_| {
                labcore_error::InternalCoreSnafu {
                    message: "task callback channel dropped before firing".to_string(),
                }
                .into_error(snafu::NoneError)
            })?;
        container.rethrow()
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
impl<B: InstrumentBody> Object for InstrumentObject<B> {
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
        let initialized = Arc::clone(&self.initialized);
        let running = Arc::clone(&self.running);
        let labels = self.labels();

        running.store(true, Ordering::SeqCst);
        let labels_for_thread = labels.clone();
        let thread_name = format!("labcore-instrument-{}", self.base.id());
        let options = labcore_runtime::RunnableThreadOptions::builder()
            .thread_name(thread_name)
            .build();
        let handle = labcore_runtime::spawn_runnable_thread(options, move |_rt| async move {
            run_loop::<B>(base, body, queue, data, initialized, running, labels_for_thread).await
        });
        *self.worker.lock() = Some(std::thread::Builder::new()
            .spawn(move || match handle.join() {
                Ok(Ok(result)) => result,
                Ok(Err(_runtime_error)) => Err(labcore_error::InternalCoreSnafu {
                    message: "instrument worker runtime failed to build".to_string(),
                }
                .into_error(snafu::NoneError)),
                Err(_panic) => Err(labcore_error::InternalCoreSnafu {
                    message: "instrument worker thread panicked".to_string(),
                }
                .into_error(snafu::NoneError)),
            })
            .expect("failed to spawn instrument join-shim thread"));
        RUNNABLE_STARTED.with_label_values(&label_refs(&labels)).inc();
        RUNNABLE_ACTIVE.with_label_values(&label_refs(&labels)).set(1);
        Ok(())
    }

    async fn on_reset(&self) -> Result<()> {
        Runnable::terminate(self, false, Duration::from_secs(5)).await
    }

    fn is_ready(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.is_initialized() && self.base().exception().is_none()
    }
}

#[async_trait]
impl<B: InstrumentBody> Runnable for InstrumentObject<B> {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        false
    }

    fn reason_why_paused(&self) -> Option<String> {
        None
    }

    async fn terminate(&self, _force: bool, join_timeout: Duration) -> Result<()> {
        self.queue.close();
        let body = Arc::clone(&self.body);
        let exit_task = Arc::new(Task::new(
            Box::new(AsyncFnTask(move || -> BoxFuture<Result<TaskOutcome>> {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    body.on_exit().await?;
                    Ok(TaskOutcome::Terminate)
                })
            })),
            false,
            None,
        ));
        self.queue.enqueue_internal(exit_task);

        let labels = self.labels();
        if let Some(handle) = self.worker.lock().take() {
            let joined = tokio::task::spawn_blocking(move || {
                // There is no portable timed-join on std::thread::JoinHandle;
                // the worker loop itself always terminates promptly once the
                // exit task has been enqueued, so a blocking join here is
                // bounded by the exit task's own runtime, not by this call.
                handle.join()
            });
            let _ = tokio::time::timeout(join_timeout, joined).await;
        }
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

async fn run_loop<B: InstrumentBody>(
    base: Arc<ObjectBase>,
    body: Arc<B>,
    queue: Arc<TaskQueue>,
    data: DataBlock,
    initialized: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    labels: [String; 3],
) -> Result<()> {
    let init_steps = body.init_steps();
    if init_steps.is_empty() {
        initialized.store(true, Ordering::SeqCst);
    } else {
        let initialized_clone = Arc::clone(&initialized);
        let init_task = Arc::new(Task::new(
            Box::new(InitTask::new(init_steps)),
            false,
            Some(Box::new(move |container: &mut ExceptionContainer| {
                if container.is_empty() {
                    initialized_clone.store(true, Ordering::SeqCst);
                }
            })),
        ));
        queue.enqueue_internal(init_task);
    }

    let update_interval = body.update_interval();
    let mut last_update = Instant::now();
    let notifier = queue.notifier();
    let label_slice = label_refs(&labels);

    loop {
        while let Some(task) = queue.pop_next() {
            let started = Instant::now();
            let (container, outcome) = task.run().await;
            RUNNABLE_TASK_DURATION_SECONDS
                .with_label_values(&label_slice)
                .observe(started.elapsed().as_secs_f64());

            if let Some(error) = container.as_error() {
                RUNNABLE_TASKS_FAILED.with_label_values(&label_slice).inc();
                queue.retire(task);
                let mut ptr = data.lock_as::<InstrumentState<B::Payload>>(DATA_LOCK_TIMEOUT)?;
                ptr.exception = Some(error.clone());
                drop(ptr);
                base.set_exception(error.clone());
                body.on_error(error).await;
                queue.close();
                running.store(false, Ordering::SeqCst);
                RUNNABLE_ERRORS.with_label_values(&label_slice).inc();
                RUNNABLE_ACTIVE.with_label_values(&label_slice).set(0);
                return Err(error.clone());
            }
            RUNNABLE_TASKS_EXECUTED.with_label_values(&label_slice).inc();
            queue.retire(task);
            if outcome == TaskOutcome::Terminate {
                running.store(false, Ordering::SeqCst);
                RUNNABLE_ACTIVE.with_label_values(&label_slice).set(0);
                return Ok(());
            }
        }

        let now = Instant::now();
        let due = update_interval.is_some_and(|interval| now.duration_since(last_update) >= interval);
        if due {
            let body_clone = Arc::clone(&body);
            let data_clone = data.clone();
            let update_task = Arc::new(Task::new(
                Box::new(AsyncFnTask(move || -> BoxFuture<Result<TaskOutcome>> {
                    let body = Arc::clone(&body_clone);
                    let data = data_clone.clone();
                    Box::pin(async move {
                        let mut ptr = data.lock_as::<InstrumentState<B::Payload>>(DATA_LOCK_TIMEOUT)?;
                        body.on_update(&mut ptr.payload).await?;
                        ptr.last_update = Instant::now();
                        Ok(TaskOutcome::Continue)
                    })
                })),
                false,
                None,
            ));
            // §4.4: the update task does not notify the queue's notifier on
            // enqueue, so the update interval paces itself instead of
            // busy-looping.
            queue.enqueue_internal(update_task);
            last_update = now;
        }

        let wait = update_interval.unwrap_or(Duration::from_secs(3600));
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
    impl InstrumentBody for NoopBody {
        type Payload = i64;

        fn initial_payload(&self) -> Self::Payload {
            0
        }
    }

    fn instrument() -> Arc<InstrumentObject<NoopBody>> {
        InstrumentObject::new(
            ObjectBase::new(ItemId::new(1), Category::Instrument, "NoopInstrument"),
            NoopBody,
        )
    }

    #[tokio::test]
    async fn start_runs_init_then_user_tasks_in_order() {
        let instrument = instrument();
        Object::ensure_ready_state(instrument.as_ref(), false).await.unwrap();

        let log = Arc::new(StdMutex::new(String::new()));
        for letter in ['A', 'B', 'C'] {
            let log = Arc::clone(&log);
            instrument
                .task_queue()
                .enqueue(Arc::new(Task::new(
                    Box::new(crate::task::FnTask(move |_: &crate::task::AbortSignal| {
                        log.lock().unwrap().push(letter);
                        Ok(TaskOutcome::Continue)
                    })),
                    false,
                    None,
                )))
                .unwrap();
        }

        for _ in 0..50 {
            if *log.lock().unwrap() == "ABC" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*log.lock().unwrap(), "ABC");

        Runnable::terminate(instrument.as_ref(), false, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn task_exception_becomes_instrument_exception_and_stops_the_loop() {
        let instrument = instrument();
        Object::ensure_ready_state(instrument.as_ref(), false).await.unwrap();

        instrument
            .task_queue()
            .enqueue(Arc::new(Task::new(
                Box::new(crate::task::FnTask(|_: &crate::task::AbortSignal| {
                    Err(labcore_error::InternalCoreSnafu {
                        message: "boom".to_string(),
                    }
                    .into())
                })),
                false,
                None,
            )))
            .unwrap();

        for _ in 0..50 {
            if !instrument.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!instrument.is_running());
        let ptr = instrument.lock_data(DATA_LOCK_TIMEOUT).unwrap();
        assert!(ptr.exception.is_some());
        drop(ptr);
        // §7: "the object's public state becomes Error with the exception
        // available via GetException()" — GetException reads the object,
        // not the data block, so failed resources can be found/reset (§4.6).
        assert!(instrument.base().exception().is_some());
    }
}
