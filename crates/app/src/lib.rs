//! Orchestration facade (§2/§6): owns the three resource managers, the
//! per-category libraries a project's `Item` names are resolved against,
//! and the startup/open-project/shutdown lifecycle an embedding program
//! drives.
//!
//! This crate never picks concrete hardware adapters, instruments or
//! modules for the embedder — those are "device driver"/"concrete
//! measurement module" territory, explicitly out of scope. `AppConfig`
//! takes empty libraries by default; an embedding program registers its
//! own [`labcore_object::LibraryEntry`] values before calling
//! [`AppConfig::open`].

use std::{path::Path, sync::Arc, time::Duration};

use bon::Builder;
use labcore_error::Result;
use labcore_hardware::HardwareAdapter;
use labcore_manager::{HardwareManager, InstrumentManager, ModuleManager};
use labcore_object::{Library, Object};
use labcore_project::{ProjectLibraries, ProjectManagers, load_project_from_file, save_project_to_file};
use labcore_runnable::Runnable;
use smart_default::SmartDefault;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Process-level tuning (AMBIENT STACK "Configuration"): distinct from
/// [`labcore_object::Params`], which is per-object, persisted, user-facing
/// configuration. This is the embedder's one-time wiring.
#[derive(Builder, SmartDefault)]
pub struct AppConfig {
    /// Library entries a project's `HardwareAdapters` section resolves
    /// against (§4.7). Empty until the embedder registers its own.
    #[builder(default)]
    pub hardware_library: Library<dyn HardwareAdapter>,
    /// Library entries a project's `Instruments` section resolves against.
    #[builder(default)]
    pub instrument_library: Library<dyn Runnable>,
    /// Library entries a project's `Modules` section resolves against.
    #[builder(default)]
    pub module_library: Library<dyn Runnable>,
    /// How long `shutdown` waits for each runnable's worker thread to join
    /// before giving up on a clean `Terminate` (§5).
    #[builder(default = Duration::from_secs(5))]
    #[default(_code = "Duration::from_secs(5)")]
    pub shutdown_join_timeout: Duration,
    /// Whether `run` installs the Ctrl+C/SIGTERM handler, or instead waits
    /// only for an explicit `AppHandle::shutdown`.
    #[builder(default = true)]
    #[default = true]
    pub enable_graceful_shutdown: bool,
}

impl AppConfig {
    #[must_use]
    pub fn open(self) -> App {
        App {
            config: self,
            ..Default::default()
        }
    }
}

/// The live runtime: the three managers plus the libraries and tuning from
/// [`AppConfig`] and the bookkeeping `run`/`AppHandle` need for graceful
/// shutdown.
#[derive(SmartDefault)]
pub struct App {
    pub hardware: HardwareManager,
    pub instruments: InstrumentManager,
    pub modules: ModuleManager,
    config: AppConfig,
    #[default(_code = "Arc::new(std::sync::atomic::AtomicBool::new(false))")]
    running: Arc<std::sync::atomic::AtomicBool>,
    #[default(_code = "CancellationToken::new()")]
    cancellation_token: CancellationToken,
}

impl App {
    fn project_managers(&self) -> ProjectManagers<'_, dyn HardwareAdapter, dyn Runnable, dyn Runnable> {
        ProjectManagers {
            hardware: self.hardware.resources(),
            instruments: self.instruments.resources(),
            modules: self.modules.resources(),
        }
    }

    fn project_libraries(&self) -> ProjectLibraries<'_, dyn HardwareAdapter, dyn Runnable, dyn Runnable> {
        ProjectLibraries {
            hardware: &self.config.hardware_library,
            instruments: &self.config.instrument_library,
            modules: &self.config.module_library,
        }
    }

    /// §6: "the embedding program accepts a single optional argument: a
    /// project file path to auto-open and auto-run." Loads every `Item`,
    /// instantiating it via the matching library and inserting it into the
    /// matching manager; does not itself start anything (see [`Self::startup`]).
    pub fn open_project(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "opening project file");
        load_project_from_file(path, &self.project_libraries(), &self.project_managers())
    }

    /// Serialize every managed object back out to `path` (§6).
    pub fn save_project(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "saving project file");
        save_project_to_file(path, &self.project_managers())
    }

    /// Bring every managed object to its ready state, leaves first: hardware
    /// adapters open their channel, then instruments start their worker
    /// thread (they may link to adapters), then modules start theirs (they
    /// may link to instruments). §7: "first failure is captured, iteration
    /// continues, aggregated failure is re-raised" — applied per category,
    /// so one hardware adapter failing to connect doesn't stop the rest of
    /// the sweep, but does surface once every category has been attempted.
    pub async fn startup(&self, is_auto_startup: bool) -> Result<()> {
        self.hardware
            .resources()
            .startup(move |adapter| async move { adapter.ensure_ready_state(is_auto_startup).await })
            .await?;
        self.instruments
            .resources()
            .startup(move |instrument| async move { instrument.ensure_ready_state(is_auto_startup).await })
            .await?;
        self.modules
            .resources()
            .startup(move |module| async move { module.ensure_ready_state(is_auto_startup).await })
            .await
    }

    /// Tear every managed object down, reverse of [`Self::startup`]:
    /// modules first (they may hold `LinkedObjectWrapper`s into
    /// instruments), then instruments, then hardware adapters last. Every
    /// step is best-effort — failures are logged, not propagated, since the
    /// caller is already tearing the process down.
    pub async fn shutdown(&self) {
        let join_timeout = self.config.shutdown_join_timeout;
        self.modules.terminate_all(false, join_timeout).await;
        self.instruments.terminate_all(false, join_timeout).await;
        self.hardware
            .resources()
            .shutdown(|adapter| async move { adapter.reset(true).await })
            .await;
    }

    /// Start the application and return a handle for controlling it.
    /// Mirrors the teacher's two-phase `start`/`run` split: `start` does the
    /// one-time bring-up and returns immediately, `run` additionally blocks
    /// until shutdown. Takes `self` by `Arc` so the spawned shutdown task
    /// can keep the managers alive after this call returns.
    async fn start(self: Arc<Self>, is_auto_startup: bool) -> Result<AppHandle> {
        self.running.store(true, std::sync::atomic::Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = AppHandle {
            shutdown_tx: Some(shutdown_tx),
            running: Arc::clone(&self.running),
            cancellation_token: self.cancellation_token.clone(),
        };

        self.startup(is_auto_startup).await?;
        info!("application started successfully");

        let enable_graceful_shutdown = self.config.enable_graceful_shutdown;
        tokio::spawn(async move {
            if enable_graceful_shutdown {
                shutdown_signal(shutdown_rx).await;
            } else {
                let _ = shutdown_rx.await;
            }

            self.running.store(false, std::sync::atomic::Ordering::SeqCst);
            self.cancellation_token.cancel();
            info!("shutting down managed objects");
            self.shutdown().await;
            info!("application shutdown complete");
        });

        Ok(handle)
    }

    /// Start the application, optionally auto-opening `project_path`
    /// (§6), then block until shutdown completes.
    pub async fn run(self: Arc<Self>, project_path: Option<&Path>) -> Result<()> {
        if let Some(path) = project_path {
            self.open_project(path)?;
        }
        let is_auto_startup = project_path.is_some();
        let handle = Arc::clone(&self).start(is_auto_startup).await?;
        handle.wait_for_shutdown().await;
        Ok(())
    }
}

/// Handle for controlling a running [`App`] from outside its `run` future.
#[allow(dead_code)]
pub struct AppHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    running: Arc<std::sync::atomic::AtomicBool>,
    cancellation_token: CancellationToken,
}

impl AppHandle {
    /// Request graceful shutdown.
    pub fn shutdown(&mut self) {
        info!("initiating graceful shutdown");
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        self.cancellation_token.cancel();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub async fn wait_for_shutdown(&self) {
        self.cancellation_token.cancelled().await;
    }
}

async fn shutdown_signal(shutdown_rx: oneshot::Receiver<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received Ctrl+C signal"); },
        () = terminate => { info!("received terminate signal"); },
        _ = shutdown_rx => { info!("received shutdown signal"); },
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use labcore_error::Result as LabResult;
    use labcore_object::{Category, ItemId, ObjectBase, Params};
    use std::sync::atomic::Ordering;

    use super::*;

    struct DummyAdapter {
        base: ObjectBase,
    }

    #[async_trait]
    impl Object for DummyAdapter {
        fn base(&self) -> &ObjectBase {
            &self.base
        }

        async fn on_ensure_ready(&self, _is_auto_startup: bool) -> LabResult<()> {
            Ok(())
        }

        async fn on_reset(&self) -> LabResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl HardwareAdapter for DummyAdapter {
        fn line_ending(&self) -> labcore_hardware::LineEnding {
            labcore_hardware::LineEnding::Lf
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn write(&self, _text: &str) -> LabResult<()> {
            Ok(())
        }
        fn write_terminator(&self) -> LabResult<()> {
            Ok(())
        }
        fn read(&self) -> LabResult<Vec<u8>> {
            Ok(Vec::new())
        }
        fn read_line(&self) -> LabResult<String> {
            Ok(String::new())
        }
        fn read_all(&self) -> LabResult<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn wait_for_line(&self, _tries: u32, _delay: Duration) -> LabResult<String> {
            Ok(String::new())
        }
        fn clear(&self) -> LabResult<()> {
            Ok(())
        }
        fn flush(&self) -> LabResult<()> {
            Ok(())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[tokio::test]
    async fn app_is_not_running_until_started() {
        let app = AppConfig::default().open();
        assert!(!app.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn startup_ensures_every_hardware_adapter_ready() {
        let app = AppConfig::default().open();
        let id = ItemId::new(1);
        app.hardware.resources().insert_resource(
            id,
            "Dummy",
            Arc::new(Params::new(vec![])),
            Arc::new(DummyAdapter {
                base: ObjectBase::new(id, Category::HardwareAdapter, "Dummy"),
            }),
        );
        app.startup(true).await.unwrap();
        assert!(app.hardware.all_connected());
    }

    #[tokio::test]
    async fn handle_shutdown_cancels_the_token() {
        let app = Arc::new(AppConfig::default().open());
        let handle = app.start(true).await.unwrap();
        assert!(handle.is_running());

        let mut handle = handle;
        handle.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_running());
    }
}
