//! §6: "The core itself has none [CLI surface]; it is embedded. The
//! embedding program accepts a single optional argument: a project file
//! path to auto-open and auto-run." This binary is that embedding program,
//! wired against empty libraries — it owns no concrete hardware adapters,
//! instruments or modules of its own (those are out of scope), so a project
//! file naming any will fail to resolve. What it demonstrates is the
//! lifecycle: telemetry init, optional auto-open, startup, run until
//! Ctrl+C/SIGTERM, graceful shutdown.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use labcore_app::AppConfig;
use labcore_telemetry::{logging::init_tracing_subscriber, panic_hook::set_panic_hook};

#[derive(Debug, Parser)]
#[command(name = "labcore", version, about = "LabCore measurement-platform runtime core")]
struct Cli {
    /// Project file path to auto-open and auto-run.
    project: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), labcore_error::Error> {
    let _guards = init_tracing_subscriber("labcore");
    set_panic_hook();

    let cli = Cli::parse();
    let app = Arc::new(AppConfig::default().open());
    app.run(cli.project.as_deref()).await
}
