//! The async adapter/worker protocol (§4.3): the adapter posts commands,
//! the worker drives the abstract [`Channel`] on the shared hardware I/O
//! runtime (`labcore_runtime::spawn_hardware_io` — "it is the only thread
//! that calls into the underlying channel API"), and calls back into the
//! adapter to append bytes / store a pending exception under the adapter's
//! own lock.
//!
//! Reads are not request/response: the worker polls the channel in a
//! background loop and pushes whatever arrives straight into the adapter's
//! buffer, mirroring a real serial port continuously streaming incoming
//! bytes. `Read`/`ReadLine`/`ReadAll` on [`crate::SerialAdapter`] are then
//! synchronous views over that buffer.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::{adapter::SerialAdapter, channel::Channel};

/// How often the worker polls the channel for newly arrived bytes.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// One command the adapter posts to its worker.
pub(crate) enum AdapterCommand {
    Open,
    Close,
    Clear,
    Flush,
    Write(Vec<u8>),
    WriteTerminator,
}

/// Handle the adapter holds to its worker.
pub(crate) struct Worker {
    commands: mpsc::UnboundedSender<AdapterCommand>,
}

impl Worker {
    pub(crate) fn spawn(channel: Arc<dyn Channel>, adapter: Weak<SerialAdapter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        labcore_runtime::spawn_hardware_io(run(channel, rx, adapter));
        Self { commands: tx }
    }

    pub(crate) fn post(&self, command: AdapterCommand) {
        // The loop exits once the adapter (and every sender) is dropped; a
        // send failure here means the adapter is already gone, which the
        // caller doesn't need to react to.
        let _ = self.commands.send(command);
    }
}

async fn run(
    channel: Arc<dyn Channel>,
    mut commands: mpsc::UnboundedReceiver<AdapterCommand>,
    adapter: Weak<SerialAdapter>,
) {
    loop {
        tokio::select! {
            received = commands.recv() => {
                let Some(command) = received else { break };
                let Some(adapter) = adapter.upgrade() else { break };
                if let Err(error) = dispatch(&channel, &adapter, command).await {
                    tracing::error!(error = %error, "hardware adapter worker command failed");
                    adapter.store_pending_exception(error);
                }
            }
            () = tokio::time::sleep(POLL_INTERVAL) => {
                let Some(adapter) = adapter.upgrade() else { break };
                match channel.read().await {
                    Ok(bytes) => adapter.append_bytes(&bytes),
                    Err(error) => {
                        tracing::error!(error = %error, "hardware adapter poll read failed");
                        adapter.store_pending_exception(error);
                    }
                }
            }
        }
    }
}

async fn dispatch(
    channel: &Arc<dyn Channel>,
    adapter: &Arc<SerialAdapter>,
    command: AdapterCommand,
) -> labcore_error::Result<()> {
    match command {
        AdapterCommand::Open => {
            channel.open().await?;
            adapter.set_connected(true);
        }
        AdapterCommand::Close => {
            channel.close().await?;
            adapter.set_connected(false);
        }
        AdapterCommand::Clear => {
            channel.clear().await?;
        }
        AdapterCommand::Flush => {
            channel.flush().await?;
            let bytes = channel.read().await?;
            adapter.append_bytes(&bytes);
        }
        AdapterCommand::Write(bytes) => {
            channel.write(&bytes).await?;
        }
        AdapterCommand::WriteTerminator => {
            channel.write(adapter.line_ending().bytes()).await?;
        }
    }
    Ok(())
}
