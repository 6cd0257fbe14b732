//! §3/§4.3: `HardwareAdapter` — a leaf object wrapping a physical channel —
//! and its sole concrete implementation, [`SerialAdapter`], generic over any
//! [`Channel`].
//!
//! The worker continuously polls the channel in the background and pushes
//! arrived bytes into the adapter's buffer (`append_bytes`, called "under
//! the adapter's lock" per §4.3); every public accessor here then just reads
//! or drains that buffer. Writes, opens, closes, resets and explicit
//! flush/clear requests are posted to the worker and run on the shared
//! hardware I/O runtime.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use labcore_error::{Error, Result};
use labcore_object::{Object, ObjectBase};
use parking_lot::Mutex;
use snafu::IntoError;

use crate::{
    channel::Channel,
    line_ending::LineEnding,
    worker::{AdapterCommand, Worker},
};

/// §4.3: "The serial adapter read buffer never exceeds 100 MiB" (§8).
pub const MAX_BUFFER_BYTES: usize = 100 * 1024 * 1024;

/// The abstract serial-communication contract (§4.3) every hardware adapter
/// exposes, independent of which concrete [`Channel`] backs it.
#[async_trait]
pub trait HardwareAdapter: Object {
    fn line_ending(&self) -> LineEnding;
    fn is_connected(&self) -> bool;

    /// Write a string; always appends the configured line terminator.
    fn write(&self, text: &str) -> Result<()>;

    /// Write just the configured line terminator.
    fn write_terminator(&self) -> Result<()>;

    /// Snapshot of the current buffer contents, without consuming it.
    fn read(&self) -> Result<Vec<u8>>;

    /// Pop the oldest complete line, or `""` if none is buffered yet.
    fn read_line(&self) -> Result<String>;

    /// Drain and return everything currently buffered.
    fn read_all(&self) -> Result<Vec<u8>>;

    /// Poll `read_line` up to `tries` times, sleeping `delay` between
    /// attempts; returns the last attempt's result (possibly `""`).
    async fn wait_for_line(&self, tries: u32, delay: Duration) -> Result<String>;

    /// Empty the read buffer and request the channel drop its own
    /// internal buffers.
    fn clear(&self) -> Result<()>;

    /// Flush the channel and drain once.
    fn flush(&self) -> Result<()>;

    /// Type-erased self, so a manager holding `Arc<dyn HardwareAdapter>` can
    /// still answer `Filter<T>()` (§4.6) by downcasting to a concrete
    /// adapter type.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A hardware adapter generic over any [`Channel`]. This is the one
/// concrete `HardwareAdapter` the core ships; vendor-specific channels are
/// the out-of-scope "device driver" half of the contract (§1).
pub struct SerialAdapter {
    base: ObjectBase,
    line_ending: LineEnding,
    buffer: Mutex<VecDeque<u8>>,
    connected: AtomicBool,
    pending_exception: Mutex<Option<Error>>,
    worker: Worker,
}

impl SerialAdapter {
    #[must_use]
    pub fn new(
        base: ObjectBase,
        line_ending: LineEnding,
        channel: Arc<dyn Channel>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            base,
            line_ending,
            buffer: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(false),
            pending_exception: Mutex::new(None),
            worker: Worker::spawn(channel, weak.clone()),
        })
    }

    pub(crate) fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Called by the worker from its polling loop, under the adapter's own
    /// buffer lock, whenever new bytes arrive from the channel.
    pub(crate) fn append_bytes(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut buffer = self.buffer.lock();
        if buffer.len() + bytes.len() > MAX_BUFFER_BYTES {
            self.base.set_warning(buffer_overflow_warning());
            return;
        }
        buffer.extend(bytes.iter().copied());
    }

    pub(crate) fn clear_buffer(&self) {
        self.buffer.lock().clear();
    }

    /// Called by the worker when a command fails; stored both as the
    /// object's persistent exception (state becomes `Error`) and as a
    /// one-shot pending slot the next adapter call observes and clears.
    pub(crate) fn store_pending_exception(&self, error: Error) {
        self.base.set_exception(error.clone());
        *self.pending_exception.lock() = Some(error);
    }

    fn take_pending_exception(&self) -> Option<Error> {
        self.pending_exception.lock().take()
    }

    fn check_pending(&self) -> Result<()> {
        match self.take_pending_exception() {
            Some(error) => Err(error.into_forwarded()),
            None => Ok(()),
        }
    }

    fn line_terminator_position(buffer: &VecDeque<u8>, terminator: &[u8]) -> Option<usize> {
        if terminator.is_empty() || buffer.len() < terminator.len() {
            return None;
        }
        (0..=buffer.len() - terminator.len())
            .find(|&start| buffer.iter().skip(start).take(terminator.len()).eq(terminator.iter()))
    }
}

fn buffer_overflow_warning() -> Error {
    labcore_error::OutOfRangeSnafu {
        message: format!("hardware adapter read buffer would exceed {MAX_BUFFER_BYTES} bytes"),
    }
    .into_error(snafu::NoneError)
}

#[async_trait]
impl Object for SerialAdapter {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    async fn on_ensure_ready(&self, _is_auto_startup: bool) -> Result<()> {
        self.worker.post(AdapterCommand::Open);
        Ok(())
    }

    async fn on_reset(&self) -> Result<()> {
        self.worker.post(AdapterCommand::Close);
        self.clear_buffer();
        self.set_connected(false);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_connected() && self.base().exception().is_none()
    }
}

#[async_trait]
impl HardwareAdapter for SerialAdapter {
    fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn write(&self, text: &str) -> Result<()> {
        self.check_pending()?;
        let mut bytes = text.as_bytes().to_vec();
        bytes.extend_from_slice(self.line_ending.bytes());
        self.worker.post(AdapterCommand::Write(bytes));
        Ok(())
    }

    fn write_terminator(&self) -> Result<()> {
        self.check_pending()?;
        self.worker.post(AdapterCommand::WriteTerminator);
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>> {
        self.check_pending()?;
        Ok(self.buffer.lock().iter().copied().collect())
    }

    fn read_line(&self) -> Result<String> {
        self.check_pending()?;
        let terminator = self.line_ending.bytes();
        let mut buffer = self.buffer.lock();
        let Some(pos) = Self::line_terminator_position(&buffer, terminator) else {
            return Ok(String::new());
        };
        let line_bytes: Vec<u8> = buffer.drain(..pos).collect();
        for _ in 0..terminator.len() {
            buffer.pop_front();
        }
        Ok(String::from_utf8_lossy(&line_bytes).into_owned())
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        self.check_pending()?;
        Ok(self.buffer.lock().drain(..).collect())
    }

    async fn wait_for_line(&self, tries: u32, delay: Duration) -> Result<String> {
        let mut last = String::new();
        for attempt in 0..tries.max(1) {
            last = self.read_line()?;
            if !last.is_empty() || attempt + 1 == tries {
                break;
            }
            tokio::time::sleep(delay).await;
        }
        Ok(last)
    }

    fn clear(&self) -> Result<()> {
        self.check_pending()?;
        self.clear_buffer();
        self.worker.post(AdapterCommand::Clear);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.check_pending()?;
        self.worker.post(AdapterCommand::Flush);
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::MockChannel;
    use labcore_object::{Category, ItemId};
    use std::sync::Arc;

    fn adapter(line_ending: LineEnding, channel: Arc<MockChannel>) -> Arc<SerialAdapter> {
        SerialAdapter::new(
            ObjectBase::new(ItemId::new(1), Category::HardwareAdapter, "SerialAdapter"),
            line_ending,
            channel,
        )
    }

    #[tokio::test]
    async fn line_assembly_across_partial_deliveries() {
        let channel = Arc::new(MockChannel::new());
        let adapter = adapter(LineEnding::Lf, channel.clone());

        channel.deliver(b"hel");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(adapter.read_line().unwrap(), "");

        channel.deliver(b"lo\nwo");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(adapter.read_line().unwrap(), "hello");
        assert_eq!(adapter.read_line().unwrap(), "");

        channel.deliver(b"rld\n");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(adapter.read_line().unwrap(), "world");
        assert_eq!(adapter.read_line().unwrap(), "");
    }

    #[tokio::test]
    async fn write_appends_configured_terminator() {
        let channel = Arc::new(MockChannel::new());
        let adapter = adapter(LineEnding::CrLf, channel.clone());
        adapter.write("hello").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(channel.written(), b"hello\r\n");
    }

    #[tokio::test]
    async fn read_all_drains_while_read_only_peeks() {
        let channel = Arc::new(MockChannel::new());
        let adapter = adapter(LineEnding::None, channel.clone());
        channel.deliver(b"abc");
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(adapter.read().unwrap(), b"abc");
        assert_eq!(adapter.read().unwrap(), b"abc");
        assert_eq!(adapter.read_all().unwrap(), b"abc");
        assert_eq!(adapter.read_all().unwrap(), b"");
    }

    #[tokio::test]
    async fn buffer_never_exceeds_cap() {
        let channel = Arc::new(MockChannel::new());
        let adapter = adapter(LineEnding::None, channel.clone());
        adapter.append_bytes(&vec![0u8; MAX_BUFFER_BYTES]);
        adapter.append_bytes(&[1, 2, 3]);
        assert_eq!(adapter.buffer.lock().len(), MAX_BUFFER_BYTES);
        assert!(adapter.get_warning().is_some());
    }
}
