//! The abstract serial-communication contract (§1/§4.3): the only interface
//! a concrete device driver (serial port, TCP socket, vendor SDK — all
//! explicitly out of scope, §1) needs to implement to plug into
//! [`crate::SerialAdapter`].
//!
//! Everything above this trait — line assembly, the 100 MiB buffer cap, the
//! async adapter/worker protocol — is implemented once in this crate and
//! shared by every concrete channel.

use async_trait::async_trait;
use labcore_error::Result;

#[async_trait]
pub trait Channel: Send + Sync {
    /// Establish the underlying connection. Idempotent.
    async fn open(&self) -> Result<()>;

    /// Tear the connection down. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Write raw bytes to the channel.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Drain and return whatever bytes are currently available. Returns an
    /// empty `Vec` (not an error) if nothing is available yet.
    async fn read(&self) -> Result<Vec<u8>>;

    /// Flush any internally buffered writes.
    async fn flush(&self) -> Result<()>;

    /// Drop the channel's own internal buffers (distinct from the
    /// adapter-side read buffer, which the adapter clears itself).
    async fn clear(&self) -> Result<()>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! An in-memory [`Channel`] used by this crate's own tests and by
    //! downstream crates exercising the adapter/worker protocol without a
    //! real device.

    use std::sync::Mutex;

    use super::Channel;
    use async_trait::async_trait;
    use labcore_error::Result;

    #[derive(Default)]
    pub struct MockChannel {
        inbox: Mutex<Vec<u8>>,
        written: Mutex<Vec<u8>>,
    }

    impl MockChannel {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Test hook: make `bytes` available to the next `read()`.
        pub fn deliver(&self, bytes: &[u8]) {
            self.inbox.lock().unwrap().extend_from_slice(bytes);
        }

        #[must_use]
        pub fn written(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        async fn open(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        async fn write(&self, bytes: &[u8]) -> Result<()> {
            self.written.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }

        async fn read(&self) -> Result<Vec<u8>> {
            Ok(std::mem::take(&mut *self.inbox.lock().unwrap()))
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            self.inbox.lock().unwrap().clear();
            Ok(())
        }
    }
}
