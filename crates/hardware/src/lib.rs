//! Hardware adapters: the abstract serial-communication contract, its
//! bounded read buffer, and the async adapter/worker I/O protocol (§4.3).

mod adapter;
mod channel;
mod configurator;
mod line_ending;
mod worker;

pub use adapter::{HardwareAdapter, SerialAdapter, MAX_BUFFER_BYTES};
pub use channel::Channel;
#[cfg(any(test, feature = "test-util"))]
pub use channel::mock::MockChannel;
pub use configurator::SerialAdapterConfigurator;
pub use line_ending::LineEnding;
