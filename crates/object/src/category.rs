//! The three leaf categories objects are classified into (§2/§4.6): one
//! resource manager per category.

use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
    strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "PascalCase")]
pub enum Category {
    HardwareAdapter,
    Instrument,
    Module,
}

/// Observer-facing object state (§6: "state (Ready / Running / Paused /
/// Warning / Error / NotConnected / NotResponding)"). Computed on demand by
/// whoever polls `IsReady`/`GetException`/`GetWarning`/`IsRunning`/
/// `IsPaused` under a short timeout; `NotResponding` is what the UI reports
/// when that poll itself times out (§6), so it's never produced by the
/// object itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum ObjectState {
    Ready,
    Running,
    Paused,
    Warning,
    Error,
    NotConnected,
    NotResponding,
}
