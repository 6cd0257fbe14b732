//! Typed exception hierarchy for the LabCore object/runtime substrate.
//!
//! Every error a worker thread, task, or event can raise is one variant of
//! [`Error`]. Each variant carries a stable numeric code, a [`Severity`], and
//! an implicit [`snafu::Location`] capturing where it was raised — mirroring
//! how the platform's instruments and modules report faults to the
//! embedding UI (state becomes `Error`, `GetException()` returns the value).

use std::sync::Arc;

use serde::Serialize;
use snafu::Snafu;
use strum::EnumProperty;

/// Severity of a process-wide event-log entry (see the external error
/// reporting sink). Distinct from [`Error`]'s per-variant numeric code:
/// severity says how loudly to surface the condition, the code says what it
/// was.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, strum_macros::Display, strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

/// The full exception hierarchy. Programmer/configuration errors are thrown
/// synchronously; `Timeout` is usually converted to a warning and retried;
/// `Serial`/`Network` become an object's stored exception; the
/// `LinkedObject*` pair is always fatal to the runnable that raised it;
/// `Forwarded` transports an exception captured on one thread to an
/// observer on another, preserving the inner variant's code/severity/origin.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid argument: {message}"))]
    InvalidArg {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("value out of range: {message}"))]
    OutOfRange {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("type error: {message}"))]
    TypeError {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("invalid data: {message}"))]
    InvalidData {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("invalid state: {message}"))]
    InvalidState {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("not found: {message}"))]
    NotFound {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("not implemented: {message}"))]
    NotImplemented {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("empty: {message}"))]
    Empty {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("timed out after {duration_ms}ms: {message}"))]
    Timeout {
        message: String,
        duration_ms: u64,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("serial I/O error: {message}"))]
    Serial {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("network error: {message}"))]
    Network {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("linked object could not be locked: {message}"))]
    LinkedObjectNotLocked {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("invalid object link: {message}"))]
    InvalidObjectLink {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("overflow: {message}"))]
    Overflow {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("internal core invariant violated: {message}"))]
    InternalCore {
        message: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    /// Transports an exception captured on one thread for rethrow on
    /// another. `severity()`/`code()` delegate to the wrapped error so a
    /// `Forwarded(Timeout)` still reads as a `Timeout` to callers.
    #[snafu(display("{source}"))]
    Forwarded {
        source: Arc<Error>,
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum_macros::EnumProperty)]
enum ErrorKindTag {
    #[strum(props(code = "1", severity = "error"))]
    InvalidArg,
    #[strum(props(code = "2", severity = "error"))]
    OutOfRange,
    #[strum(props(code = "3", severity = "error"))]
    TypeError,
    #[strum(props(code = "4", severity = "error"))]
    InvalidData,
    #[strum(props(code = "5", severity = "error"))]
    InvalidState,
    #[strum(props(code = "6", severity = "error"))]
    NotFound,
    #[strum(props(code = "7", severity = "error"))]
    NotImplemented,
    #[strum(props(code = "8", severity = "error"))]
    Empty,
    #[strum(props(code = "9", severity = "warning"))]
    Timeout,
    #[strum(props(code = "10", severity = "error"))]
    Serial,
    #[strum(props(code = "11", severity = "error"))]
    Network,
    #[strum(props(code = "12", severity = "fatal"))]
    LinkedObjectNotLocked,
    #[strum(props(code = "13", severity = "fatal"))]
    InvalidObjectLink,
    #[strum(props(code = "14", severity = "fatal"))]
    Overflow,
    #[strum(props(code = "15", severity = "fatal"))]
    InternalCore,
    #[strum(props(code = "16", severity = "error"))]
    Forwarded,
}

impl Error {
    /// Numeric error code, stable across releases, used by the event-log
    /// sink and by `ConfigFromXML`'s "unknown contents" diagnostics.
    #[must_use]
    pub fn code(&self) -> u32 {
        if let Error::Forwarded { source, .. } = self {
            return source.code();
        }
        self.kind_tag()
            .get_str("code")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Severity as reported to the process-wide event log (§6). `Forwarded`
    /// delegates to its wrapped error so severity is never "laundered" by
    /// crossing a thread boundary.
    #[must_use]
    pub fn severity(&self) -> Severity {
        if let Error::Forwarded { source, .. } = self {
            return source.severity();
        }
        match self
            .kind_tag()
            .get_str("severity")
            .unwrap_or("error")
        {
            "info" => Severity::Info,
            "warning" => Severity::Warning,
            "fatal" => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Wraps `self` so it can be moved across a thread boundary and
    /// rethrown by an observer while preserving origin, code, and
    /// severity (§7 "Forwarded").
    #[must_use]
    pub fn into_forwarded(self) -> Error {
        Error::Forwarded {
            source: Arc::new(self),
            loc: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    fn kind_tag(&self) -> ErrorKindTag {
        match self {
            Error::InvalidArg { .. } => ErrorKindTag::InvalidArg,
            Error::OutOfRange { .. } => ErrorKindTag::OutOfRange,
            Error::TypeError { .. } => ErrorKindTag::TypeError,
            Error::InvalidData { .. } => ErrorKindTag::InvalidData,
            Error::InvalidState { .. } => ErrorKindTag::InvalidState,
            Error::NotFound { .. } => ErrorKindTag::NotFound,
            Error::NotImplemented { .. } => ErrorKindTag::NotImplemented,
            Error::Empty { .. } => ErrorKindTag::Empty,
            Error::Timeout { .. } => ErrorKindTag::Timeout,
            Error::Serial { .. } => ErrorKindTag::Serial,
            Error::Network { .. } => ErrorKindTag::Network,
            Error::LinkedObjectNotLocked { .. } => ErrorKindTag::LinkedObjectNotLocked,
            Error::InvalidObjectLink { .. } => ErrorKindTag::InvalidObjectLink,
            Error::Overflow { .. } => ErrorKindTag::Overflow,
            Error::InternalCore { .. } => ErrorKindTag::InternalCore,
            Error::Forwarded { .. } => ErrorKindTag::Forwarded,
        }
    }

    /// Source location the error was raised at, for event-log entries.
    #[must_use]
    pub fn location(&self) -> snafu::Location {
        match self {
            Error::InvalidArg { loc, .. }
            | Error::OutOfRange { loc, .. }
            | Error::TypeError { loc, .. }
            | Error::InvalidData { loc, .. }
            | Error::InvalidState { loc, .. }
            | Error::NotFound { loc, .. }
            | Error::NotImplemented { loc, .. }
            | Error::Empty { loc, .. }
            | Error::Timeout { loc, .. }
            | Error::Serial { loc, .. }
            | Error::Network { loc, .. }
            | Error::LinkedObjectNotLocked { loc, .. }
            | Error::InvalidObjectLink { loc, .. }
            | Error::Overflow { loc, .. }
            | Error::InternalCore { loc, .. }
            | Error::Forwarded { loc, .. } => *loc,
        }
    }
}

/// A fatal-to-the-object condition an [`Error`] has been promoted to and
/// stored as an object's latest exception. Carries no extra data beyond the
/// error itself; the wrapper exists so `Object::GetException` call sites
/// read naturally (`Option<ExceptionContainer>` rather than `Option<Error>`).
#[derive(Debug, Clone)]
pub struct ExceptionContainer(Option<Arc<Error>>);

impl ExceptionContainer {
    #[must_use]
    pub fn empty() -> Self {
        ExceptionContainer(None)
    }

    #[must_use]
    pub fn from_error(error: Error) -> Self {
        ExceptionContainer(Some(Arc::new(error)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    #[must_use]
    pub fn as_error(&self) -> Option<&Error> {
        self.0.as_deref()
    }

    /// Rethrows the wrapped error, if any, cloning the `Arc` so the
    /// container remains usable (the same exception may be observed by
    /// several callers).
    pub fn rethrow(&self) -> Result<()> {
        match &self.0 {
            Some(err) => Err(Error::Forwarded {
                source: err.clone(),
                loc: snafu::Location::new(file!(), line!(), column!()),
            }),
            None => Ok(()),
        }
    }
}

impl Default for ExceptionContainer {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_a_warning() {
        let err = Error::Timeout {
            message: "lock".into(),
            duration_ms: 10,
            loc: snafu::Location::new(file!(), line!(), column!()),
        };
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(err.code(), 9);
    }

    #[test]
    fn forwarded_preserves_inner_severity_and_code() {
        let inner = Error::InternalCore {
            message: "invariant".into(),
            loc: snafu::Location::new(file!(), line!(), column!()),
        };
        let code = inner.code();
        let forwarded = inner.into_forwarded();
        assert_eq!(forwarded.severity(), Severity::Fatal);
        assert_eq!(forwarded.code(), code);
    }

    #[test]
    fn exception_container_round_trips_empty_and_full() {
        let empty = ExceptionContainer::empty();
        assert!(empty.is_empty());
        assert!(empty.rethrow().is_ok());

        let full = ExceptionContainer::from_error(Error::NotFound {
            message: "object 42".into(),
            loc: snafu::Location::new(file!(), line!(), column!()),
        });
        assert!(!full.is_empty());
        assert!(full.rethrow().is_err());
    }
}
