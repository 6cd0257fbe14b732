// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Process-Wide Event Log
//!
//! §6 calls for a process-wide log of `Info`/`Warning`/`Error`/`Fatal`
//! entries with timestamp, message and optional source location, for an
//! embedding UI to poll. [`EventLogLayer`] is a `tracing_subscriber::Layer`
//! that appends every event at `WARN` or above into a bounded in-memory ring
//! buffer; [`recent`] drains a snapshot for polling.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use labcore_error::Severity;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;

/// One entry in the process-wide event log.
#[derive(Clone, Debug, PartialEq)]
pub struct EventLogEntry {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    pub severity: Severity,
    pub message: String,
    pub target: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

const DEFAULT_CAPACITY: usize = 1000;

struct Ring {
    capacity: usize,
    entries: VecDeque<EventLogEntry>,
}

static RING: Mutex<Option<Ring>> = Mutex::new(None);

fn ring_capacity() -> usize {
    RING.lock()
        .unwrap()
        .as_ref()
        .map_or(DEFAULT_CAPACITY, |r| r.capacity)
}

/// Set the ring buffer's capacity, replacing any existing entries. Call
/// before installing [`EventLogLayer`] if the default of 1000 entries
/// doesn't fit the embedding UI's needs.
pub fn set_capacity(capacity: usize) {
    let mut guard = RING.lock().unwrap();
    *guard = Some(Ring {
        capacity,
        entries: VecDeque::with_capacity(capacity),
    });
}

fn push(entry: EventLogEntry) {
    let mut guard = RING.lock().unwrap();
    let ring = guard.get_or_insert_with(|| Ring {
        capacity: DEFAULT_CAPACITY,
        entries: VecDeque::with_capacity(DEFAULT_CAPACITY),
    });
    if ring.entries.len() >= ring.capacity.max(1) {
        ring.entries.pop_front();
    }
    ring.entries.push_back(entry);
}

/// Snapshot of the `n` most recent entries, oldest first.
#[must_use]
pub fn recent(n: usize) -> Vec<EventLogEntry> {
    let guard = RING.lock().unwrap();
    let Some(ring) = guard.as_ref() else {
        return Vec::new();
    };
    let skip = ring.entries.len().saturating_sub(n);
    ring.entries.iter().skip(skip).cloned().collect()
}

/// Clears every entry currently in the ring buffer.
pub fn clear() {
    let mut guard = RING.lock().unwrap();
    if let Some(ring) = guard.as_mut() {
        ring.entries.clear();
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

fn severity_of(level: &tracing::Level) -> Option<Severity> {
    match *level {
        tracing::Level::ERROR => Some(Severity::Error),
        tracing::Level::WARN => Some(Severity::Warning),
        _ => None,
    }
}

/// A `tracing_subscriber::Layer` that mirrors `WARN`/`ERROR` events into the
/// process-wide event log ring buffer.
pub struct EventLogLayer {
    _private: (),
}

impl EventLogLayer {
    #[must_use]
    pub fn new() -> Self {
        let _ = ring_capacity();
        Self { _private: () }
    }
}

impl Default for EventLogLayer {
    fn default() -> Self { Self::new() }
}

impl<S> tracing_subscriber::Layer<S> for EventLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let Some(severity) = severity_of(event.metadata().level()) else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        push(EventLogEntry {
            timestamp_ms,
            severity,
            message: visitor.message.unwrap_or_default(),
            target: event.metadata().target().to_string(),
            file: event.metadata().file().map(str::to_owned),
            line: event.metadata().line(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_caps_at_capacity() {
        set_capacity(2);
        push(EventLogEntry {
            timestamp_ms: 1,
            severity: Severity::Warning,
            message: "first".to_string(),
            target: "t".to_string(),
            file: None,
            line: None,
        });
        push(EventLogEntry {
            timestamp_ms: 2,
            severity: Severity::Warning,
            message: "second".to_string(),
            target: "t".to_string(),
            file: None,
            line: None,
        });
        push(EventLogEntry {
            timestamp_ms: 3,
            severity: Severity::Error,
            message: "third".to_string(),
            target: "t".to_string(),
            file: None,
            line: None,
        });

        let snapshot = recent(10);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].message, "second");
        assert_eq!(snapshot[1].message, "third");
        clear();
    }
}
