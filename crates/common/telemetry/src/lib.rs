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

//! # Telemetry
//!
//! Structured logging, trace sampling, panic handling, runnable-lifecycle
//! metrics and the process-wide event log for LabCore.
//!
//! - [`logging`]: configurable `tracing-subscriber` setup — stdout/file/JSON
//!   layers, OTLP export, runtime-reloadable level filter.
//! - [`tracing_sampler`]: trace sampling ratios, plain and per-span-prefix.
//! - [`panic_hook`]: structured panic logging plus optional deadlock
//!   detection (the natural place to surface a `RecursiveLock` that never
//!   unlocks).
//! - [`metrics`]: Prometheus counters/gauges for instrument/module worker
//!   lifecycle, labeled by `(category, name, id)`.
//! - [`event_log`]: a `tracing_subscriber::Layer` that mirrors
//!   warning/error events into a bounded in-memory ring buffer an embedding
//!   UI can poll.
//!
//! ## Quick start
//!
//! ```rust
//! use labcore_telemetry::{logging::init_tracing_subscriber, panic_hook::set_panic_hook};
//!
//! let _guards = init_tracing_subscriber("labcore");
//! set_panic_hook();
//! tracing::info!("runtime started");
//! ```

pub mod event_log;
pub mod logging;
pub mod metrics;
pub mod panic_hook;
pub mod tracing_sampler;
