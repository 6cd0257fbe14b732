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

//! # Runnable Lifecycle Metrics
//!
//! Prometheus counters/gauges for instrument and module worker threads,
//! labeled by `(category, name, id)` so a dashboard can break lifecycle
//! counts down per object rather than per process.

use lazy_static::lazy_static;
use prometheus::*;

pub const RUNNABLE_LABELS: &[&str] = &["category", "name", "id"];

lazy_static! {
    pub static ref RUNNABLE_STARTED: IntCounterVec = register_int_counter_vec!(
        "labcore_runnable_started_total",
        "Total number of runnable worker threads started",
        RUNNABLE_LABELS
    )
    .unwrap();
    pub static ref RUNNABLE_STOPPED: IntCounterVec = register_int_counter_vec!(
        "labcore_runnable_stopped_total",
        "Total number of runnable worker threads stopped gracefully",
        RUNNABLE_LABELS
    )
    .unwrap();
    pub static ref RUNNABLE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "labcore_runnable_errors_total",
        "Total number of unhandled exceptions surfaced by a runnable worker",
        RUNNABLE_LABELS
    )
    .unwrap();
    pub static ref RUNNABLE_TASKS_EXECUTED: IntCounterVec = register_int_counter_vec!(
        "labcore_runnable_tasks_executed_total",
        "Total number of tasks/events executed to completion",
        RUNNABLE_LABELS
    )
    .unwrap();
    pub static ref RUNNABLE_TASKS_FAILED: IntCounterVec = register_int_counter_vec!(
        "labcore_runnable_tasks_failed_total",
        "Total number of tasks/events that ended in Failed or Aborted",
        RUNNABLE_LABELS
    )
    .unwrap();
    pub static ref RUNNABLE_PAUSED: IntCounterVec = register_int_counter_vec!(
        "labcore_runnable_paused_total",
        "Total number of times a module paused waiting on a linked object",
        RUNNABLE_LABELS
    )
    .unwrap();
    pub static ref RUNNABLE_RESUMED: IntCounterVec = register_int_counter_vec!(
        "labcore_runnable_resumed_total",
        "Total number of times a paused module resumed",
        RUNNABLE_LABELS
    )
    .unwrap();
    pub static ref RUNNABLE_ACTIVE: IntGaugeVec = register_int_gauge_vec!(
        "labcore_runnable_active",
        "Whether the runnable's worker thread is currently running (1) or not (0)",
        RUNNABLE_LABELS
    )
    .unwrap();
    pub static ref RUNNABLE_TASK_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "labcore_runnable_task_duration_seconds",
        "Task/event execution duration in seconds",
        RUNNABLE_LABELS
    )
    .unwrap();
}
