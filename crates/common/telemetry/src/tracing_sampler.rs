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

//! # Trace Sampling
//!
//! Sampling configuration layered on top of OpenTelemetry's
//! `TraceIdRatioBased` sampler, so a noisy instrument worker loop can be
//! sampled down without losing module-level events entirely. Per-prefix
//! `rules` are consulted by callers that annotate spans with an explicit
//! `sampling.priority` attribute before the ratio sampler runs; the ratio
//! itself only needs `default_ratio` at the `Sampler` level.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// A `(span name prefix, ratio)` override entry.
///
/// Consulted by instrumentation call sites (e.g. the instrument worker
/// loop) to decide whether to open a span at all before the trace ever
/// reaches the OTel sampler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRule {
    pub prefix: String,
    pub ratio: f64,
}

/// Sampling configuration: a default ratio plus per-prefix overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
pub struct TracingSampleOptions {
    /// Fraction of traces kept when no rule matches, in `[0.0, 1.0]`.
    #[default = 1.0]
    pub default_ratio: f64,
    /// Ordered overrides; the first whose `prefix` matches the span name
    /// wins.
    pub rules: Vec<SampleRule>,
}

impl TracingSampleOptions {
    /// Ratio that applies to a span named `name`: the first matching rule's
    /// ratio, or `default_ratio`.
    #[must_use]
    pub fn ratio_for(&self, name: &str) -> f64 {
        self.rules
            .iter()
            .find(|rule| name.starts_with(rule.prefix.as_str()))
            .map_or(self.default_ratio, |rule| rule.ratio)
            .clamp(0.0, 1.0)
    }
}

/// Build the OTel sampler used for the OTLP exporter: `TraceIdRatioBased`
/// seeded with `options.default_ratio`. Per-prefix overrides act earlier, at
/// span-creation call sites via [`TracingSampleOptions::ratio_for`].
#[must_use]
pub fn create_sampler(options: &TracingSampleOptions) -> opentelemetry_sdk::trace::Sampler {
    opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(options.default_ratio.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_sample_everything() {
        let opts = TracingSampleOptions::default();
        assert_eq!(opts.default_ratio, 1.0);
        assert!(opts.rules.is_empty());
    }

    #[test]
    fn rule_prefix_overrides_default() {
        let opts = TracingSampleOptions {
            default_ratio: 1.0,
            rules: vec![SampleRule {
                prefix: "instrument.task".to_string(),
                ratio: 0.1,
            }],
        };
        assert_eq!(opts.ratio_for("instrument.task.run"), 0.1);
        assert_eq!(opts.ratio_for("module.event"), 1.0);
    }
}
