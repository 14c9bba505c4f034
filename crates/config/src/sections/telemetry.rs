// Copyright 2024 The Matrix.org Foundation C.I.C.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigurationSection;

/// Propagation format for incoming and outgoing requests
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Propagator {
    /// Propagate according to the W3C Trace Context specification
    TraceContext,

    /// Propagate according to the W3C Baggage specification
    Baggage,
}

fn default_propagators() -> Vec<Propagator> {
    vec![Propagator::TraceContext, Propagator::Baggage]
}

/// Exporter to use when exporting traces
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TracingExporterKind {
    /// Don't export traces
    #[default]
    None,

    /// Export traces to the standard output. Only useful for debugging
    Stdout,
}

/// Configuration related to exporting traces
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct TracingConfig {
    /// Exporter to use when exporting traces
    #[serde(default)]
    pub exporter: TracingExporterKind,

    /// List of propagation formats to use for incoming and outgoing requests
    #[serde(default = "default_propagators")]
    pub propagators: Vec<Propagator>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            exporter: TracingExporterKind::default(),
            propagators: default_propagators(),
        }
    }
}

/// Configuration related to sending monitoring data
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct TelemetryConfig {
    /// Configuration related to exporting traces
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl ConfigurationSection for TelemetryConfig {
    const PATH: Option<&'static str> = Some("telemetry");

    fn validate(&self, _figment: &figment::Figment) -> Result<(), figment::error::Error> {
        if self.tracing.propagators.is_empty() {
            return Err(
                figment::error::Error::from("at least one propagator must be configured")
                    .with_path("tracing.propagators"),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        providers::{Format, Yaml},
        Figment, Jail,
    };

    use super::*;

    #[test]
    fn load_stdout_exporter() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
telemetry:
  tracing:
    exporter: stdout
    propagators:
      - tracecontext
",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = TelemetryConfig::extract(&figment)?;

            assert_eq!(config.tracing.exporter, TracingExporterKind::Stdout);
            assert_eq!(config.tracing.propagators, vec![Propagator::TraceContext]);

            Ok(())
        });
    }

    #[test]
    fn default_propagators_when_omitted() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "telemetry:\n  tracing: {}\n")?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = TelemetryConfig::extract(&figment)?;

            assert_eq!(config.tracing.exporter, TracingExporterKind::None);
            assert_eq!(
                config.tracing.propagators,
                vec![Propagator::TraceContext, Propagator::Baggage]
            );

            Ok(())
        });
    }

    #[test]
    fn reject_empty_propagators() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
telemetry:
  tracing:
    propagators: []
",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            assert!(TelemetryConfig::extract(&figment).is_err());

            Ok(())
        });
    }
}
