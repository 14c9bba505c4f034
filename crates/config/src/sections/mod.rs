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

mod request_tracing;
mod telemetry;

pub use self::{
    request_tracing::{RequestTracingConfig, UrlQuantizationConfig},
    telemetry::{Propagator, TelemetryConfig, TracingConfig, TracingExporterKind},
};
use crate::util::{validate_section, ConfigurationSection};

/// Application configuration root
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RootConfig {
    /// Configuration of the request tracing layer
    #[serde(default)]
    pub request_tracing: RequestTracingConfig,

    /// Configuration related to sending monitoring data
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ConfigurationSection for RootConfig {
    fn validate(&self, figment: &figment::Figment) -> Result<(), figment::error::Error> {
        validate_section(&self.request_tracing, figment)?;
        validate_section(&self.telemetry, figment)?;

        Ok(())
    }
}
