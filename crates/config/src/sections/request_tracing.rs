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

fn header_example() -> Vec<&'static str> {
    vec!["X-Request-Id", "Content-Type"]
}

fn untraced_endpoints_example() -> Vec<&'static str> {
    vec!["/health", "/metrics"]
}

/// Built-in strategy used to reduce the cardinality of span names
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UrlQuantizationConfig {
    /// Use the request URI verbatim
    #[default]
    None,

    /// Drop the query string entirely
    StripQuery,

    /// Keep the query parameter names, drop their values
    RedactQueryValues,
}

/// Configuration of the request tracing layer
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RequestTracingConfig {
    /// Request headers which should be recorded on the request span, as
    /// `http.request.headers.<name>` attributes
    #[schemars(example = "header_example")]
    #[serde(default)]
    pub allowed_request_headers: Vec<String>,

    /// Response headers which should be recorded on the request span, as
    /// `http.response.headers.<name>` attributes
    #[schemars(example = "header_example")]
    #[serde(default)]
    pub allowed_response_headers: Vec<String>,

    /// Exact request paths which should never be traced
    #[schemars(example = "untraced_endpoints_example")]
    #[serde(default)]
    pub untraced_endpoints: Vec<String>,

    /// Record a `http_server.proxy` span covering the time spent in a reverse
    /// proxy before the request reached the application. Requires the proxy to
    /// set a `X-Request-Start` or `X-Queue-Start` header.
    #[serde(default)]
    pub record_frontend_span: bool,

    /// How span names are derived from the request URI
    #[serde(default)]
    pub url_quantization: UrlQuantizationConfig,
}

impl ConfigurationSection for RequestTracingConfig {
    const PATH: Option<&'static str> = Some("request_tracing");

    fn validate(&self, _figment: &figment::Figment) -> Result<(), figment::error::Error> {
        if let Some(endpoint) = self
            .untraced_endpoints
            .iter()
            .find(|endpoint| !endpoint.starts_with('/'))
        {
            return Err(figment::error::Error::from(format!(
                "untraced endpoint {endpoint:?} must be an absolute path starting with '/'"
            ))
            .with_path("untraced_endpoints"));
        }

        Ok(())
    }
}
