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

use std::{fmt, sync::Arc};

use reqtrace_config::RequestTracingConfig;

use crate::{
    classify::RequestFilter,
    enrich::{HttpStatusMapper, StatusMapper},
    quantize::{self, UrlQuantizer},
    queue_time::{QueueTimeHeaders, RequestStart},
};

/// Runtime options of the request tracing layer.
///
/// This holds the same data as [`RequestTracingConfig`], plus the strategies
/// which can only be provided in code.
#[derive(Clone)]
pub struct Settings {
    /// Request headers recorded as `http.request.headers.<name>`
    pub allowed_request_headers: Vec<String>,

    /// Response headers recorded as `http.response.headers.<name>`
    pub allowed_response_headers: Vec<String>,

    /// Exact request paths which are never traced
    pub untraced_endpoints: Vec<String>,

    /// Record a `http_server.proxy` span from the queue time headers
    pub record_frontend_span: bool,

    /// Requests for which this returns `true` are not traced
    pub filtered_requests: Option<Arc<dyn RequestFilter>>,

    /// Maps the request URI to the span name
    pub url_quantization: Option<Arc<dyn UrlQuantizer>>,

    pub status_mapper: Arc<dyn StatusMapper>,

    pub request_start: Arc<dyn RequestStart>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allowed_request_headers: Vec::new(),
            allowed_response_headers: Vec::new(),
            untraced_endpoints: Vec::new(),
            record_frontend_span: false,
            filtered_requests: None,
            url_quantization: None,
            status_mapper: Arc::new(HttpStatusMapper),
            request_start: Arc::new(QueueTimeHeaders),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("allowed_request_headers", &self.allowed_request_headers)
            .field("allowed_response_headers", &self.allowed_response_headers)
            .field("untraced_endpoints", &self.untraced_endpoints)
            .field("record_frontend_span", &self.record_frontend_span)
            .field("filtered_requests", &self.filtered_requests.is_some())
            .field("url_quantization", &self.url_quantization.is_some())
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Build the settings from the configuration file section
    #[must_use]
    pub fn from_config(config: &RequestTracingConfig) -> Self {
        Self {
            allowed_request_headers: config.allowed_request_headers.clone(),
            allowed_response_headers: config.allowed_response_headers.clone(),
            untraced_endpoints: config.untraced_endpoints.clone(),
            record_frontend_span: config.record_frontend_span,
            url_quantization: quantize::from_config(config.url_quantization),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_allowed_request_headers<I>(mut self, headers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_request_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_allowed_response_headers<I>(mut self, headers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_response_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_untraced_endpoints<I>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.untraced_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_frontend_span(mut self, record_frontend_span: bool) -> Self {
        self.record_frontend_span = record_frontend_span;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl RequestFilter + 'static) -> Self {
        self.filtered_requests = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn with_url_quantizer(mut self, quantizer: impl UrlQuantizer + 'static) -> Self {
        self.url_quantization = Some(Arc::new(quantizer));
        self
    }

    #[must_use]
    pub fn with_status_mapper(mut self, status_mapper: impl StatusMapper + 'static) -> Self {
        self.status_mapper = Arc::new(status_mapper);
        self
    }

    #[must_use]
    pub fn with_request_start(mut self, request_start: impl RequestStart + 'static) -> Self {
        self.request_start = Arc::new(request_start);
        self
    }
}
