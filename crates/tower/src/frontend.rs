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

//! The span covering the time a request spent in a reverse proxy before
//! reaching the application

use std::{fmt, sync::Arc};

use opentelemetry::{
    trace::{SpanBuilder, SpanKind, TraceContextExt, Tracer},
    Context, KeyValue,
};

use crate::{
    attributes::START_TIME,
    queue_time::{as_unix_seconds, RequestStart},
    request::RequestEnv,
};

pub const FRONTEND_SPAN_NAME: &str = "http_server.proxy";

#[derive(Clone)]
pub struct FrontendSpanBuilder {
    enabled: bool,
    request_start: Arc<dyn RequestStart>,
}

impl fmt::Debug for FrontendSpanBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontendSpanBuilder")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl FrontendSpanBuilder {
    #[must_use]
    pub fn new(enabled: bool, request_start: Arc<dyn RequestStart>) -> Self {
        Self {
            enabled,
            request_start,
        }
    }

    /// Start the frontend span if enabled and the request carries a valid
    /// queue time header.
    ///
    /// The span is a child of the extracted context, and starts at the time
    /// the proxy received the request.
    pub fn maybe_build<T>(
        &self,
        tracer: &T,
        request: &RequestEnv<'_>,
        extracted: &Context,
    ) -> Option<FrontendSpan>
    where
        T: Tracer,
        T::Span: Send + Sync + 'static,
    {
        if !self.enabled {
            return None;
        }

        let start = self.request_start.request_start(request)?;

        let span = SpanBuilder::from_name(FRONTEND_SPAN_NAME)
            .with_kind(SpanKind::Server)
            .with_start_time(start)
            .with_attributes([KeyValue::new(START_TIME, as_unix_seconds(start))])
            .start_with_context(tracer, extracted);

        Some(FrontendSpan {
            cx: extracted.with_span(span),
        })
    }
}

/// The frontend span, ended when this is dropped
#[must_use]
#[derive(Debug)]
pub struct FrontendSpan {
    cx: Context,
}

impl FrontendSpan {
    /// The context in which the frontend span is active, to be used as the
    /// parent of the request span
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.cx
    }
}

impl Drop for FrontendSpan {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}
