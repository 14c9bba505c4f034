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

//! A [`tower`] layer recording an OpenTelemetry span for every inbound HTTP
//! request.
//!
//! The layer extracts the remote trace context from the request headers,
//! optionally records a `http_server.proxy` span covering the time spent in a
//! reverse proxy, and runs the inner service with the request span as the
//! current context. Once the response is ready the span is enriched with the
//! status and the allow-listed response headers, then ended.

#![allow(clippy::module_name_repetitions)]

pub mod attributes;
mod classify;
mod enrich;
mod frontend;
mod future;
mod headers;
mod layer;
mod make_span;
mod propagation;
pub mod quantize;
mod queue_time;
mod request;
mod service;
mod settings;
mod utils;

pub use self::{
    classify::{filter_fn, is_untraced, RequestClassifier, RequestFilter, Untraced},
    enrich::{
        on_error_fn, DefaultOnError, HttpStatusMapper, OnError, OnHttpResponse, OnResponse,
        StatusMapper,
    },
    frontend::{FrontendSpan, FrontendSpanBuilder, FRONTEND_SPAN_NAME},
    future::RequestTracingFuture,
    headers::{HeaderMatcher, RequestHeaderTable, ResponseHeaderTable},
    layer::RequestTracingLayer,
    make_span::MakeRequestSpan,
    propagation::{
        with_current, DefaultExtractContext, ExtractContext, ExtractFromHttpRequest,
        ExtractWithPropagator, RequestSpanContext,
    },
    quantize::{quantize_fn, RedactQueryValues, StripQueryString, UrlQuantizer},
    queue_time::{QueueTimeHeaders, RequestStart},
    request::{RequestEnv, RequestUri, ScriptName},
    service::RequestTracing,
    settings::Settings,
    utils::FnWrapper,
};
