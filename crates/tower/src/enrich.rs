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

use http::{Response, StatusCode};
use opentelemetry::{
    trace::{SpanRef, Status},
    KeyValue,
};

use crate::{
    attributes::{EXCEPTION_MESSAGE, HTTP_STATUS_CODE, HTTP_STATUS_TEXT},
    headers::HeaderMatcher,
    utils::FnWrapper,
};

/// Maps an HTTP status code to a span status
pub trait StatusMapper: Send + Sync {
    fn status(&self, status_code: u16) -> Status;
}

impl<F> StatusMapper for FnWrapper<F>
where
    F: Fn(u16) -> Status + Send + Sync,
{
    fn status(&self, status_code: u16) -> Status {
        (self.0)(status_code)
    }
}

/// Informational, successful and redirection responses are `Ok`, anything
/// else is an error
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStatusMapper;

impl StatusMapper for HttpStatusMapper {
    fn status(&self, status_code: u16) -> Status {
        if (100..=399).contains(&status_code) {
            Status::Ok
        } else {
            Status::error(format!("HTTP status {status_code}"))
        }
    }
}

pub trait OnResponse<R> {
    fn on_response(&self, span: &SpanRef<'_>, response: &R);
}

/// Records the status and the allow-listed headers of a response
#[derive(Clone)]
pub struct OnHttpResponse {
    headers: Arc<HeaderMatcher>,
    status_mapper: Arc<dyn StatusMapper>,
}

impl fmt::Debug for OnHttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnHttpResponse")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl OnHttpResponse {
    #[must_use]
    pub fn new(headers: Arc<HeaderMatcher>, status_mapper: Arc<dyn StatusMapper>) -> Self {
        Self {
            headers,
            status_mapper,
        }
    }

    fn record_status(&self, span: &SpanRef<'_>, status_code: u16) {
        span.set_status(self.status_mapper.status(status_code));
        span.set_attribute(KeyValue::new(HTTP_STATUS_CODE, i64::from(status_code)));

        if let Some(reason) = StatusCode::from_u16(status_code)
            .ok()
            .and_then(|status| status.canonical_reason())
        {
            span.set_attribute(KeyValue::new(HTTP_STATUS_TEXT, reason));
        }
    }

    /// Enrich the span from a raw status code and header pairs which were not
    /// normalised by [`http::HeaderMap`]
    pub fn enrich_from_parts<K, V>(&self, span: &SpanRef<'_>, status_code: u16, headers: &[(K, V)])
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.record_status(span, status_code);

        for attribute in self.headers.response_table().attributes_from_pairs(headers) {
            span.set_attribute(attribute);
        }
    }
}

impl<B> OnResponse<Response<B>> for OnHttpResponse {
    fn on_response(&self, span: &SpanRef<'_>, response: &Response<B>) {
        self.record_status(span, response.status().as_u16());

        for attribute in self.headers.response_table().attributes(response.headers()) {
            span.set_attribute(attribute);
        }
    }
}

pub trait OnError<E> {
    fn on_error(&self, span: &SpanRef<'_>, err: &E);
}

/// Records the error as an `exception` event and marks the span as failed
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOnError;

impl<E> OnError<E> for DefaultOnError
where
    E: fmt::Display,
{
    fn on_error(&self, span: &SpanRef<'_>, err: &E) {
        let message = err.to_string();
        let attributes = vec![KeyValue::new(EXCEPTION_MESSAGE, message.clone())];
        span.add_event("exception", attributes);
        span.set_status(Status::error(message));
    }
}

impl<E, F> OnError<E> for FnWrapper<F>
where
    F: Fn(&SpanRef<'_>, &E),
{
    fn on_error(&self, span: &SpanRef<'_>, err: &E) {
        (self.0)(span, err);
    }
}

/// Handle errors with a function.
#[must_use]
pub fn on_error_fn<E, F>(f: F) -> FnWrapper<F>
where
    F: Fn(&SpanRef<'_>, &E),
{
    FnWrapper(f)
}
