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

use std::sync::Arc;

use http::Request;
use opentelemetry::{propagation::TextMapPropagator, Context};
use opentelemetry_http::HeaderExtractor;

pub trait ExtractContext<R> {
    fn extract_context(&self, request: &R) -> Context;
}

/// Use the current context as the parent, ignoring the request headers
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractContext;

impl<T> ExtractContext<T> for DefaultExtractContext {
    fn extract_context(&self, _request: &T) -> Context {
        Context::current()
    }
}

/// Extract the context from the request headers with the global propagator.
///
/// Propagators leave the parent untouched when the headers are missing or
/// malformed, so this always yields a usable context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractFromHttpRequest;

impl<T> ExtractContext<Request<T>> for ExtractFromHttpRequest {
    fn extract_context(&self, request: &Request<T>) -> Context {
        let extractor = HeaderExtractor(request.headers());
        let parent_cx = Context::current();

        opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract_with_context(&parent_cx, &extractor)
        })
    }
}

/// Extract the context from the request headers with a specific propagator
#[derive(Debug, Default)]
pub struct ExtractWithPropagator<P> {
    propagator: Arc<P>,
}

impl<P> Clone for ExtractWithPropagator<P> {
    fn clone(&self) -> Self {
        Self {
            propagator: Arc::clone(&self.propagator),
        }
    }
}

impl<P> ExtractWithPropagator<P> {
    #[must_use]
    pub fn new(propagator: P) -> Self {
        Self {
            propagator: Arc::new(propagator),
        }
    }
}

impl<T, P> ExtractContext<Request<T>> for ExtractWithPropagator<P>
where
    P: TextMapPropagator,
{
    fn extract_context(&self, request: &Request<T>) -> Context {
        let extractor = HeaderExtractor(request.headers());
        self.propagator
            .extract_with_context(&Context::current(), &extractor)
    }
}

/// Run a synchronous block with the given context as the current one.
///
/// The previous context is restored when the block returns, including when it
/// unwinds.
pub fn with_current<F, R>(cx: Context, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = cx.attach();
    f()
}

/// Context of the request span, inserted in the request extensions
#[derive(Clone, Debug)]
pub struct RequestSpanContext(pub Context);
