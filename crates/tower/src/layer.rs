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

use opentelemetry::{global::BoxedTracer, trace::SpanRef};
use tower::Layer;

use crate::{
    classify::RequestClassifier,
    enrich::{on_error_fn, DefaultOnError, OnHttpResponse},
    frontend::FrontendSpanBuilder,
    headers::HeaderMatcher,
    make_span::MakeRequestSpan,
    propagation::ExtractFromHttpRequest,
    service::RequestTracing,
    settings::Settings,
    utils::FnWrapper,
};

/// State shared by all the services created by a layer, read-only once built
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) classifier: RequestClassifier,
    pub(crate) frontend: FrontendSpanBuilder,
    pub(crate) make_span: MakeRequestSpan,
    pub(crate) on_response: OnHttpResponse,
}

impl Shared {
    fn new(settings: Settings) -> Self {
        let headers = Arc::new(HeaderMatcher::new(
            settings.allowed_request_headers,
            settings.allowed_response_headers,
        ));

        Self {
            classifier: RequestClassifier::new(
                settings.untraced_endpoints,
                settings.filtered_requests,
            ),
            frontend: FrontendSpanBuilder::new(
                settings.record_frontend_span,
                settings.request_start,
            ),
            make_span: MakeRequestSpan::new(Arc::clone(&headers), settings.url_quantization),
            on_response: OnHttpResponse::new(headers, settings.status_mapper),
        }
    }
}

/// A [`Layer`] which traces every inbound HTTP request
pub struct RequestTracingLayer<
    T = BoxedTracer,
    ExtractContext = ExtractFromHttpRequest,
    OnError = DefaultOnError,
> {
    tracer: Arc<T>,
    shared: Arc<Shared>,
    extract_context: ExtractContext,
    on_error: OnError,
}

impl<T, ExtractContext, OnError> Clone for RequestTracingLayer<T, ExtractContext, OnError>
where
    ExtractContext: Clone,
    OnError: Clone,
{
    fn clone(&self) -> Self {
        Self {
            tracer: Arc::clone(&self.tracer),
            shared: Arc::clone(&self.shared),
            extract_context: self.extract_context.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl RequestTracingLayer {
    /// Create a layer using the tracer of the global tracer provider
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let tracer = opentelemetry::global::tracer("reqtrace");
        Self::with_tracer(tracer, settings)
    }
}

impl<T> RequestTracingLayer<T> {
    #[must_use]
    pub fn with_tracer(tracer: T, settings: Settings) -> Self {
        Self {
            tracer: Arc::new(tracer),
            shared: Arc::new(Shared::new(settings)),
            extract_context: ExtractFromHttpRequest,
            on_error: DefaultOnError,
        }
    }
}

impl<T, ExtractContext, OnError> RequestTracingLayer<T, ExtractContext, OnError> {
    #[must_use]
    pub fn extract_context<NewExtractContext>(
        self,
        extract_context: NewExtractContext,
    ) -> RequestTracingLayer<T, NewExtractContext, OnError> {
        RequestTracingLayer {
            tracer: self.tracer,
            shared: self.shared,
            extract_context,
            on_error: self.on_error,
        }
    }

    #[must_use]
    pub fn on_error<NewOnError>(
        self,
        on_error: NewOnError,
    ) -> RequestTracingLayer<T, ExtractContext, NewOnError> {
        RequestTracingLayer {
            tracer: self.tracer,
            shared: self.shared,
            extract_context: self.extract_context,
            on_error,
        }
    }

    #[must_use]
    pub fn on_error_fn<F, E>(self, f: F) -> RequestTracingLayer<T, ExtractContext, FnWrapper<F>>
    where
        F: Fn(&SpanRef<'_>, &E),
    {
        self.on_error(on_error_fn(f))
    }
}

impl<S, T, ExtractContext, OnError> Layer<S> for RequestTracingLayer<T, ExtractContext, OnError>
where
    ExtractContext: Clone,
    OnError: Clone,
{
    type Service = RequestTracing<S, T, ExtractContext, OnError>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTracing::new(
            inner,
            Arc::clone(&self.tracer),
            Arc::clone(&self.shared),
            self.extract_context.clone(),
            self.on_error.clone(),
        )
    }
}
