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

use std::{
    sync::Arc,
    task::{Context as TaskContext, Poll},
};

use http::Request;
use opentelemetry::{
    trace::{FutureExt as _, TraceContextExt, Tracer},
    Context,
};
use tower::Service;

use crate::{
    classify::{is_untraced, Untraced},
    enrich::{OnError, OnHttpResponse, OnResponse},
    future::{RequestTracingFuture, Tracked},
    layer::Shared,
    propagation::{with_current, ExtractContext, RequestSpanContext},
    request::RequestEnv,
};

/// The service created by [`RequestTracingLayer`](crate::RequestTracingLayer)
pub struct RequestTracing<S, T, ExtractContext, OnError> {
    inner: S,
    tracer: Arc<T>,
    shared: Arc<Shared>,
    extract_context: ExtractContext,
    on_error: OnError,
}

impl<S, T, ExtractContext, OnError> Clone for RequestTracing<S, T, ExtractContext, OnError>
where
    S: Clone,
    ExtractContext: Clone,
    OnError: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            tracer: Arc::clone(&self.tracer),
            shared: Arc::clone(&self.shared),
            extract_context: self.extract_context.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<S, T, ExtractContext, OnError> RequestTracing<S, T, ExtractContext, OnError> {
    pub(crate) fn new(
        inner: S,
        tracer: Arc<T>,
        shared: Arc<Shared>,
        extract_context: ExtractContext,
        on_error: OnError,
    ) -> Self {
        Self {
            inner,
            tracer,
            shared,
            extract_context,
            on_error,
        }
    }

    /// Call the inner service without tracing, marking the request and its
    /// context as untraced
    fn call_untraced<B>(
        &mut self,
        parent_cx: &Context,
        mut request: Request<B>,
    ) -> RequestTracingFuture<S::Future, OnError>
    where
        S: Service<Request<B>>,
    {
        let cx = parent_cx.with_value(Untraced);
        request.extensions_mut().insert(Untraced);

        let inner = with_current(cx.clone(), || self.inner.call(request));
        RequestTracingFuture::new(inner.with_context(cx), None)
    }
}

impl<B, S, T, ExtractContextT, OnErrorT> Service<Request<B>>
    for RequestTracing<S, T, ExtractContextT, OnErrorT>
where
    S: Service<Request<B>>,
    T: Tracer,
    T::Span: Send + Sync + 'static,
    ExtractContextT: ExtractContext<Request<B>>,
    OnErrorT: OnError<S::Error> + Clone,
    OnHttpResponse: OnResponse<S::Response>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = RequestTracingFuture<S::Future, OnErrorT>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let current_cx = Context::current();
        if is_untraced(&current_cx)
            || request.extensions().get::<Untraced>().is_some()
            || self.shared.classifier.should_skip(&RequestEnv::new(&request))
        {
            return self.call_untraced(&current_cx, request);
        }

        let extracted = self.extract_context.extract_context(&request);
        let env = RequestEnv::new(&request);

        let frontend = self
            .shared
            .frontend
            .maybe_build(self.tracer.as_ref(), &env, &extracted);
        let parent_cx = match &frontend {
            Some(frontend) => frontend.context().clone(),
            None => extracted,
        };

        let span = self
            .shared
            .make_span
            .make_span_builder(&env, frontend.is_some())
            .start_with_context(self.tracer.as_ref(), &parent_cx);
        let cx = parent_cx.with_span(span);

        request
            .extensions_mut()
            .insert(RequestSpanContext(cx.clone()));

        let inner = with_current(cx.clone(), || self.inner.call(request));

        let tracked = Tracked::new(
            cx.clone(),
            Arc::clone(&self.shared),
            self.on_error.clone(),
            frontend,
        );
        RequestTracingFuture::new(inner.with_context(cx), Some(tracked))
    }
}
