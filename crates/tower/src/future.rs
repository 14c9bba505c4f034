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
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{ready, Context as TaskContext, Poll},
};

use opentelemetry::{
    trace::{TraceContextExt, WithContext},
    Context,
};
use pin_project_lite::pin_project;

use crate::{
    enrich::{OnError, OnHttpResponse, OnResponse},
    frontend::FrontendSpan,
    layer::Shared,
};

/// The spans of a traced request, ended when this is dropped.
///
/// The request span is ended first, then the frontend span if there is one.
/// This happens whether the request completed or the future was dropped
/// before completion.
pub(crate) struct Tracked<OnError> {
    cx: Context,
    shared: Arc<Shared>,
    on_error: OnError,
    frontend: Option<FrontendSpan>,
}

impl<OnErrorT> Tracked<OnErrorT> {
    pub(crate) fn new(
        cx: Context,
        shared: Arc<Shared>,
        on_error: OnErrorT,
        frontend: Option<FrontendSpan>,
    ) -> Self {
        Self {
            cx,
            shared,
            on_error,
            frontend,
        }
    }

    fn finish<R, E>(self, result: &Result<R, E>)
    where
        OnErrorT: OnError<E>,
        OnHttpResponse: OnResponse<R>,
    {
        let span = self.cx.span();
        match result {
            Ok(response) => self.shared.on_response.on_response(&span, response),
            Err(err) => self.on_error.on_error(&span, err),
        }
    }
}

impl<OnError> Drop for Tracked<OnError> {
    fn drop(&mut self) {
        self.cx.span().end();
        drop(self.frontend.take());
    }
}

pin_project! {
    /// Response future of [`RequestTracing`](crate::RequestTracing)
    pub struct RequestTracingFuture<F, OnError> {
        #[pin]
        inner: WithContext<F>,
        tracked: Option<Tracked<OnError>>,
    }
}

impl<F, OnError> RequestTracingFuture<F, OnError> {
    pub(crate) fn new(inner: WithContext<F>, tracked: Option<Tracked<OnError>>) -> Self {
        Self { inner, tracked }
    }
}

impl<F, R, E, OnErrorT> Future for RequestTracingFuture<F, OnErrorT>
where
    F: Future<Output = Result<R, E>>,
    OnErrorT: OnError<E>,
    OnHttpResponse: OnResponse<R>,
{
    type Output = Result<R, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();

        // The inner future is polled with the request context attached
        let result = ready!(this.inner.poll(cx));

        if let Some(tracked) = this.tracked.take() {
            tracked.finish(&result);
        }

        Poll::Ready(result)
    }
}
