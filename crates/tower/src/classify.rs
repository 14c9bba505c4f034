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

use std::{collections::HashSet, fmt, sync::Arc};

use opentelemetry::Context;

use crate::{request::RequestEnv, utils::FnWrapper};

/// A strategy deciding whether a request should be left untraced
pub trait RequestFilter: Send + Sync {
    fn should_skip(&self, request: &RequestEnv<'_>) -> bool;
}

impl<F> RequestFilter for FnWrapper<F>
where
    F: Fn(&RequestEnv<'_>) -> bool + Send + Sync,
{
    fn should_skip(&self, request: &RequestEnv<'_>) -> bool {
        (self.0)(request)
    }
}

/// Filter requests with a function.
#[must_use]
pub fn filter_fn<F>(f: F) -> FnWrapper<F>
where
    F: Fn(&RequestEnv<'_>) -> bool + Send + Sync,
{
    FnWrapper(f)
}

/// Marker for requests which are not traced.
///
/// It is set both on the [`Context`] the downstream service runs in and in the
/// request extensions, so that nested instrumentation can opt out as well.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Untraced;

/// Whether the given context runs a request which was skipped by the tracing
/// layer
#[must_use]
pub fn is_untraced(cx: &Context) -> bool {
    cx.get::<Untraced>().is_some()
}

/// Decides which requests get traced
#[derive(Clone, Default)]
pub struct RequestClassifier {
    untraced_endpoints: HashSet<String>,
    filter: Option<Arc<dyn RequestFilter>>,
}

impl fmt::Debug for RequestClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClassifier")
            .field("untraced_endpoints", &self.untraced_endpoints)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl RequestClassifier {
    #[must_use]
    pub fn new<I>(untraced_endpoints: I, filter: Option<Arc<dyn RequestFilter>>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            untraced_endpoints: untraced_endpoints.into_iter().map(Into::into).collect(),
            filter,
        }
    }

    /// Whether the request should run without a span, either because its path
    /// is listed as untraced or because the filter rejects it
    #[must_use]
    pub fn should_skip(&self, request: &RequestEnv<'_>) -> bool {
        if self.untraced_endpoints.contains(request.path_info()) {
            tracing::trace!(path = request.path_info(), "Skipping untraced endpoint");
            return true;
        }

        match &self.filter {
            Some(filter) if filter.should_skip(request) => {
                tracing::trace!(path = request.path_info(), "Request filtered out");
                true
            }
            _ => false,
        }
    }
}
