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

use std::{borrow::Cow, fmt, sync::Arc};

use opentelemetry::{
    trace::{SpanBuilder, SpanKind},
    KeyValue,
};

use crate::{
    attributes::{HTTP_HOST, HTTP_METHOD, HTTP_SCHEME, HTTP_TARGET, HTTP_USER_AGENT},
    headers::HeaderMatcher,
    quantize::UrlQuantizer,
    request::RequestEnv,
};

/// Builds the span covering the processing of a request by the application
#[derive(Clone)]
pub struct MakeRequestSpan {
    headers: Arc<HeaderMatcher>,
    quantizer: Option<Arc<dyn UrlQuantizer>>,
}

impl fmt::Debug for MakeRequestSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MakeRequestSpan")
            .field("headers", &self.headers)
            .field("quantizer", &self.quantizer.is_some())
            .finish()
    }
}

impl MakeRequestSpan {
    #[must_use]
    pub fn new(headers: Arc<HeaderMatcher>, quantizer: Option<Arc<dyn UrlQuantizer>>) -> Self {
        Self { headers, quantizer }
    }

    /// The span name: the request URI, query string included, run through the
    /// quantizer
    #[must_use]
    pub fn span_name(&self, request: &RequestEnv<'_>) -> String {
        let uri = request.request_uri();

        match &self.quantizer {
            Some(quantizer) => quantizer.quantize(&uri),
            None => uri.into_owned(),
        }
    }

    /// Attributes known when the request comes in
    #[must_use]
    pub fn attributes(&self, request: &RequestEnv<'_>) -> Vec<KeyValue> {
        let host = request
            .host()
            .map_or_else(|| "unknown".to_owned(), Cow::into_owned);

        let mut attributes = vec![
            KeyValue::new(HTTP_METHOD, request.method().to_owned()),
            KeyValue::new(HTTP_HOST, host),
            KeyValue::new(HTTP_SCHEME, request.scheme().to_owned()),
            KeyValue::new(HTTP_TARGET, request.target()),
        ];

        if let Some(user_agent) = request.user_agent() {
            attributes.push(KeyValue::new(HTTP_USER_AGENT, user_agent.as_str().to_owned()));
        }

        attributes.extend(self.headers.request_table().attributes(request.headers()));
        attributes
    }

    /// The request span is the entry span of the service, unless a frontend
    /// span was recorded in which case it is a child of it
    #[must_use]
    pub fn make_span_builder(&self, request: &RequestEnv<'_>, has_frontend: bool) -> SpanBuilder {
        let kind = if has_frontend {
            SpanKind::Internal
        } else {
            SpanKind::Server
        };

        SpanBuilder::from_name(self.span_name(request))
            .with_kind(kind)
            .with_attributes(self.attributes(request))
    }
}

#[cfg(test)]
mod tests {
    use http::{
        header::{HOST, USER_AGENT},
        Request, Uri,
    };

    use super::*;
    use crate::{quantize::StripQueryString, request::RequestUri};

    fn value<'a>(attributes: &'a [KeyValue], key: &str) -> Option<&'a opentelemetry::Value> {
        attributes
            .iter()
            .find(|attribute| attribute.key.as_str() == key)
            .map(|attribute| &attribute.value)
    }

    #[test]
    fn span_name_from_path() {
        let make_span = MakeRequestSpan::new(Arc::default(), None);

        let request = Request::get("/users?id=1").body(()).unwrap();
        assert_eq!(make_span.span_name(&RequestEnv::new(&request)), "/users?id=1");

        let make_span = MakeRequestSpan::new(Arc::default(), Some(Arc::new(StripQueryString)));
        assert_eq!(make_span.span_name(&RequestEnv::new(&request)), "/users");
    }

    #[test]
    fn span_name_prefers_request_uri() {
        let make_span = MakeRequestSpan::new(Arc::default(), None);

        let mut request = Request::get("/users").body(()).unwrap();
        request
            .extensions_mut()
            .insert(RequestUri(Uri::from_static("/api/users?id=1")));
        assert_eq!(
            make_span.span_name(&RequestEnv::new(&request)),
            "/api/users?id=1"
        );

        let make_span = MakeRequestSpan::new(Arc::default(), Some(Arc::new(StripQueryString)));
        assert_eq!(make_span.span_name(&RequestEnv::new(&request)), "/api/users");
    }

    #[test]
    fn start_attributes() {
        let headers = Arc::new(HeaderMatcher::new(
            vec!["X-Request-Id".to_owned()],
            Vec::new(),
        ));
        let make_span = MakeRequestSpan::new(headers, None);

        let request = Request::post("/orders?draft=true")
            .header(HOST, "shop.example")
            .header(USER_AGENT, "curl/8.0")
            .header("x-request-id", "abc")
            .body(())
            .unwrap();
        let attributes = make_span.attributes(&RequestEnv::new(&request));

        assert_eq!(value(&attributes, "http.method"), Some(&"POST".into()));
        assert_eq!(value(&attributes, "http.host"), Some(&"shop.example".into()));
        assert_eq!(value(&attributes, "http.scheme"), Some(&"http".into()));
        assert_eq!(
            value(&attributes, "http.target"),
            Some(&"/orders?draft=true".into())
        );
        assert_eq!(value(&attributes, "http.user_agent"), Some(&"curl/8.0".into()));
        assert_eq!(
            value(&attributes, "http.request.headers.x_request_id"),
            Some(&"abc".into())
        );
    }

    #[test]
    fn missing_host_and_user_agent() {
        let make_span = MakeRequestSpan::new(Arc::default(), None);

        let request = Request::get("/").body(()).unwrap();
        let attributes = make_span.attributes(&RequestEnv::new(&request));

        assert_eq!(value(&attributes, "http.host"), Some(&"unknown".into()));
        assert_eq!(value(&attributes, "http.user_agent"), None);
        assert_eq!(value(&attributes, "http.target"), Some(&"/".into()));
    }

    #[test]
    fn span_kind() {
        let make_span = MakeRequestSpan::new(Arc::default(), None);
        let request = Request::get("/").body(()).unwrap();
        let env = RequestEnv::new(&request);

        let builder = make_span.make_span_builder(&env, false);
        assert_eq!(builder.span_kind, Some(SpanKind::Server));
        assert_eq!(builder.name, "/");

        let builder = make_span.make_span_builder(&env, true);
        assert_eq!(builder.span_kind, Some(SpanKind::Internal));
    }
}
