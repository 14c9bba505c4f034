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

//! Read-only view over an inbound request

use std::borrow::Cow;

use headers::{HeaderMapExt, Host, UserAgent};
use http::{uri::Scheme, Extensions, HeaderMap, Method, Request, Uri};

/// Path prefix under which the application is mounted.
///
/// Routers nesting a service under a prefix should insert this in the request
/// extensions, so that [`RequestEnv::target`] reflects the full path the
/// client requested.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptName(pub String);

/// The full request target as received, before any router rewrote the
/// request URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestUri(pub Uri);

/// A borrowed, read-only view over the parts of a request the tracing layer
/// looks at.
#[derive(Clone, Copy, Debug)]
pub struct RequestEnv<'a> {
    method: &'a Method,
    uri: &'a Uri,
    headers: &'a HeaderMap,
    extensions: &'a Extensions,
}

impl<'a> RequestEnv<'a> {
    #[must_use]
    pub fn new<B>(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
            extensions: request.extensions(),
        }
    }

    #[must_use]
    pub fn method(&self) -> &'a str {
        self.method.as_str()
    }

    /// The scheme the request was received on.
    ///
    /// Listeners terminating TLS can insert a [`Scheme`] in the request
    /// extensions. Falls back to the URI scheme, then to `http`.
    #[must_use]
    pub fn scheme(&self) -> &'a str {
        self.extensions
            .get::<Scheme>()
            .or_else(|| self.uri.scheme())
            .map_or("http", Scheme::as_str)
    }

    /// The `Host` header, falling back to the URI authority for HTTP/2
    /// requests.
    #[must_use]
    pub fn host(&self) -> Option<Cow<'a, str>> {
        if let Some(host) = self.headers.typed_get::<Host>() {
            return Some(Cow::Owned(host.to_string()));
        }

        self.uri
            .authority()
            .map(|authority| Cow::Borrowed(authority.as_str()))
    }

    #[must_use]
    pub fn script_name(&self) -> &'a str {
        self.extensions
            .get::<ScriptName>()
            .map_or("", |script_name| script_name.0.as_str())
    }

    #[must_use]
    pub fn path_info(&self) -> &'a str {
        self.uri.path()
    }

    #[must_use]
    pub fn query_string(&self) -> &'a str {
        self.uri.query().unwrap_or_default()
    }

    /// The request URI as the client sent it: the [`RequestUri`] extension if
    /// a router set one, else the path and query of the request.
    #[must_use]
    pub fn request_uri(&self) -> Cow<'a, str> {
        if let Some(RequestUri(uri)) = self.extensions.get::<RequestUri>() {
            return Cow::Owned(uri.to_string());
        }

        match self.uri.path_and_query() {
            Some(path_and_query) => Cow::Borrowed(path_and_query.as_str()),
            None => Cow::Borrowed(self.path_info()),
        }
    }

    /// The request target: mount prefix and path, followed by the query
    /// string if there is one.
    #[must_use]
    pub fn target(&self) -> String {
        let script_name = self.script_name();
        let path_info = self.path_info();
        let query_string = self.query_string();

        let mut target =
            String::with_capacity(script_name.len() + path_info.len() + query_string.len() + 1);
        target.push_str(script_name);
        target.push_str(path_info);
        if !query_string.is_empty() {
            target.push('?');
            target.push_str(query_string);
        }
        target
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<UserAgent> {
        self.headers.typed_get::<UserAgent>()
    }

    #[must_use]
    pub fn headers(&self) -> &'a HeaderMap {
        self.headers
    }

    #[must_use]
    pub fn extensions(&self) -> &'a Extensions {
        self.extensions
    }
}

#[cfg(test)]
mod tests {
    use http::header::{HOST, USER_AGENT};

    use super::*;

    #[test]
    fn target_without_query_string() {
        let request = Request::get("/users").body(()).unwrap();
        let env = RequestEnv::new(&request);

        assert_eq!(env.script_name(), "");
        assert_eq!(env.path_info(), "/users");
        assert_eq!(env.query_string(), "");
        assert_eq!(env.target(), "/users");
    }

    #[test]
    fn target_with_script_name_and_query_string() {
        let mut request = Request::get("/items?s=1").body(()).unwrap();
        request
            .extensions_mut()
            .insert(ScriptName("/shop".to_owned()));
        let env = RequestEnv::new(&request);

        assert_eq!(env.target(), "/shop/items?s=1");
    }

    #[test]
    fn request_uri_keeps_the_query_string() {
        let request = Request::get("/search?q=rust").body(()).unwrap();
        assert_eq!(RequestEnv::new(&request).request_uri(), "/search?q=rust");

        let request = Request::get("https://example.org").body(()).unwrap();
        assert_eq!(RequestEnv::new(&request).request_uri(), "/");

        let mut request = Request::get("/search?q=rust").body(()).unwrap();
        request
            .extensions_mut()
            .insert(RequestUri(Uri::from_static("/api/search?q=rust")));
        assert_eq!(RequestEnv::new(&request).request_uri(), "/api/search?q=rust");
    }

    #[test]
    fn scheme_and_host() {
        let request = Request::get("/")
            .header(HOST, "example.com:8080")
            .body(())
            .unwrap();
        let env = RequestEnv::new(&request);
        assert_eq!(env.scheme(), "http");
        assert_eq!(env.host().as_deref(), Some("example.com:8080"));

        let mut request = Request::get("https://example.org/").body(()).unwrap();
        assert_eq!(RequestEnv::new(&request).scheme(), "https");
        assert_eq!(
            RequestEnv::new(&request).host().as_deref(),
            Some("example.org")
        );

        request.extensions_mut().insert(Scheme::HTTP);
        assert_eq!(RequestEnv::new(&request).scheme(), "http");

        let request = Request::get("/").body(()).unwrap();
        assert_eq!(RequestEnv::new(&request).host(), None);
    }

    #[test]
    fn user_agent() {
        let request = Request::get("/")
            .header(USER_AGENT, "curl/8.0")
            .body(())
            .unwrap();
        let env = RequestEnv::new(&request);
        assert_eq!(env.user_agent().as_ref().map(UserAgent::as_str), Some("curl/8.0"));

        let request = Request::get("/").body(()).unwrap();
        assert!(RequestEnv::new(&request).user_agent().is_none());
    }
}
