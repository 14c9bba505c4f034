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

//! Attribute keys recorded on the spans

use opentelemetry::Key;

/// The HTTP request method
pub const HTTP_METHOD: Key = Key::from_static_str("http.method");

/// The value of the `Host` header, or `unknown`
pub const HTTP_HOST: Key = Key::from_static_str("http.host");

/// The URI scheme the request was received on
pub const HTTP_SCHEME: Key = Key::from_static_str("http.scheme");

/// Mount prefix, path and query string of the request
pub const HTTP_TARGET: Key = Key::from_static_str("http.target");

/// The value of the `User-Agent` header
pub const HTTP_USER_AGENT: Key = Key::from_static_str("http.user_agent");

/// The numeric response status code
pub const HTTP_STATUS_CODE: Key = Key::from_static_str("http.status_code");

/// The canonical reason phrase of the response status code
pub const HTTP_STATUS_TEXT: Key = Key::from_static_str("http.status_text");

/// Unix timestamp, in seconds, at which the reverse proxy received the request
pub const START_TIME: Key = Key::from_static_str("start_time");

/// Message of the error returned by the inner service
pub const EXCEPTION_MESSAGE: Key = Key::from_static_str("exception.message");

pub(crate) const REQUEST_HEADER_PREFIX: &str = "http.request.headers.";
pub(crate) const RESPONSE_HEADER_PREFIX: &str = "http.response.headers.";
