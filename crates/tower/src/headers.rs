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

//! Lookup tables from allow-listed header names to span attribute names.
//!
//! Request headers are keyed following the CGI convention (`HTTP_X_REQUEST_ID`
//! for `X-Request-Id`), response headers by the configured name and its
//! upper-cased variant. Tables are built once and cached by the
//! [`HeaderMatcher`] owning the allow-lists.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use http::{HeaderMap, HeaderName};
use opentelemetry::{Key, KeyValue};

use crate::attributes::{REQUEST_HEADER_PREFIX, RESPONSE_HEADER_PREFIX};

/// Headers which don't get the `HTTP_` prefix in the CGI convention
const UNPREFIXED_KEYS: [&str; 2] = ["CONTENT_TYPE", "CONTENT_LENGTH"];

fn is_separator(c: char) -> bool {
    c == '-' || c.is_whitespace()
}

fn cgi_key(name: &str) -> String {
    let key: String = name
        .chars()
        .map(|c| if is_separator(c) { '_' } else { c.to_ascii_uppercase() })
        .collect();

    if UNPREFIXED_KEYS.contains(&key.as_str()) {
        key
    } else {
        format!("HTTP_{key}")
    }
}

fn attribute_name(prefix: &str, name: &str) -> Key {
    let suffix: String = name
        .chars()
        .map(|c| if is_separator(c) { '_' } else { c.to_ascii_lowercase() })
        .collect();

    Key::new(format!("{prefix}{suffix}"))
}

/// Parse a configured header name, mapping CGI-style underscores and spaces to
/// dashes
fn header_name(name: &str) -> Option<HeaderName> {
    let normalized: String = name
        .chars()
        .map(|c| {
            if c == '_' || c.is_whitespace() {
                '-'
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect();

    match HeaderName::from_bytes(normalized.as_bytes()) {
        Ok(header) => Some(header),
        Err(_) => {
            tracing::debug!(header = name, "Allow-listed header is not a valid HTTP header name");
            None
        }
    }
}

/// Iterate over the non-empty configured names
fn configured(allowed: &[String]) -> impl Iterator<Item = &str> {
    allowed
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
}

/// Join all the values of a header, skipping the ones which are not valid
/// UTF-8
fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let mut values = headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok());

    let first = values.next()?;
    Some(values.fold(first.to_owned(), |mut acc, value| {
        acc.push_str(", ");
        acc.push_str(value);
        acc
    }))
}

fn find_pair<'h, K, V>(headers: &'h [(K, V)], predicate: impl Fn(&str) -> bool) -> Option<&'h str>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    headers
        .iter()
        .find(|(key, _)| predicate(key.as_ref()))
        .map(|(_, value)| value.as_ref())
}

#[derive(Debug)]
struct RequestHeaderEntry {
    header: Option<HeaderName>,
    attribute: Key,
}

/// Allow-listed request headers
#[derive(Debug, Default)]
pub struct RequestHeaderTable {
    by_key: HashMap<String, usize>,
    entries: Vec<RequestHeaderEntry>,
}

impl RequestHeaderTable {
    fn build(allowed: &[String]) -> Self {
        let mut table = Self::default();

        for name in configured(allowed) {
            let key = cgi_key(name);
            if table.by_key.contains_key(&key) {
                continue;
            }

            table.by_key.insert(key, table.entries.len());
            table.entries.push(RequestHeaderEntry {
                header: header_name(name),
                attribute: attribute_name(REQUEST_HEADER_PREFIX, name),
            });
        }

        table
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the attribute name for a CGI-style request header key, like
    /// `HTTP_X_REQUEST_ID`
    #[must_use]
    pub fn attribute_name(&self, key: &str) -> Option<&Key> {
        let index = *self.by_key.get(key)?;
        Some(&self.entries[index].attribute)
    }

    /// Collect the allow-listed headers present in the request.
    ///
    /// Repeated headers are joined with `", "`.
    #[must_use]
    pub fn attributes(&self, headers: &HeaderMap) -> Vec<KeyValue> {
        if self.entries.is_empty() {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter_map(|entry| {
                let value = header_value(headers, entry.header.as_ref()?)?;
                Some(KeyValue::new(entry.attribute.clone(), value))
            })
            .collect()
    }
}

#[derive(Debug)]
struct ResponseHeaderEntry {
    name: String,
    upper: String,
    header: Option<HeaderName>,
    attribute: Key,
}

/// Allow-listed response headers
#[derive(Debug, Default)]
pub struct ResponseHeaderTable {
    by_key: HashMap<String, usize>,
    entries: Vec<ResponseHeaderEntry>,
}

impl ResponseHeaderTable {
    fn build(allowed: &[String]) -> Self {
        let mut table = Self::default();

        for name in configured(allowed) {
            let upper = name.to_ascii_uppercase();
            if table.by_key.contains_key(&upper) {
                continue;
            }

            let index = table.entries.len();
            table.by_key.insert(name.to_owned(), index);
            table.by_key.insert(upper.clone(), index);
            table.entries.push(ResponseHeaderEntry {
                name: name.to_owned(),
                upper,
                header: header_name(name),
                attribute: attribute_name(RESPONSE_HEADER_PREFIX, name),
            });
        }

        table
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the attribute name for a response header, trying the key as-is and
    /// then upper-cased
    #[must_use]
    pub fn attribute_name(&self, key: &str) -> Option<&Key> {
        let index = match self.by_key.get(key) {
            Some(index) => *index,
            None => *self.by_key.get(&key.to_ascii_uppercase())?,
        };

        Some(&self.entries[index].attribute)
    }

    /// Collect the allow-listed headers present in the response.
    #[must_use]
    pub fn attributes(&self, headers: &HeaderMap) -> Vec<KeyValue> {
        if self.entries.is_empty() {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter_map(|entry| {
                let value = header_value(headers, entry.header.as_ref()?)?;
                Some(KeyValue::new(entry.attribute.clone(), value))
            })
            .collect()
    }

    /// Collect the allow-listed headers from a list of header pairs which
    /// may use any casing.
    ///
    /// For each allow-listed header, this looks for the configured name, then
    /// its upper-cased variant, and finally scans all the pairs for a
    /// case-insensitive match. The first match in iteration order wins.
    #[must_use]
    pub fn attributes_from_pairs<K, V>(&self, headers: &[(K, V)]) -> Vec<KeyValue>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.entries.is_empty() {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter_map(|entry| {
                let value = find_pair(headers, |key| key == entry.name)
                    .or_else(|| find_pair(headers, |key| key == entry.upper))
                    .or_else(|| find_pair(headers, |key| key.eq_ignore_ascii_case(&entry.name)))?;

                Some(KeyValue::new(entry.attribute.clone(), value.to_owned()))
            })
            .collect()
    }
}

/// Owns the header allow-lists and lazily builds the lookup tables from them
#[derive(Debug, Default)]
pub struct HeaderMatcher {
    allowed_request_headers: Vec<String>,
    allowed_response_headers: Vec<String>,
    request: OnceLock<Arc<RequestHeaderTable>>,
    response: OnceLock<Arc<ResponseHeaderTable>>,
}

impl HeaderMatcher {
    #[must_use]
    pub fn new(allowed_request_headers: Vec<String>, allowed_response_headers: Vec<String>) -> Self {
        Self {
            allowed_request_headers,
            allowed_response_headers,
            request: OnceLock::new(),
            response: OnceLock::new(),
        }
    }

    /// The request header table, built on first access
    pub fn request_table(&self) -> &Arc<RequestHeaderTable> {
        self.request
            .get_or_init(|| Arc::new(RequestHeaderTable::build(&self.allowed_request_headers)))
    }

    /// The response header table, built on first access
    pub fn response_table(&self) -> &Arc<ResponseHeaderTable> {
        self.response
            .get_or_init(|| Arc::new(ResponseHeaderTable::build(&self.allowed_response_headers)))
    }

    /// Replace the allow-lists. The tables are rebuilt on next access.
    pub fn reconfigure(
        &mut self,
        allowed_request_headers: Vec<String>,
        allowed_response_headers: Vec<String>,
    ) {
        self.allowed_request_headers = allowed_request_headers;
        self.allowed_response_headers = allowed_response_headers;
        self.request.take();
        self.response.take();
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|&value| value.to_owned()).collect()
    }

    #[test]
    fn request_keys_follow_cgi_convention() {
        let matcher = HeaderMatcher::new(
            strings(&["X-Request-Id", "Content-Type", "content length", "Accept"]),
            Vec::new(),
        );
        let table = matcher.request_table();

        assert_eq!(
            table.attribute_name("HTTP_X_REQUEST_ID").map(Key::as_str),
            Some("http.request.headers.x_request_id")
        );
        assert_eq!(
            table.attribute_name("CONTENT_TYPE").map(Key::as_str),
            Some("http.request.headers.content_type")
        );
        assert_eq!(
            table.attribute_name("CONTENT_LENGTH").map(Key::as_str),
            Some("http.request.headers.content_length")
        );
        assert_eq!(
            table.attribute_name("HTTP_ACCEPT").map(Key::as_str),
            Some("http.request.headers.accept")
        );

        // Exact matches only
        assert!(table.attribute_name("HTTP_CONTENT_TYPE").is_none());
        assert!(table.attribute_name("http_x_request_id").is_none());
    }

    #[test]
    fn request_attributes_from_header_map() {
        let matcher = HeaderMatcher::new(
            strings(&["X-Request-Id", "X_Forwarded_For", "X-Missing"]),
            Vec::new(),
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        headers.append("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        headers.append("x-forwarded-for", HeaderValue::from_static("10.0.0.2"));
        headers.insert("x-other", HeaderValue::from_static("ignored"));

        let attributes = matcher.request_table().attributes(&headers);
        assert_eq!(
            attributes,
            vec![
                KeyValue::new("http.request.headers.x_request_id", "abc"),
                KeyValue::new("http.request.headers.x_forwarded_for", "10.0.0.1, 10.0.0.2"),
            ]
        );
    }

    #[test]
    fn invalid_entries_are_tolerated() {
        let matcher = HeaderMatcher::new(strings(&["", "  ", "X(Bad)", "X-Good"]), Vec::new());
        let table = matcher.request_table();

        // The invalid header name can still be looked up by key
        assert_eq!(
            table.attribute_name("HTTP_X(BAD)").map(Key::as_str),
            Some("http.request.headers.x(bad)")
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-good", HeaderValue::from_static("yes"));
        assert_eq!(
            table.attributes(&headers),
            vec![KeyValue::new("http.request.headers.x_good", "yes")]
        );
    }

    #[test]
    fn response_lookup_is_case_insensitive() {
        let matcher = HeaderMatcher::new(Vec::new(), strings(&["Content-Type"]));
        let table = matcher.response_table();

        for key in ["Content-Type", "CONTENT-TYPE", "content-type", "cOnTeNt-TyPe"] {
            assert_eq!(
                table.attribute_name(key).map(Key::as_str),
                Some("http.response.headers.content_type"),
                "{key}"
            );
        }

        assert!(table.attribute_name("Content-Length").is_none());
    }

    #[test]
    fn response_attributes_from_pairs() {
        let matcher = HeaderMatcher::new(Vec::new(), strings(&["X-Trace", "Content-Type"]));
        let table = matcher.response_table();

        // The linear scan takes the first header in iteration order
        let headers = [
            ("x-trace", "first"),
            ("X-TRACE", "upper"),
            ("content-type", "text/plain"),
            ("x-trace", "second"),
        ];
        assert_eq!(
            table.attributes_from_pairs(&headers),
            vec![
                KeyValue::new("http.response.headers.x_trace", "upper"),
                KeyValue::new("http.response.headers.content_type", "text/plain"),
            ]
        );

        let headers = [("x-TRACE", "mixed"), ("X-Trace", "exact")];
        assert_eq!(
            table.attributes_from_pairs(&headers),
            vec![KeyValue::new("http.response.headers.x_trace", "exact")]
        );

        let headers = [("X-tRaCe", "scanned")];
        assert_eq!(
            table.attributes_from_pairs(&headers),
            vec![KeyValue::new("http.response.headers.x_trace", "scanned")]
        );

        let headers: [(&str, &str); 0] = [];
        assert!(table.attributes_from_pairs(&headers).is_empty());
    }

    #[test]
    fn response_attributes_from_header_map() {
        let matcher = HeaderMatcher::new(Vec::new(), strings(&["Content-Type", "X-Missing"]));

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        assert_eq!(
            matcher.response_table().attributes(&headers),
            vec![KeyValue::new(
                "http.response.headers.content_type",
                "application/json"
            )]
        );
    }

    #[test]
    fn empty_allow_lists() {
        let matcher = HeaderMatcher::default();

        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("abc"));

        assert!(matcher.request_table().is_empty());
        assert!(matcher.response_table().is_empty());
        assert!(matcher.request_table().attributes(&headers).is_empty());
        assert!(matcher.response_table().attributes(&headers).is_empty());
        assert!(matcher
            .response_table()
            .attributes_from_pairs(&[("x-request-id", "abc")])
            .is_empty());
    }

    #[test]
    fn tables_are_cached_until_reconfigured() {
        let mut matcher = HeaderMatcher::new(strings(&["X-Old"]), strings(&["X-Old"]));

        let request = Arc::clone(matcher.request_table());
        let response = Arc::clone(matcher.response_table());
        assert!(Arc::ptr_eq(&request, matcher.request_table()));
        assert!(Arc::ptr_eq(&response, matcher.response_table()));

        matcher.reconfigure(strings(&["X-New"]), strings(&["X-New"]));

        assert!(!Arc::ptr_eq(&request, matcher.request_table()));
        assert!(!Arc::ptr_eq(&response, matcher.response_table()));
        assert!(matcher.request_table().attribute_name("HTTP_X_OLD").is_none());
        assert!(matcher.request_table().attribute_name("HTTP_X_NEW").is_some());
        assert!(matcher.response_table().attribute_name("X-Old").is_none());
        assert!(matcher.response_table().attribute_name("x-new").is_some());
    }
}
