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

//! Span name quantization, to keep the cardinality of span names low

use std::sync::Arc;

use reqtrace_config::UrlQuantizationConfig;

use crate::utils::FnWrapper;

/// Maps a request URI or path to the name of the request span
pub trait UrlQuantizer: Send + Sync {
    fn quantize(&self, uri: &str) -> String;
}

impl<F> UrlQuantizer for FnWrapper<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn quantize(&self, uri: &str) -> String {
        (self.0)(uri)
    }
}

/// Quantize span names with a function.
#[must_use]
pub fn quantize_fn<F>(f: F) -> FnWrapper<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    FnWrapper(f)
}

/// Drops the query string
#[derive(Clone, Copy, Debug, Default)]
pub struct StripQueryString;

impl UrlQuantizer for StripQueryString {
    fn quantize(&self, uri: &str) -> String {
        uri.split_once('?')
            .map_or(uri, |(path, _query)| path)
            .to_owned()
    }
}

/// Keeps the query parameter names and drops their values, so that
/// `/search?q=foo&page=2` becomes `/search?q&page`.
///
/// The query is split on the raw `&` and `=` characters. Percent-encoded
/// separators are not decoded and stay part of the parameter name.
#[derive(Clone, Copy, Debug, Default)]
pub struct RedactQueryValues;

impl UrlQuantizer for RedactQueryValues {
    fn quantize(&self, uri: &str) -> String {
        let Some((path, query)) = uri.split_once('?') else {
            return uri.to_owned();
        };

        let mut quantized = String::with_capacity(uri.len());
        quantized.push_str(path);

        let mut separator = '?';
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let name = pair.split_once('=').map_or(pair, |(name, _value)| name);
            quantized.push(separator);
            quantized.push_str(name);
            separator = '&';
        }

        quantized
    }
}

/// The built-in quantizer selected by the configuration, if any
#[must_use]
pub fn from_config(config: UrlQuantizationConfig) -> Option<Arc<dyn UrlQuantizer>> {
    match config {
        UrlQuantizationConfig::None => None,
        UrlQuantizationConfig::StripQuery => Some(Arc::new(StripQueryString)),
        UrlQuantizationConfig::RedactQueryValues => Some(Arc::new(RedactQueryValues)),
    }
}
