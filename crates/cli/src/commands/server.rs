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

use std::net::SocketAddr;

use anyhow::Context as _;
use axum::{http::StatusCode, routing::get, Extension, Router};
use clap::Parser;
use opentelemetry::trace::TraceContextExt;
use reqtrace_config::RootConfig;
use reqtrace_tower::{RequestSpanContext, RequestTracingLayer, Settings};
use tracing::info;

#[derive(Parser, Debug)]
pub(super) struct Options {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

async fn index(span: Option<Extension<RequestSpanContext>>) -> String {
    match span {
        Some(Extension(RequestSpanContext(cx))) => {
            let span = cx.span();
            let span_context = span.span_context();
            format!(
                "trace_id={} span_id={}\n",
                span_context.trace_id(),
                span_context.span_id()
            )
        }
        None => "untraced\n".to_owned(),
    }
}

async fn health() -> &'static str {
    "ok\n"
}

async fn fail() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "something went wrong\n")
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "Could not listen for Ctrl-C, the server will not shutdown gracefully");
        std::future::pending::<()>().await;
    }

    info!("Received Ctrl-C, shutting down");
}

pub(super) fn router(settings: Settings) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/fail", get(fail))
        .layer(RequestTracingLayer::new(settings))
}

impl Options {
    pub async fn run(&self, root: &super::Options) -> anyhow::Result<()> {
        let config: RootConfig = root.load_config()?;
        let settings = Settings::from_config(&config.request_tracing);
        tracing::debug!(?settings, "Request tracing settings");

        let listener = tokio::net::TcpListener::bind(self.listen)
            .await
            .with_context(|| format!("could not bind to {}", self.listen))?;
        info!(address = %self.listen, "Listening");

        axum::serve(listener, router(settings))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server failed")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use reqtrace_config::RequestTracingConfig;
    use tower::ServiceExt;

    use super::*;

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let request = axum::http::Request::get(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn demo_routes() {
        let config = RequestTracingConfig {
            untraced_endpoints: vec!["/health".to_owned()],
            ..RequestTracingConfig::default()
        };
        let router = router(Settings::from_config(&config));

        let (status, body) = get_body(router.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("trace_id="));

        let (status, body) = get_body(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok\n");

        let (status, _body) = get_body(router, "/fail").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
