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

use opentelemetry::{
    global,
    propagation::{TextMapCompositePropagator, TextMapPropagator},
};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::TracerProvider,
};
use reqtrace_config::{Propagator, TelemetryConfig, TracingExporterKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("could not install the OpenTelemetry error handler")]
    ErrorHandler(#[source] global::Error),
}

pub fn setup(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    global::set_error_handler(|e| tracing::error!(%e, "OpenTelemetry error"))
        .map_err(TelemetryError::ErrorHandler)?;

    global::set_text_map_propagator(propagator(&config.tracing.propagators));

    match config.tracing.exporter {
        TracingExporterKind::None => {
            tracing::debug!("Not exporting traces");
        }
        TracingExporterKind::Stdout => {
            let provider = TracerProvider::builder()
                .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
                .build();
            global::set_tracer_provider(provider);
            tracing::info!("Exporting traces to stdout");
        }
    }

    Ok(())
}

pub fn shutdown() {
    global::shutdown_tracer_provider();
}

fn match_propagator(propagator: Propagator) -> Box<dyn TextMapPropagator + Send + Sync> {
    match propagator {
        Propagator::TraceContext => Box::new(TraceContextPropagator::new()),
        Propagator::Baggage => Box::new(BaggagePropagator::new()),
    }
}

fn propagator(propagators: &[Propagator]) -> TextMapCompositePropagator {
    let propagators = propagators.iter().copied().map(match_propagator).collect();

    TextMapCompositePropagator::new(propagators)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_propagator_fields() {
        let composite = propagator(&[Propagator::TraceContext, Propagator::Baggage]);
        let fields: Vec<&str> = composite.fields().collect();
        assert!(fields.contains(&"traceparent"));
        assert!(fields.contains(&"baggage"));

        let composite = propagator(&[Propagator::TraceContext]);
        let fields: Vec<&str> = composite.fields().collect();
        assert!(!fields.contains(&"baggage"));
    }
}
