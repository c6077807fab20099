// SPDX-License-Identifier: MIT OR Apache-2.0
//! OpenTelemetry metrics.
//!
//! Calls are counted per service, method and gRPC status code. Issuance has
//! its own counters so rejected proofs of possession can be told apart from
//! transport level failures.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use tonic::Code;

use crate::error::{Result, ServerError};

const METER_NAME: &str = "tlsca_server";

/// Configuration for metrics collection.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Export over OTLP. When false metrics are recorded and dropped.
    pub enabled: bool,
    /// OTLP gRPC collector endpoint.
    pub otlp_endpoint: String,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// Export interval in seconds.
    pub export_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "tlsca_server".to_string(),
            export_interval_secs: 60,
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable export.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the OTLP endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.otlp_endpoint = endpoint;
        self
    }

    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: String) -> Self {
        self.service_name = name;
        self
    }

    /// Set the export interval in seconds.
    #[must_use]
    pub fn with_export_interval(mut self, secs: u64) -> Self {
        self.export_interval_secs = secs;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.export_interval_secs == 0 {
            return Err(ServerError::Config(
                "metrics export interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Instruments recorded by the server.
pub struct ServerMetrics {
    meter: Meter,
    /// Calls handled, by service, method and status code.
    pub calls: Counter<u64>,
    /// Call latency in milliseconds.
    pub call_latency: Histogram<f64>,
    /// Certificates issued, by requester curve.
    pub certificates_issued: Counter<u64>,
    /// Time spent in the certificate store for successful issuance.
    pub issuance_latency: Histogram<f64>,
    /// Create requests rejected before the store, by reason.
    pub requests_rejected: Counter<u64>,
}

impl ServerMetrics {
    /// Create the instruments on `meter`.
    #[must_use]
    pub fn new(meter: Meter) -> Self {
        let calls = meter
            .u64_counter("tlsca.calls")
            .with_description("gRPC calls handled")
            .build();

        let call_latency = meter
            .f64_histogram("tlsca.call.latency_ms")
            .with_description("gRPC call latency in milliseconds")
            .build();

        let certificates_issued = meter
            .u64_counter("tlsca.certificates.issued")
            .with_description("Certificates issued")
            .build();

        let issuance_latency = meter
            .f64_histogram("tlsca.issuance.latency_ms")
            .with_description("Certificate store issuance latency in milliseconds")
            .build();

        let requests_rejected = meter
            .u64_counter("tlsca.requests.rejected")
            .with_description("Create requests rejected before issuance")
            .build();

        Self {
            meter,
            calls,
            call_latency,
            certificates_issued,
            issuance_latency,
            requests_rejected,
        }
    }

    /// Record one finished call.
    pub fn record_call(&self, service: &str, method: &str, code: Code, latency_ms: f64) {
        let attrs = [
            KeyValue::new("service", service.to_string()),
            KeyValue::new("method", method.to_string()),
            KeyValue::new("code", format!("{code:?}")),
        ];

        self.calls.add(1, &attrs);
        self.call_latency.record(latency_ms, &attrs[..2]);
    }

    /// Record an issued certificate and how long the store took.
    pub fn record_issued(&self, curve: &str, store_latency_ms: f64) {
        let attrs = [KeyValue::new("curve", curve.to_string())];
        self.certificates_issued.add(1, &attrs);
        self.issuance_latency.record(store_latency_ms, &attrs);
    }

    /// Record a create request rejected before the store.
    pub fn record_rejected(&self, reason: &str) {
        self.requests_rejected
            .add(1, &[KeyValue::new("reason", reason.to_string())]);
    }

    /// Underlying meter for extra instruments.
    #[must_use]
    pub fn meter(&self) -> &Meter {
        &self.meter
    }
}

/// Status code of a handler result, for [`ServerMetrics::record_call`].
pub fn outcome<T>(result: &std::result::Result<T, tonic::Status>) -> Code {
    result.as_ref().map_or_else(tonic::Status::code, |_| Code::Ok)
}

/// Keeps the meter provider alive until [`MetricsHandle::shutdown`].
pub struct MetricsHandle {
    provider: SdkMeterProvider,
    metrics: Arc<ServerMetrics>,
}

impl MetricsHandle {
    /// The server's instruments.
    #[must_use]
    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Flush pending data and stop exporting.
    pub fn shutdown(self) -> Result<()> {
        self.provider
            .shutdown()
            .map_err(|e| ServerError::Internal(format!("metrics shutdown failed: {e}")))
    }
}

/// Build the meter provider described by `config`.
pub fn init_metrics(config: &MetricsConfig) -> Result<MetricsHandle> {
    config.validate()?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();
    let builder = SdkMeterProvider::builder().with_resource(resource);

    let provider = if config.enabled {
        let exporter = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(config.otlp_endpoint.clone())
            .build()
            .map_err(|e| ServerError::Config(format!("failed to create OTLP exporter: {e}")))?;

        let reader = PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(config.export_interval_secs))
            .build();

        tracing::info!(
            endpoint = %config.otlp_endpoint,
            service = %config.service_name,
            interval_secs = config.export_interval_secs,
            "Exporting metrics over OTLP"
        );
        builder.with_reader(reader).build()
    } else {
        builder.build()
    };

    let metrics = Arc::new(ServerMetrics::new(provider.meter(METER_NAME)));
    Ok(MetricsHandle { provider, metrics })
}
