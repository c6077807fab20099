// SPDX-License-Identifier: MIT OR Apache-2.0
//! Public enrollment service.

use std::sync::Arc;
use std::time::Instant;

use tonic::{Code, Request, Response, Status};
use tracing::Instrument;

use crate::correlation::start_request_span;
use crate::gateway::{CallOrigin, IssuanceGateway};
use crate::metrics::{outcome, ServerMetrics};
use crate::proto::{
    tlsca_public_server::TlscaPublic, CaStatus, Cert, CertCreateRequest, CertCreateResponse,
    CertReadRequest, CertRevokeRequest, Empty,
};

const SERVICE: &str = "TlscaPublic";

/// Implementation of the `TlscaPublic` gRPC service.
pub struct TlscaPublicService {
    gateway: Arc<IssuanceGateway>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl TlscaPublicService {
    /// Create a public service over a shared gateway.
    #[must_use]
    pub fn new(gateway: Arc<IssuanceGateway>) -> Self {
        Self {
            gateway,
            metrics: None,
        }
    }

    /// Record request metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[allow(clippy::cast_precision_loss)]
    fn record(&self, method: &str, code: Code, start: Instant) {
        if let Some(ref m) = self.metrics {
            let latency_ms = start.elapsed().as_micros() as f64 / 1000.0;
            m.record_call(SERVICE, method, code, latency_ms);
        }
    }
}

#[tonic::async_trait]
impl TlscaPublic for TlscaPublicService {
    async fn read_ca_certificate(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<Cert>, Status> {
        let start = Instant::now();
        let span = start_request_span(&request, SERVICE, "read_ca_certificate");

        let cert = span.span().in_scope(|| self.gateway.read_ca_certificate());

        self.record("read_ca_certificate", Code::Ok, start);
        Ok(span.into_response(cert))
    }

    async fn create_certificate(
        &self,
        request: Request<CertCreateRequest>,
    ) -> Result<Response<CertCreateResponse>, Status> {
        let start = Instant::now();
        let span = start_request_span(&request, SERVICE, "create_certificate");

        let result = self
            .gateway
            .create_certificate_as(request.into_inner(), CallOrigin::public(span.peer()))
            .instrument(span.span().clone())
            .await
            .map_err(Status::from);

        self.record("create_certificate", outcome(&result), start);
        span.finish(result)
    }

    async fn read_certificate(
        &self,
        request: Request<CertReadRequest>,
    ) -> Result<Response<Cert>, Status> {
        let start = Instant::now();
        let span = start_request_span(&request, SERVICE, "read_certificate");
        let req = request.into_inner();

        let result = self
            .gateway
            .read_certificate_as(&req, CallOrigin::public(span.peer()))
            .instrument(span.span().clone())
            .await
            .map_err(Status::from);

        self.record("read_certificate", outcome(&result), start);
        span.finish(result)
    }

    async fn revoke_certificate(
        &self,
        request: Request<CertRevokeRequest>,
    ) -> Result<Response<CaStatus>, Status> {
        let start = Instant::now();
        let span = start_request_span(&request, SERVICE, "revoke_certificate");

        let result = span
            .span()
            .in_scope(|| {
                self.gateway
                    .revoke_certificate_as(CallOrigin::public(span.peer()))
            })
            .map_err(Status::from);

        self.record("revoke_certificate", outcome(&result), start);
        span.finish(result)
    }
}
