// SPDX-License-Identifier: MIT OR Apache-2.0
//! Administrative service.
//!
//! Shares the gateway with the public service. Only revocation is exposed.

use std::sync::Arc;
use std::time::Instant;

use tonic::{Request, Response, Status};

use crate::correlation::start_request_span;
use crate::gateway::{CallOrigin, IssuanceGateway};
use crate::metrics::{outcome, ServerMetrics};
use crate::proto::{tlsca_admin_server::TlscaAdmin, CaStatus, CertRevokeRequest};

const SERVICE: &str = "TlscaAdmin";

/// Implementation of the `TlscaAdmin` gRPC service.
pub struct TlscaAdminService {
    gateway: Arc<IssuanceGateway>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl TlscaAdminService {
    /// Create an admin service over a shared gateway.
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
}

#[tonic::async_trait]
impl TlscaAdmin for TlscaAdminService {
    #[allow(clippy::cast_precision_loss)]
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
                    .revoke_certificate_as(CallOrigin::admin(span.peer()))
            })
            .map_err(Status::from);

        if let Some(ref m) = self.metrics {
            let latency_ms = start.elapsed().as_micros() as f64 / 1000.0;
            m.record_call(SERVICE, "revoke_certificate", outcome(&result), latency_ms);
        }
        span.finish(result)
    }
}
