// SPDX-License-Identifier: MIT OR Apache-2.0
//! Issuance gateway.
//!
//! Decodes a request, proves the requester holds the private key, and only
//! then hands the request to the certificate store. Any failure before the
//! store call leaves the store untouched.

use std::sync::Arc;
use std::time::Instant;

use crate::audit::{AuditEvent, AuditLogger};
use crate::authority::AuthorityIdentity;
use crate::decode::{decode_create_request, decode_read_request};
use crate::error::{Result, ServerError, StoreError};
use crate::metrics::ServerMetrics;
use crate::proto::{CaStatus, Cert, CertCreateRequest, CertCreateResponse, CertReadRequest};
use crate::store::{CertificateStore, KeyUsage};
use crate::verify::verify_create_request;

/// Where a call came from, for audit records.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOrigin<'a> {
    /// Remote peer address, if known.
    pub remote_addr: Option<&'a str>,
    /// Whether the call arrived on the admin service.
    pub admin: bool,
}

impl<'a> CallOrigin<'a> {
    /// Origin on the public service.
    #[must_use]
    pub const fn public(remote_addr: Option<&'a str>) -> Self {
        Self {
            remote_addr,
            admin: false,
        }
    }

    /// Origin on the admin service.
    #[must_use]
    pub const fn admin(remote_addr: Option<&'a str>) -> Self {
        Self {
            remote_addr,
            admin: true,
        }
    }
}

/// Authenticates certificate requests and forwards them to a store.
pub struct IssuanceGateway {
    authority: AuthorityIdentity,
    store: Arc<dyn CertificateStore>,
    audit: Option<Arc<AuditLogger>>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl std::fmt::Debug for IssuanceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuanceGateway")
            .field("authority", &self.authority.name())
            .field("audit", &self.audit.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl IssuanceGateway {
    /// Create a gateway for `authority` issuing through `store`.
    #[must_use]
    pub fn new(authority: AuthorityIdentity, store: Arc<dyn CertificateStore>) -> Self {
        Self {
            authority,
            store,
            audit: None,
            metrics: None,
        }
    }

    /// Record security events to `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Record issuance counters to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Authority identity served by this gateway.
    #[must_use]
    pub const fn authority(&self) -> &AuthorityIdentity {
        &self.authority
    }

    /// Audit logger, if configured.
    #[must_use]
    pub const fn audit(&self) -> Option<&Arc<AuditLogger>> {
        self.audit.as_ref()
    }

    /// The authority's root certificate.
    #[must_use]
    pub fn read_ca_certificate(&self) -> Cert {
        Cert {
            cert: self.authority.root_certificate_der().to_vec(),
        }
    }

    /// Verify and issue a certificate for a create request.
    pub async fn create_certificate(&self, req: CertCreateRequest) -> Result<CertCreateResponse> {
        self.create_certificate_as(req, CallOrigin::default()).await
    }

    /// [`Self::create_certificate`] with the caller's origin recorded.
    pub async fn create_certificate_as(
        &self,
        req: CertCreateRequest,
        origin: CallOrigin<'_>,
    ) -> Result<CertCreateResponse> {
        let decoded = match decode_create_request(&req) {
            Ok(decoded) => decoded,
            Err(err) => {
                if let ServerError::UnsupportedKeyType(key_type) = err {
                    tracing::warn!(key_type, "Rejected create request with unsupported key type");
                    self.record_rejected("unsupported_key");
                    self.record_audit(
                        AuditEvent::UnsupportedKeyRejected {
                            identity: req.id.as_ref().map(|id| id.id.clone()),
                            key_type,
                        },
                        origin,
                    );
                } else {
                    tracing::debug!(error = %err, "Rejected malformed create request");
                    self.record_rejected("malformed");
                }
                return Err(err);
            },
        };

        if let Err(err) = verify_create_request(&req, &decoded.public_key) {
            tracing::warn!(
                identity = %decoded.identity,
                curve = decoded.public_key.curve().as_str(),
                "Create request signature does not verify"
            );
            self.record_rejected("signature");
            self.record_audit(
                AuditEvent::SignatureRejected {
                    identity: decoded.identity,
                },
                origin,
            );
            return Err(err);
        }

        let store_start = Instant::now();
        let cert = match self
            .store
            .create_certificate(
                &decoded.identity,
                &decoded.public_key,
                KeyUsage::KeyAgreement,
                decoded.validity_secs,
            )
            .await
        {
            Ok(cert) => cert,
            Err(err) => {
                tracing::error!(
                    identity = %decoded.identity,
                    error = %err,
                    "Certificate store failed to issue"
                );
                self.record_audit(
                    AuditEvent::StoreFailure {
                        identity: decoded.identity,
                        reason: err.to_string(),
                    },
                    origin,
                );
                return Err(err.into());
            },
        };

        let curve = decoded.public_key.curve().as_str();
        tracing::info!(
            identity = %decoded.identity,
            curve,
            validity_secs = decoded.validity_secs,
            "Certificate issued"
        );
        if let Some(metrics) = &self.metrics {
            #[allow(clippy::cast_precision_loss)]
            let store_latency_ms = store_start.elapsed().as_micros() as f64 / 1000.0;
            metrics.record_issued(curve, store_latency_ms);
        }
        self.record_audit(
            AuditEvent::CertificateIssued {
                identity: decoded.identity,
                curve: curve.to_string(),
                validity_secs: decoded.validity_secs,
            },
            origin,
        );

        Ok(CertCreateResponse {
            cert: Some(Cert { cert }),
        })
    }

    /// Look up the latest certificate for the request's identity.
    ///
    /// The request signature is not checked.
    pub async fn read_certificate(&self, req: &CertReadRequest) -> Result<Cert> {
        self.read_certificate_as(req, CallOrigin::default()).await
    }

    /// [`Self::read_certificate`] with the caller's origin recorded.
    pub async fn read_certificate_as(
        &self,
        req: &CertReadRequest,
        origin: CallOrigin<'_>,
    ) -> Result<Cert> {
        let identity = decode_read_request(req)?;

        let cert = match self
            .store
            .read_certificate(&identity, KeyUsage::KeyAgreement)
            .await
        {
            Ok(cert) => cert,
            Err(err @ StoreError::NotFound(_)) => {
                tracing::debug!(identity = %identity, "No certificate on record");
                return Err(err.into());
            },
            Err(err) => {
                tracing::error!(
                    identity = %identity,
                    error = %err,
                    "Certificate store failed to look up"
                );
                self.record_audit(
                    AuditEvent::StoreFailure {
                        identity,
                        reason: err.to_string(),
                    },
                    origin,
                );
                return Err(err.into());
            },
        };

        self.record_audit(AuditEvent::CertificateRead { identity }, origin);
        Ok(Cert { cert })
    }

    /// Revocation has no implementation and never touches the store.
    pub fn revoke_certificate(&self) -> Result<CaStatus> {
        self.revoke_certificate_as(CallOrigin::default())
    }

    /// [`Self::revoke_certificate`] with the caller's origin recorded.
    pub fn revoke_certificate_as(&self, origin: CallOrigin<'_>) -> Result<CaStatus> {
        tracing::debug!(admin = origin.admin, "Revoke requested");
        self.record_audit(
            AuditEvent::RevokeAttempted {
                admin: origin.admin,
            },
            origin,
        );
        Err(ServerError::NotImplemented)
    }

    fn record_audit(&self, event: AuditEvent, origin: CallOrigin<'_>) {
        if let Some(audit) = &self.audit {
            audit.record(event, origin.remote_addr);
        }
    }

    fn record_rejected(&self, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rejected(reason);
        }
    }
}
