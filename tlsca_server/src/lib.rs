// SPDX-License-Identifier: MIT OR Apache-2.0
//! TLSCA gRPC Server
//!
//! A TLS certificate authority that only issues certificates to requesters
//! who prove possession of the private key. A create request carries its own
//! public key and an ECDSA signature over the SHA3-384 digest of the
//! request's canonical encoding; the signature is verified before anything
//! reaches the certificate store.
//!
//! Two services share one [`IssuanceGateway`]:
//!
//! - `tlsca.v1.TlscaPublic` - root certificate, enrollment, lookup
//! - `tlsca.v1.TlscaAdmin` - revocation (not yet implemented)
//!
//! # Example
//!
//! ```ignore
//! use tlsca_server::{ServerConfig, TlscaServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = TlscaServer::bootstrap(ServerConfig::default())?;
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rustdoc::broken_intra_doc_links
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::result_large_err)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::future_not_send)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::use_self)]

pub mod audit;
pub mod authority;
pub mod canonical;
pub mod config;
pub mod correlation;
pub mod decode;
pub mod error;
pub mod gateway;
pub mod key;
pub mod metrics;
pub mod service;
pub mod signer;
pub mod store;
pub mod verify;

/// Generated protobuf types.
#[allow(missing_docs)]
#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
pub mod proto {
    tonic::include_proto!("tlsca.v1");

    /// File descriptor set for reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("tlsca_descriptor");
}

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tonic::transport::Server;

pub use audit::{AuditConfig, AuditEntry, AuditEvent, AuditLogger};
pub use authority::{AuthorityIdentity, CertificateAuthority};
pub use config::{AuthorityConfig, ServerConfig};
pub use correlation::{extract_or_generate, request_span, RequestSpan, TRACE_ID_HEADER};
pub use error::{Result, ServerError, StoreError, StoreResult, NOT_YET_IMPLEMENTED};
pub use gateway::{CallOrigin, IssuanceGateway};
pub use key::{Curve, RequesterKey};
pub use metrics::{init_metrics, MetricsConfig, MetricsHandle, ServerMetrics};
pub use service::{
    HealthServiceImpl, HealthState, TlscaAdminService, TlscaPublicService, TlscaService,
};
pub use signer::{build_create_request, RequestSigningKey};
pub use store::{CertificateStore, KeyUsage, MemoryCertificateStore};

use proto::health_server::HealthServer;
use proto::tlsca_admin_server::TlscaAdminServer;
use proto::tlsca_public_server::TlscaPublicServer;

/// The TLSCA gRPC server.
pub struct TlscaServer {
    gateway: IssuanceGateway,
    config: ServerConfig,
    audit_logger: Option<Arc<AuditLogger>>,
    metrics: Option<Arc<ServerMetrics>>,
    health_state: Arc<HealthState>,
}

impl TlscaServer {
    /// Create a server around an existing gateway.
    ///
    /// An audit logger is attached when the configuration enables one.
    #[must_use]
    pub fn new(gateway: IssuanceGateway, config: ServerConfig) -> Self {
        let audit_logger = config
            .audit
            .as_ref()
            .map(|c| Arc::new(AuditLogger::new(c.clone())));

        let gateway = match &audit_logger {
            Some(audit) => gateway.with_audit(Arc::clone(audit)),
            None => gateway,
        };

        Self {
            gateway,
            config,
            audit_logger,
            metrics: None,
            health_state: Arc::new(HealthState::new()),
        }
    }

    /// Generate a fresh authority and serve it from an in-memory store.
    pub fn bootstrap(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let authority = CertificateAuthority::generate(&config.authority)?;
        let identity = authority.identity().clone();
        let store = MemoryCertificateStore::new(Arc::new(authority), config.authority.max_validity_secs);

        Ok(Self::new(IssuanceGateway::new(identity, Arc::new(store)), config))
    }

    /// Set the metrics for the server.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.gateway = self.gateway.with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    /// Get the gateway.
    #[must_use]
    pub const fn gateway(&self) -> &IssuanceGateway {
        &self.gateway
    }

    /// Get the audit logger, if configured.
    #[must_use]
    pub const fn audit_logger(&self) -> Option<&Arc<AuditLogger>> {
        self.audit_logger.as_ref()
    }

    /// Get the shared health state.
    #[must_use]
    pub const fn health_state(&self) -> &Arc<HealthState> {
        &self.health_state
    }

    /// Start the gRPC server.
    ///
    /// This method blocks until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server shuts down when `shutdown` completes. Both façades report
    /// `NOT_SERVING` from then on while in-flight calls drain. With a separate
    /// admin listener configured, both listeners stop together.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.config.validate()?;

        let addr = self.config.bind_addr;
        let request_timeout = self.config.request_timeout;
        let gateway = Arc::new(self.gateway);

        let mut public_service = TlscaPublicService::new(Arc::clone(&gateway));
        let mut admin_service = TlscaAdminService::new(Arc::clone(&gateway));
        if let Some(ref metrics) = self.metrics {
            public_service = public_service.with_metrics(Arc::clone(metrics));
            admin_service = admin_service.with_metrics(Arc::clone(metrics));
        }

        let health_service = HealthServiceImpl::with_state(Arc::clone(&self.health_state));

        let health = Arc::clone(&self.health_state);
        let shutdown = async move {
            shutdown.await;
            tracing::info!("Shutdown requested, draining");
            health.set_serving(TlscaService::Public, false);
            health.set_serving(TlscaService::Admin, false);
        };

        let public_svc = TlscaPublicServer::new(public_service);
        let admin_svc = TlscaAdminServer::new(admin_service);

        let reflection_svc = if self.config.enable_reflection {
            tracing::info!("Reflection service enabled");
            Some(
                tonic_reflection::server::Builder::configure()
                    .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
                    .build_v1()
                    .map_err(|e| {
                        ServerError::Internal(format!("Failed to build reflection service: {e}"))
                    })?,
            )
        } else {
            None
        };

        let mut router = server_builder(request_timeout)
            .add_service(public_svc)
            .add_service(HealthServer::new(health_service.clone()));
        if let Some(refl) = reflection_svc {
            router = router.add_service(refl);
        }

        match self.config.admin_bind_addr {
            None => {
                tracing::info!(%addr, authority = %gateway.authority().name(), "Starting TLSCA gRPC server");
                router
                    .add_service(admin_svc)
                    .serve_with_shutdown(addr, shutdown)
                    .await?;
            },
            Some(admin_addr) => {
                tracing::info!(
                    %addr,
                    %admin_addr,
                    authority = %gateway.authority().name(),
                    "Starting TLSCA gRPC server with separate admin listener"
                );

                let (stop_tx, stop_rx) = watch::channel(false);

                let admin_router = server_builder(request_timeout)
                    .add_service(admin_svc)
                    .add_service(HealthServer::new(health_service));

                let trigger = async move {
                    shutdown.await;
                    let _ = stop_tx.send(true);
                    Ok::<(), tonic::transport::Error>(())
                };

                tokio::try_join!(
                    router.serve_with_shutdown(addr, stopped(stop_rx.clone())),
                    admin_router.serve_with_shutdown(admin_addr, stopped(stop_rx)),
                    trigger,
                )?;
            },
        }

        tracing::info!("TLSCA gRPC server stopped");
        Ok(())
    }

    /// Addresses this server listens on.
    #[must_use]
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        std::iter::once(self.config.bind_addr)
            .chain(self.config.admin_bind_addr)
            .collect()
    }
}

fn server_builder(request_timeout: Option<Duration>) -> Server {
    let builder = Server::builder();
    match request_timeout {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    #[test]
    fn test_bootstrap_default() {
        let server = TlscaServer::bootstrap(ServerConfig::default()).unwrap();
        assert_eq!(server.gateway().authority().name(), "tlsca");
        assert!(!server.gateway().read_ca_certificate().cert.is_empty());
        assert!(server.audit_logger().is_none());
        assert!(server.health_state().is_all_serving());
    }

    #[test]
    fn test_bootstrap_with_audit() {
        let config = ServerConfig::default().with_audit(AuditConfig::default());
        let server = TlscaServer::bootstrap(config).unwrap();

        let audit = server.audit_logger().unwrap();
        assert!(Arc::ptr_eq(audit, server.gateway().audit().unwrap()));
    }

    #[test]
    fn test_bootstrap_rejects_invalid_config() {
        let config =
            ServerConfig::default().with_authority(AuthorityConfig::new().with_common_name(""));
        assert!(TlscaServer::bootstrap(config).is_err());
    }

    #[test]
    fn test_listen_addrs() {
        let config = ServerConfig::default()
            .with_bind_addr("127.0.0.1:7054".parse().unwrap())
            .with_admin_bind_addr("127.0.0.1:7055".parse().unwrap());
        let server = TlscaServer::bootstrap(config).unwrap();
        assert_eq!(server.listen_addrs().len(), 2);
    }

    #[test]
    fn test_server_with_metrics() {
        let provider = SdkMeterProvider::builder().build();
        let metrics = Arc::new(ServerMetrics::new(provider.meter("test")));

        let server = TlscaServer::bootstrap(ServerConfig::default())
            .unwrap()
            .with_metrics(Arc::clone(&metrics));

        assert!(Arc::ptr_eq(server.metrics.as_ref().unwrap(), &metrics));
    }

    #[tokio::test]
    async fn test_serve_with_invalid_config() {
        let mut server = TlscaServer::bootstrap(ServerConfig::default()).unwrap();
        server.config.request_timeout = Some(Duration::ZERO);

        assert!(server.serve().await.is_err());
    }

    async fn assert_shutdown_stops_serving(separate_admin: bool) {
        let mut config = ServerConfig::default().with_bind_addr(free_addr().await);
        if separate_admin {
            config = config.with_admin_bind_addr(free_addr().await);
        }

        let server = TlscaServer::bootstrap(config).unwrap();
        let health = Arc::clone(server.health_state());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = rx.await;
        }));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(health.is_all_serving());

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert!(!health.is_serving(TlscaService::Public));
        assert!(!health.is_serving(TlscaService::Admin));
    }

    async fn free_addr() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_marks_facades_not_serving() {
        assert_shutdown_stops_serving(false).await;
    }

    #[tokio::test]
    async fn test_shutdown_marks_facades_not_serving_with_admin_listener() {
        assert_shutdown_stops_serving(true).await;
    }

    #[tokio::test]
    async fn test_stopped_resolves_on_signal() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(stopped(rx));
        tx.send(true).unwrap();
        waiter.await.unwrap();

        // A dropped sender also releases waiters
        let (tx, rx) = watch::channel(false);
        drop(tx);
        stopped(rx).await;
    }
}
