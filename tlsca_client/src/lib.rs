// SPDX-License-Identifier: MIT OR Apache-2.0
//! TLSCA Rust Client SDK
//!
//! Builds and signs certificate requests locally and sends them to a TLSCA
//! server. The private key never leaves the caller; only the public key and
//! the signature over the request travel on the wire.
//!
//! # Example
//!
//! ```ignore
//! use tlsca_client::{RequestSigningKey, TlscaClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TlscaClient::connect("localhost:7054")
//!         .timeout_ms(5_000)
//!         .build()
//!         .await?;
//!
//!     let key = RequestSigningKey::generate_p384();
//!     let cert_der = client.create_certificate("alice", &key, 3600).await?;
//!     println!("issued {} bytes", cert_der.len());
//!
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
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]

mod error;

use std::time::Duration;

use tonic::transport::Channel;

pub use error::{ClientError, Result};
pub use tlsca_server::proto;
pub use tlsca_server::{build_create_request, Curve, RequestSigningKey};

use proto::tlsca_admin_client::TlscaAdminClient as AdminGrpcClient;
use proto::tlsca_public_client::TlscaPublicClient as PublicGrpcClient;
use proto::{CertCreateRequest, CertReadRequest, CertRevokeRequest, Empty, Identity};

/// Configuration for connecting to a server.
///
/// Connections are plaintext HTTP/2. The server exposes no TLS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address.
    pub address: String,
    /// Request and connection timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "localhost:7054".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    fn for_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

/// Builder for a [`TlscaClient`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new builder with the given server address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::for_address(address),
        }
    }

    /// Set the request and connection timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Get the configuration being built.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect a public service client.
    pub async fn build(self) -> Result<TlscaClient> {
        let channel = connect_channel(&self.config).await?;
        Ok(TlscaClient {
            inner: PublicGrpcClient::new(channel),
            config: self.config,
        })
    }
}

/// Builder for a [`TlscaAdminClient`].
#[derive(Debug, Clone)]
pub struct AdminClientBuilder {
    config: ClientConfig,
}

impl AdminClientBuilder {
    /// Create a new builder with the given admin listener address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::for_address(address),
        }
    }

    /// Set the request and connection timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Get the configuration being built.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect an admin service client.
    pub async fn build(self) -> Result<TlscaAdminClient> {
        let channel = connect_channel(&self.config).await?;
        Ok(TlscaAdminClient {
            inner: AdminGrpcClient::new(channel),
            config: self.config,
        })
    }
}

async fn connect_channel(config: &ClientConfig) -> Result<Channel> {
    tracing::info!("Connecting to {}", config.address);

    let uri = format!("http://{}", config.address);
    Channel::from_shared(uri)
        .map_err(|e| ClientError::Connection(format!("Invalid URI: {e}")))?
        .timeout(Duration::from_millis(config.timeout_ms))
        .connect_timeout(Duration::from_millis(config.timeout_ms))
        .connect()
        .await
        .map_err(|e| ClientError::Connection(format!("Failed to connect: {e}")))
}

/// Client for the public enrollment service.
#[derive(Debug, Clone)]
pub struct TlscaClient {
    inner: PublicGrpcClient<Channel>,
    config: ClientConfig,
}

impl TlscaClient {
    /// Create a builder for connecting to a server.
    #[must_use]
    pub fn connect(address: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(address)
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch the authority's DER encoded root certificate.
    pub async fn read_ca_certificate(&self) -> Result<Vec<u8>> {
        let mut client = self.inner.clone();
        let response = client.read_ca_certificate(Empty {}).await?;
        Ok(response.into_inner().cert)
    }

    /// Request a certificate for `identity` bound to `key`'s public half.
    ///
    /// The request is signed locally with `key`. Returns the DER encoded
    /// certificate.
    pub async fn create_certificate(
        &self,
        identity: &str,
        key: &RequestSigningKey,
        validity_secs: i64,
    ) -> Result<Vec<u8>> {
        let request = build_create_request(identity, validity_secs, key)?;
        self.send_create_request(request).await
    }

    /// Send a prebuilt create request as-is.
    pub async fn send_create_request(&self, request: CertCreateRequest) -> Result<Vec<u8>> {
        let mut client = self.inner.clone();
        let response = client.create_certificate(request).await?.into_inner();

        response
            .cert
            .map(|cert| cert.cert)
            .ok_or_else(|| ClientError::Internal("response carried no certificate".to_string()))
    }

    /// Fetch the latest certificate issued to `identity`.
    pub async fn read_certificate(&self, identity: &str) -> Result<Vec<u8>> {
        let mut client = self.inner.clone();
        let request = CertReadRequest {
            id: Some(Identity {
                id: identity.to_string(),
            }),
            ..CertReadRequest::default()
        };

        Ok(client.read_certificate(request).await?.into_inner().cert)
    }

    /// Ask the public service to revoke a certificate.
    ///
    /// Servers currently answer with an unimplemented error.
    pub async fn revoke_certificate(&self) -> Result<()> {
        let mut client = self.inner.clone();
        client.revoke_certificate(CertRevokeRequest::default()).await?;
        Ok(())
    }
}

/// Client for the administrative service.
#[derive(Debug, Clone)]
pub struct TlscaAdminClient {
    inner: AdminGrpcClient<Channel>,
    config: ClientConfig,
}

impl TlscaAdminClient {
    /// Create a builder for connecting to an admin listener.
    #[must_use]
    pub fn connect(address: impl Into<String>) -> AdminClientBuilder {
        AdminClientBuilder::new(address)
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Revoke a certificate.
    ///
    /// Servers currently answer with an unimplemented error.
    pub async fn revoke_certificate(&self) -> Result<()> {
        let mut client = self.inner.clone();
        client.revoke_certificate(CertRevokeRequest::default()).await?;
        Ok(())
    }
}
