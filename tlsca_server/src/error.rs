// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the TLS certificate authority.

use thiserror::Error;
use tonic::Status;

/// Message returned by every revocation endpoint.
pub const NOT_YET_IMPLEMENTED: &str = "not yet implemented";

/// Server error type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Malformed request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request names a key algorithm this authority does not accept.
    #[error("unsupported key type")]
    UnsupportedKeyType(i32),

    /// The public key bytes are not a usable PKIX encoded key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The request signature did not verify against the embedded key.
    #[error("signature does not verify")]
    SignatureInvalid,

    /// The certificate store rejected or failed the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Operation exists on the interface but has no implementation.
    #[error("not yet implemented")]
    NotImplemented,

    /// Key handling or signing failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a certificate store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// No certificate exists for the identity and key usage.
    #[error("certificate not found: {0}")]
    NotFound(String),

    /// The requested validity period is outside what the store accepts.
    #[error("invalid validity period: {0}")]
    InvalidValidity(String),

    /// Certificate generation or signing failed.
    #[error("certificate signing failed: {0}")]
    Signing(String),

    /// Backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl ServerError {
    /// Whether the failure was caused by the client's request.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::UnsupportedKeyType(_)
                | Self::InvalidPublicKey(_)
                | Self::SignatureInvalid
                | Self::Store(StoreError::NotFound(_) | StoreError::InvalidValidity(_))
        )
    }
}

impl From<ServerError> for Status {
    fn from(err: ServerError) -> Self {
        match &err {
            ServerError::Config(msg) => Status::invalid_argument(msg.clone()),
            ServerError::Transport(e) => Status::unavailable(e.to_string()),
            ServerError::InvalidArgument(_)
            | ServerError::UnsupportedKeyType(_)
            | ServerError::InvalidPublicKey(_) => Status::invalid_argument(err.to_string()),
            ServerError::SignatureInvalid => Status::unauthenticated(err.to_string()),
            ServerError::Store(store) => match store {
                StoreError::NotFound(_) => Status::not_found(store.to_string()),
                StoreError::InvalidValidity(_) => Status::invalid_argument(store.to_string()),
                _ => Status::internal(store.to_string()),
            },
            ServerError::NotImplemented => Status::unimplemented(NOT_YET_IMPLEMENTED),
            ServerError::Crypto(msg) | ServerError::Internal(msg) => Status::internal(msg.clone()),
            ServerError::Io(e) => Status::internal(e.to_string()),
        }
    }
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Result type alias for certificate store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
