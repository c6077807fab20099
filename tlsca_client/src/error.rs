// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the TLSCA client SDK.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error types for client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The authority rejected the request signature.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// No certificate exists for the identity.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid argument, including unsupported key types.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not implemented by the server.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Building or signing the request failed locally.
    #[error("signing error: {0}")]
    Signing(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Timeout error.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Server unavailable.
    #[error("server unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    /// Get the gRPC status code number for this error.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidArgument(_) => 3,
            Self::Timeout(_) => 4,
            Self::NotFound(_) => 5,
            Self::Unimplemented(_) => 12,
            Self::Internal(_) | Self::Signing(_) => 13,
            Self::Connection(_) | Self::Unavailable(_) => 14,
            Self::Authentication(_) => 16,
        }
    }

    /// Check if this is a retryable error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Unavailable(_)
        )
    }
}

impl From<tonic::Status> for ClientError {
    fn from(status: tonic::Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            tonic::Code::InvalidArgument => Self::InvalidArgument(message),
            tonic::Code::NotFound => Self::NotFound(message),
            tonic::Code::Unauthenticated => Self::Authentication(message),
            tonic::Code::Unimplemented => Self::Unimplemented(message),
            tonic::Code::Unavailable => Self::Unavailable(message),
            tonic::Code::DeadlineExceeded => Self::Timeout(message),
            _ => Self::Internal(message),
        }
    }
}

impl From<tlsca_server::ServerError> for ClientError {
    fn from(err: tlsca_server::ServerError) -> Self {
        Self::Signing(err.to_string())
    }
}
