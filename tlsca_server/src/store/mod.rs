// SPDX-License-Identifier: MIT OR Apache-2.0
//! Certificate storage.
//!
//! The gateway only reaches a store after a request has been authenticated,
//! so implementations can treat every call as authorized.

mod memory;

use async_trait::async_trait;
use rcgen::KeyUsagePurpose;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::key::RequesterKey;

pub use memory::MemoryCertificateStore;

/// Intended use of the key bound into an issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyUsage {
    /// Signing.
    DigitalSignature,
    /// Key transport.
    KeyEncipherment,
    /// Key agreement, used for TLS certificates.
    KeyAgreement,
    /// Certificate signing.
    CertSign,
}

impl KeyUsage {
    /// Name as used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DigitalSignature => "digital_signature",
            Self::KeyEncipherment => "key_encipherment",
            Self::KeyAgreement => "key_agreement",
            Self::CertSign => "cert_sign",
        }
    }

    pub(crate) const fn purpose(self) -> KeyUsagePurpose {
        match self {
            Self::DigitalSignature => KeyUsagePurpose::DigitalSignature,
            Self::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
            Self::KeyAgreement => KeyUsagePurpose::KeyAgreement,
            Self::CertSign => KeyUsagePurpose::KeyCertSign,
        }
    }
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues and looks up certificates.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Issue a certificate for `identity` over `public_key`.
    ///
    /// Returns the DER encoded certificate.
    async fn create_certificate(
        &self,
        identity: &str,
        public_key: &RequesterKey,
        usage: KeyUsage,
        validity_secs: i64,
    ) -> StoreResult<Vec<u8>>;

    /// Latest certificate issued for `identity` with `usage`.
    async fn read_certificate(&self, identity: &str, usage: KeyUsage) -> StoreResult<Vec<u8>>;
}
