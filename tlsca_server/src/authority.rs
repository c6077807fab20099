// SPDX-License-Identifier: MIT OR Apache-2.0
//! Root certificate authority material.
//!
//! The authority owns a P-384 root key and its self-signed certificate, and
//! signs leaf certificates for requester keys. Bookkeeping of what has been
//! issued belongs to the certificate store.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber, SubjectPublicKeyInfo,
};
use time::{Duration, OffsetDateTime};

use crate::config::AuthorityConfig;
use crate::error::{Result, ServerError, StoreError, StoreResult};
use crate::key::RequesterKey;
use crate::store::KeyUsage;

/// Latest expiry a certificate can encode, 9999-12-31T23:59:59Z.
pub const LATEST_NOT_AFTER: i64 = 253_402_300_799;

/// Expiry `span` after `start`, or `None` when it falls past
/// [`LATEST_NOT_AFTER`].
pub(crate) fn expiry(start: OffsetDateTime, span: Duration) -> Option<OffsetDateTime> {
    start
        .checked_add(span)
        .filter(|at| at.unix_timestamp() <= LATEST_NOT_AFTER)
}

/// Public identity of the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityIdentity {
    name: String,
    root_certificate_der: Vec<u8>,
}

impl AuthorityIdentity {
    /// Create an identity from a name and a DER root certificate.
    #[must_use]
    pub fn new(name: impl Into<String>, root_certificate_der: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            root_certificate_der,
        }
    }

    /// Authority name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// DER encoded root certificate.
    #[must_use]
    pub fn root_certificate_der(&self) -> &[u8] {
        &self.root_certificate_der
    }
}

/// Certificate authority holding the root signing key.
pub struct CertificateAuthority {
    identity: AuthorityIdentity,
    organization: String,
    certificate: Certificate,
    key_pair: KeyPair,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("name", &self.identity.name)
            .field("organization", &self.organization)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Generate a fresh root key and self-signed root certificate.
    pub fn generate(config: &AuthorityConfig) -> Result<Self> {
        config.validate()?;

        let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384)
            .map_err(|e| ServerError::Crypto(format!("CA key generation failed: {e}")))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(&config.common_name, &config.organization);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.serial_number = Some(SerialNumber::from(1u64));

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = expiry(now, Duration::days(i64::from(config.root_validity_days)))
            .ok_or_else(|| {
                ServerError::Config(format!(
                    "root_validity_days {} runs past year 9999",
                    config.root_validity_days
                ))
            })?;

        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| ServerError::Crypto(format!("CA certificate generation failed: {e}")))?;

        let identity = AuthorityIdentity::new(&config.common_name, certificate.der().to_vec());

        tracing::info!(
            name = %config.common_name,
            organization = %config.organization,
            validity_days = config.root_validity_days,
            "Certificate authority initialized"
        );

        Ok(Self {
            identity,
            organization: config.organization.clone(),
            certificate,
            key_pair,
        })
    }

    /// Public identity of this authority.
    #[must_use]
    pub const fn identity(&self) -> &AuthorityIdentity {
        &self.identity
    }

    /// Sign a leaf certificate binding `identity` to `public_key`.
    ///
    /// The certificate is valid from now for `validity_secs` seconds. A
    /// validity that would end past [`LATEST_NOT_AFTER`] is rejected with
    /// [`StoreError::InvalidValidity`].
    pub fn issue(
        &self,
        identity: &str,
        public_key: &RequesterKey,
        usage: KeyUsage,
        serial: u64,
        validity_secs: i64,
    ) -> StoreResult<Vec<u8>> {
        let spki_der = public_key
            .to_spki_der()
            .map_err(|e| StoreError::Signing(e.to_string()))?;
        let subject_key = SubjectPublicKeyInfo::from_der(&spki_der)
            .map_err(|e| StoreError::Signing(format!("subject key rejected: {e}")))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(identity, &self.organization);
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![usage.purpose()];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.serial_number = Some(SerialNumber::from(serial));

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = expiry(now, Duration::seconds(validity_secs)).ok_or_else(|| {
            StoreError::InvalidValidity(format!("{validity_secs}s runs past year 9999"))
        })?;

        let cert = params
            .signed_by(&subject_key, &self.certificate, &self.key_pair)
            .map_err(|e| StoreError::Signing(e.to_string()))?;

        Ok(cert.der().to_vec())
    }
}

fn distinguished_name(common_name: &str, organization: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    if !organization.is_empty() {
        dn.push(DnType::OrganizationName, organization);
    }
    dn
}
