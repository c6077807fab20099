// SPDX-License-Identifier: MIT OR Apache-2.0
//! Requester side of the create-request protocol.
//!
//! Builds a [`CertCreateRequest`] for a key pair and signs its canonical
//! digest, producing the decimal `r`/`s` texts the authority expects.

use num_bigint::BigUint;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::pkcs8::EncodePublicKey;
use rand_core::OsRng;

use crate::canonical::signing_digest;
use crate::error::{Result, ServerError};
use crate::key::Curve;
use crate::proto::{CertCreateRequest, CryptoType, Identity, PublicKey, Signature};

/// ECDSA private key used to sign certificate requests.
#[derive(Clone)]
pub enum RequestSigningKey {
    /// P-256 signing key.
    P256(p256::ecdsa::SigningKey),
    /// P-384 signing key.
    P384(p384::ecdsa::SigningKey),
}

impl std::fmt::Debug for RequestSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigningKey")
            .field("curve", &self.curve().as_str())
            .finish_non_exhaustive()
    }
}

impl RequestSigningKey {
    /// Generate a fresh P-384 key.
    #[must_use]
    pub fn generate_p384() -> Self {
        Self::P384(p384::ecdsa::SigningKey::random(&mut OsRng))
    }

    /// Generate a fresh P-256 key.
    #[must_use]
    pub fn generate_p256() -> Self {
        Self::P256(p256::ecdsa::SigningKey::random(&mut OsRng))
    }

    /// Curve of this key.
    #[must_use]
    pub const fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
        }
    }

    /// PKIX DER encoding of the matching public key.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            Self::P256(key) => key.verifying_key().to_public_key_der(),
            Self::P384(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| ServerError::Crypto(format!("public key encoding failed: {e}")))?;

        Ok(doc.as_bytes().to_vec())
    }

    /// Sign a precomputed digest, returning `(r, s)`.
    pub fn sign_digest(&self, digest: &[u8]) -> Result<(BigUint, BigUint)> {
        let (r, s) = match self {
            Self::P256(key) => {
                let sig: p256::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| ServerError::Crypto(format!("signing failed: {e}")))?;
                let (r, s) = sig.split_bytes();
                (r.to_vec(), s.to_vec())
            },
            Self::P384(key) => {
                let sig: p384::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| ServerError::Crypto(format!("signing failed: {e}")))?;
                let (r, s) = sig.split_bytes();
                (r.to_vec(), s.to_vec())
            },
        };

        Ok((BigUint::from_bytes_be(&r), BigUint::from_bytes_be(&s)))
    }

    /// Sign `req` in place, replacing any existing signature.
    pub fn sign_create_request(&self, req: &mut CertCreateRequest) -> Result<()> {
        let digest = signing_digest(req);
        let (r, s) = self.sign_digest(&digest)?;

        req.sig = Some(Signature {
            key_type: CryptoType::Ecdsa.into(),
            r: r.to_str_radix(10).into_bytes(),
            s: s.to_str_radix(10).into_bytes(),
        });
        Ok(())
    }
}

/// Build and sign a create request for `identity`.
pub fn build_create_request(
    identity: &str,
    validity_secs: i64,
    key: &RequestSigningKey,
) -> Result<CertCreateRequest> {
    let mut req = CertCreateRequest {
        ts: Some(prost_types::Timestamp {
            seconds: validity_secs,
            nanos: 0,
        }),
        id: Some(Identity {
            id: identity.to_string(),
        }),
        public_key: Some(PublicKey {
            key_type: CryptoType::Ecdsa.into(),
            key: key.public_key_der()?,
        }),
        sig: None,
    };

    key.sign_create_request(&mut req)?;
    Ok(req)
}
