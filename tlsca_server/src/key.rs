// SPDX-License-Identifier: MIT OR Apache-2.0
//! Requester public keys carried inside certificate requests.
//!
//! Only NIST P-256 and P-384 keys are accepted. Other curves, P-521
//! included, are rejected as [`ServerError::InvalidPublicKey`] while the
//! request is decoded, before any signature work.

use num_bigint::BigUint;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};

use crate::error::{Result, ServerError};

/// Elliptic curves accepted for requester keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    /// NIST P-256.
    P256,
    /// NIST P-384.
    P384,
}

impl Curve {
    /// Size of a scalar of this curve in bytes.
    #[must_use]
    pub const fn scalar_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
        }
    }

    /// Curve name as used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
        }
    }
}

/// An ECDSA public key decoded from PKIX DER.
///
/// Owned by a single verification call; the store receives it by reference
/// once the request has been authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequesterKey {
    /// P-256 verifying key.
    P256(p256::ecdsa::VerifyingKey),
    /// P-384 verifying key.
    P384(p384::ecdsa::VerifyingKey),
}

impl RequesterKey {
    /// Decode a SubjectPublicKeyInfo DER blob.
    ///
    /// The curve is taken from the algorithm parameters inside the blob.
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        if der.is_empty() {
            return Err(ServerError::InvalidPublicKey("empty key".to_string()));
        }

        if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(Self::P384(key));
        }

        p256::ecdsa::VerifyingKey::from_public_key_der(der)
            .map(Self::P256)
            .map_err(|e| ServerError::InvalidPublicKey(format!("unsupported or malformed PKIX key: {e}")))
    }

    /// Curve of this key.
    #[must_use]
    pub const fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
        }
    }

    /// Re-encode the key as SubjectPublicKeyInfo DER.
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            Self::P256(key) => key.to_public_key_der(),
            Self::P384(key) => key.to_public_key_der(),
        }
        .map_err(|e| ServerError::Crypto(format!("public key encoding failed: {e}")))?;

        Ok(doc.as_bytes().to_vec())
    }

    /// Verify an ECDSA signature `(r, s)` over a precomputed digest.
    ///
    /// Digests longer than the curve order are truncated per FIPS 186-4.
    /// Components that are zero or do not fit in the scalar field never verify.
    #[must_use]
    pub fn verify_digest(&self, digest: &[u8], r: &BigUint, s: &BigUint) -> bool {
        let len = self.curve().scalar_len();
        let (Some(r), Some(s)) = (to_fixed_be(r, len), to_fixed_be(s, len)) else {
            return false;
        };

        match self {
            Self::P256(key) => {
                let Ok(sig) = p256::ecdsa::Signature::from_scalars(
                    p256::FieldBytes::clone_from_slice(&r),
                    p256::FieldBytes::clone_from_slice(&s),
                ) else {
                    return false;
                };
                key.verify_prehash(digest, &sig).is_ok()
            },
            Self::P384(key) => {
                let Ok(sig) = p384::ecdsa::Signature::from_scalars(
                    p384::FieldBytes::clone_from_slice(&r),
                    p384::FieldBytes::clone_from_slice(&s),
                ) else {
                    return false;
                };
                key.verify_prehash(digest, &sig).is_ok()
            },
        }
    }
}

/// Left-pad a big integer to `len` big-endian bytes, `None` if it does not fit.
fn to_fixed_be(value: &BigUint, len: usize) -> Option<Vec<u8>> {
    let bytes = value.to_bytes_be();
    if bytes.len() > len {
        return None;
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(&bytes);
    Some(out)
}
