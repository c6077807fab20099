// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical byte encoding of certificate create requests.
//!
//! Signer and verifier must agree on these bytes exactly, so the layout is
//! written out by hand rather than delegated to the protobuf encoder. Every
//! integer is big-endian and every variable-length field is prefixed with a
//! `u64` length.
//!
//! ```text
//! u8   version (1)
//! u64  len, domain tag "tlsca.v1.CertCreateRequest"
//! ts          u8 present, [i64 seconds, i32 nanos]
//! id          u8 present, [u64 len, UTF-8 identity]
//! public_key  u8 present, [i32 key_type, u64 len, key]
//! sig         u8 present, [i32 key_type, u64 len, r, u64 len, s]
//! ```
//!
//! [`signing_digest`] always clears `sig` before encoding.

use sha3::{Digest, Sha3_384};

use crate::proto::CertCreateRequest;

/// Version byte leading every canonical encoding.
pub const CANONICAL_VERSION: u8 = 1;

/// Domain separation tag for create requests.
pub const CREATE_REQUEST_DOMAIN: &[u8] = b"tlsca.v1.CertCreateRequest";

/// Length of a SHA3-384 digest.
pub const DIGEST_LEN: usize = 48;

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;

/// Encode a create request, including its signature field if present.
#[must_use]
pub fn encode_create_request(req: &CertCreateRequest) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.push(CANONICAL_VERSION);
    put_bytes(&mut out, CREATE_REQUEST_DOMAIN);

    match &req.ts {
        Some(ts) => {
            out.push(PRESENT);
            out.extend_from_slice(&ts.seconds.to_be_bytes());
            out.extend_from_slice(&ts.nanos.to_be_bytes());
        },
        None => out.push(ABSENT),
    }

    match &req.id {
        Some(id) => {
            out.push(PRESENT);
            put_bytes(&mut out, id.id.as_bytes());
        },
        None => out.push(ABSENT),
    }

    match &req.public_key {
        Some(key) => {
            out.push(PRESENT);
            out.extend_from_slice(&key.key_type.to_be_bytes());
            put_bytes(&mut out, &key.key);
        },
        None => out.push(ABSENT),
    }

    match &req.sig {
        Some(sig) => {
            out.push(PRESENT);
            out.extend_from_slice(&sig.key_type.to_be_bytes());
            put_bytes(&mut out, &sig.r);
            put_bytes(&mut out, &sig.s);
        },
        None => out.push(ABSENT),
    }

    out
}

/// SHA3-384 over the canonical encoding of `req` with its signature removed.
#[must_use]
pub fn signing_digest(req: &CertCreateRequest) -> [u8; DIGEST_LEN] {
    let mut unsigned = req.clone();
    unsigned.sig = None;

    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&Sha3_384::digest(encode_create_request(&unsigned)));
    digest
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{CryptoType, Identity, PublicKey, Signature};

    fn sample_request() -> CertCreateRequest {
        CertCreateRequest {
            ts: Some(prost_types::Timestamp {
                seconds: 3600,
                nanos: 0,
            }),
            id: Some(Identity {
                id: "alice".to_string(),
            }),
            public_key: Some(PublicKey {
                key_type: CryptoType::Ecdsa.into(),
                key: vec![1, 2, 3, 4],
            }),
            sig: None,
        }
    }

    #[test]
    fn test_encoding_layout() {
        let bytes = encode_create_request(&sample_request());

        assert_eq!(bytes[0], CANONICAL_VERSION);
        assert_eq!(&bytes[1..9], &(CREATE_REQUEST_DOMAIN.len() as u64).to_be_bytes());
        let tag_end = 9 + CREATE_REQUEST_DOMAIN.len();
        assert_eq!(&bytes[9..tag_end], CREATE_REQUEST_DOMAIN);

        // ts
        assert_eq!(bytes[tag_end], 1);
        assert_eq!(&bytes[tag_end + 1..tag_end + 9], &3600i64.to_be_bytes());
        assert_eq!(&bytes[tag_end + 9..tag_end + 13], &0i32.to_be_bytes());

        // sig absent is the final byte
        assert_eq!(*bytes.last().unwrap(), 0);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = encode_create_request(&sample_request());
        let b = encode_create_request(&sample_request());
        assert_eq!(a, b);
    }

    #[test]
    fn test_field_population_order_does_not_matter() {
        let mut req = CertCreateRequest::default();
        req.public_key = sample_request().public_key;
        req.id = sample_request().id;
        req.ts = sample_request().ts;

        assert_eq!(
            encode_create_request(&req),
            encode_create_request(&sample_request())
        );
    }

    #[test]
    fn test_digest_ignores_signature() {
        let unsigned = sample_request();
        let mut signed = sample_request();
        signed.sig = Some(Signature {
            key_type: CryptoType::Ecdsa.into(),
            r: b"12345".to_vec(),
            s: b"67890".to_vec(),
        });

        assert_eq!(signing_digest(&unsigned), signing_digest(&signed));
        assert_ne!(
            encode_create_request(&unsigned),
            encode_create_request(&signed)
        );
    }

    #[test]
    fn test_digest_changes_with_each_field() {
        let base = signing_digest(&sample_request());

        let mut req = sample_request();
        req.id = Some(Identity {
            id: "alicf".to_string(),
        });
        assert_ne!(signing_digest(&req), base);

        let mut req = sample_request();
        if let Some(ts) = req.ts.as_mut() {
            ts.seconds = 3601;
        }
        assert_ne!(signing_digest(&req), base);

        let mut req = sample_request();
        if let Some(key) = req.public_key.as_mut() {
            key.key[0] ^= 0x01;
        }
        assert_ne!(signing_digest(&req), base);
    }

    #[test]
    fn test_absent_and_empty_fields_differ() {
        let mut absent = sample_request();
        absent.id = None;
        let mut empty = sample_request();
        empty.id = Some(Identity { id: String::new() });

        assert_ne!(
            encode_create_request(&absent),
            encode_create_request(&empty)
        );
    }

    #[test]
    fn test_length_prefix_prevents_field_shifting() {
        // "ab" + key [0x63] must not collide with "abc" + empty key
        let mut a = sample_request();
        a.id = Some(Identity {
            id: "ab".to_string(),
        });
        if let Some(key) = a.public_key.as_mut() {
            key.key = b"c".to_vec();
        }
        let mut b = sample_request();
        b.id = Some(Identity {
            id: "abc".to_string(),
        });
        if let Some(key) = b.public_key.as_mut() {
            key.key = Vec::new();
        }

        assert_ne!(signing_digest(&a), signing_digest(&b));
    }
}
