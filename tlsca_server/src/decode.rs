// SPDX-License-Identifier: MIT OR Apache-2.0
//! Extraction and shape validation of wire requests.

use crate::error::{Result, ServerError};
use crate::key::RequesterKey;
use crate::proto::{CertCreateRequest, CertReadRequest, CryptoType};

/// Fields of a create request after shape validation.
#[derive(Debug, Clone)]
pub struct DecodedCreateRequest {
    /// Identity the certificate is requested for.
    pub identity: String,
    /// Decoded requester key.
    pub public_key: RequesterKey,
    /// Requested validity in seconds.
    pub validity_secs: i64,
    /// Text encoded `r` component, unparsed.
    pub sig_r: Vec<u8>,
    /// Text encoded `s` component, unparsed.
    pub sig_s: Vec<u8>,
}

/// Check that a wire key type tag is one this authority accepts.
///
/// Unknown numeric tags are rejected as well as known non-ECDSA ones.
pub fn check_key_type(key_type: i32) -> Result<()> {
    match CryptoType::try_from(key_type) {
        Ok(CryptoType::Ecdsa) => Ok(()),
        _ => Err(ServerError::UnsupportedKeyType(key_type)),
    }
}

/// Extract and validate the fields of a create request.
///
/// The key type is checked before the key bytes are parsed, and nothing is
/// hashed here. A missing signature decodes to empty components so that it
/// fails later in the same place as any other bad signature.
pub fn decode_create_request(req: &CertCreateRequest) -> Result<DecodedCreateRequest> {
    let identity = require_identity(req.id.as_ref().map(|id| id.id.as_str()))?;

    let ts = req
        .ts
        .as_ref()
        .ok_or_else(|| ServerError::InvalidArgument("missing validity timestamp".to_string()))?;

    let public_key = req
        .public_key
        .as_ref()
        .ok_or_else(|| ServerError::InvalidArgument("missing public key".to_string()))?;

    check_key_type(public_key.key_type)?;
    let public_key = RequesterKey::from_spki_der(&public_key.key)?;

    let (sig_r, sig_s) = req
        .sig
        .as_ref()
        .map(|sig| (sig.r.clone(), sig.s.clone()))
        .unwrap_or_default();

    Ok(DecodedCreateRequest {
        identity,
        public_key,
        validity_secs: ts.seconds,
        sig_r,
        sig_s,
    })
}

/// Extract the identity of a read request.
pub fn decode_read_request(req: &CertReadRequest) -> Result<String> {
    require_identity(req.id.as_ref().map(|id| id.id.as_str()))
}

fn require_identity(identity: Option<&str>) -> Result<String> {
    match identity {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        Some(_) => Err(ServerError::InvalidArgument("identity cannot be empty".to_string())),
        None => Err(ServerError::InvalidArgument("missing identity".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Curve;
    use crate::proto::{Identity, PublicKey};
    use crate::signer::{build_create_request, RequestSigningKey};

    fn signed_request() -> CertCreateRequest {
        let key = RequestSigningKey::generate_p384();
        build_create_request("alice", 3600, &key).unwrap()
    }

    #[test]
    fn test_decode_valid_request() {
        let req = signed_request();
        let decoded = decode_create_request(&req).unwrap();

        assert_eq!(decoded.identity, "alice");
        assert_eq!(decoded.validity_secs, 3600);
        assert_eq!(decoded.public_key.curve(), Curve::P384);
        assert_eq!(decoded.sig_r, req.sig.as_ref().unwrap().r);
        assert_eq!(decoded.sig_s, req.sig.as_ref().unwrap().s);
    }

    #[test]
    fn test_rejects_rsa_key_type_before_parsing_key() {
        let mut req = signed_request();
        if let Some(key) = req.public_key.as_mut() {
            key.key_type = CryptoType::Rsa.into();
        }

        let err = decode_create_request(&req).unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedKeyType(1)));
    }

    #[test]
    fn test_unsupported_key_type_wins_over_garbage_key() {
        let mut req = signed_request();
        req.public_key = Some(PublicKey {
            key_type: CryptoType::Dsa.into(),
            key: b"garbage".to_vec(),
        });

        let err = decode_create_request(&req).unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedKeyType(2)));
    }

    #[test]
    fn test_rejects_unknown_key_type_tag() {
        let mut req = signed_request();
        if let Some(key) = req.public_key.as_mut() {
            key.key_type = 99;
        }

        let err = decode_create_request(&req).unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedKeyType(99)));
    }

    #[test]
    fn test_rejects_malformed_key_bytes() {
        let mut req = signed_request();
        if let Some(key) = req.public_key.as_mut() {
            key.key = b"not pkix".to_vec();
        }

        let err = decode_create_request(&req).unwrap_err();
        assert!(matches!(err, ServerError::InvalidPublicKey(_)));
    }

    #[test]
    fn test_missing_fields() {
        let mut req = signed_request();
        req.id = None;
        assert!(matches!(
            decode_create_request(&req).unwrap_err(),
            ServerError::InvalidArgument(_)
        ));

        let mut req = signed_request();
        req.ts = None;
        assert!(matches!(
            decode_create_request(&req).unwrap_err(),
            ServerError::InvalidArgument(_)
        ));

        let mut req = signed_request();
        req.public_key = None;
        assert!(matches!(
            decode_create_request(&req).unwrap_err(),
            ServerError::InvalidArgument(_)
        ));

        let mut req = signed_request();
        req.id = Some(Identity { id: String::new() });
        assert!(matches!(
            decode_create_request(&req).unwrap_err(),
            ServerError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_missing_signature_decodes_to_empty_components() {
        let mut req = signed_request();
        req.sig = None;

        let decoded = decode_create_request(&req).unwrap();
        assert!(decoded.sig_r.is_empty());
        assert!(decoded.sig_s.is_empty());
    }

    #[test]
    fn test_decode_read_request() {
        let req = CertReadRequest {
            ts: None,
            id: Some(Identity {
                id: "alice".to_string(),
            }),
            sig: None,
        };
        assert_eq!(decode_read_request(&req).unwrap(), "alice");

        let req = CertReadRequest::default();
        assert!(decode_read_request(&req).is_err());
    }
}
