// SPDX-License-Identifier: MIT OR Apache-2.0
//! Proof of possession for certificate create requests.
//!
//! A request is accepted only if its signature verifies, under the public
//! key the request itself carries, over the SHA3-384 digest of the request's
//! canonical encoding with the signature field cleared.

use num_bigint::BigUint;

use crate::canonical::signing_digest;
use crate::error::{Result, ServerError};
use crate::key::RequesterKey;
use crate::proto::CertCreateRequest;

/// Parse a text encoded signature component.
///
/// The grammar is that of a Go integer literal with an optional leading `+`:
///
/// - `0x`/`0X` selects hexadecimal, `0b`/`0B` binary and `0o`/`0O` octal.
/// - A leading `0` followed by more characters is octal, so `"010"` is 8.
/// - `_` may separate digits, or a base prefix from the first digit.
///
/// Anything else yields `None`. A negative component can never verify, so a
/// leading `-` is treated as malformed.
#[must_use]
pub fn parse_scalar_text(text: &[u8]) -> Option<BigUint> {
    let text = std::str::from_utf8(text).ok()?;
    let text = text.strip_prefix('+').unwrap_or(text);

    let (body, radix, prefixed) = match text.as_bytes() {
        [b'0', b'x' | b'X', ..] => (&text[2..], 16, true),
        [b'0', b'b' | b'B', ..] => (&text[2..], 2, true),
        [b'0', b'o' | b'O', ..] => (&text[2..], 8, true),
        [b'0', _, ..] => (&text[1..], 8, true),
        _ => (text, 10, false),
    };

    // A base prefix counts as a digit for separator placement.
    let mut after_digit = prefixed;
    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        if c == '_' {
            if !after_digit {
                return None;
            }
            after_digit = false;
        } else if c.is_digit(radix) {
            digits.push(c);
            after_digit = true;
        } else {
            return None;
        }
    }

    if !after_digit || digits.is_empty() {
        return None;
    }

    BigUint::parse_bytes(digits.as_bytes(), radix)
}

/// Verify the embedded signature of `req` against `key`.
///
/// Both components are parsed before hashing but the outcome is only
/// consulted after the digest has been computed, so a malformed component
/// takes the same path as a wrong one.
pub fn verify_create_request(req: &CertCreateRequest, key: &RequesterKey) -> Result<()> {
    let (r, s) = match &req.sig {
        Some(sig) => (parse_scalar_text(&sig.r), parse_scalar_text(&sig.s)),
        None => (None, None),
    };

    let digest = signing_digest(req);

    let verified = match (r, s) {
        (Some(r), Some(s)) => key.verify_digest(&digest, &r, &s),
        _ => false,
    };

    if verified {
        Ok(())
    } else {
        Err(ServerError::SignatureInvalid)
    }
}
