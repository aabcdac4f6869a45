// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JWS signing and verification (RS256)
//!
//! The provider signs ID tokens with the active [`SigningKey`] and verifies
//! inbound JWTs (introspection of raw tokens) against any non-expired key,
//! resolved by the `kid` carried in the JOSE header. The algorithm whitelist
//! is exactly `["RS256"]`: symmetric algorithms and `alg: none` never pass
//! header parsing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::storage::models::SigningKey;

/// Verification and signing failures, mapped from the underlying JOSE errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token is malformed")]
    Malformed,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token algorithm is not RS256")]
    UnsupportedAlgorithm,
    #[error("token carries no kid and several keys are live")]
    MissingKid,
    #[error("no live key matches kid {0}")]
    UnknownKey(String),
    #[error("signing key material is unusable: {0}")]
    KeyMaterial(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> JwtError {
    match err.kind() {
        ErrorKind::ExpiredSignature => JwtError::Expired,
        ErrorKind::ImmatureSignature => JwtError::NotYetValid,
        ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            JwtError::UnsupportedAlgorithm
        }
        _ => JwtError::Malformed,
    }
}

/// Signs `claims` as an RS256 JWS, stamping the key's `kid` into the header
pub fn sign_with_key<T: Serialize>(claims: &T, key: &SigningKey) -> Result<String, JwtError> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_pem.as_bytes())
        .map_err(|e| JwtError::KeyMaterial(e.to_string()))?;
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key.kid.clone());
    encode(&header, claims, &encoding_key).map_err(|e| JwtError::Signing(e.to_string()))
}

/// Reads the `kid` out of a token header without verifying anything else.
/// Rejects any algorithm other than RS256 (which covers `none`).
pub fn peek_kid(token: &str) -> Result<Option<String>, JwtError> {
    let header = decode_header(token).map_err(map_decode_error)?;
    if header.alg != Algorithm::RS256 {
        return Err(JwtError::UnsupportedAlgorithm);
    }
    Ok(header.kid)
}

/// Verifies a token against one specific key
pub fn verify_with_key<T: DeserializeOwned>(
    token: &str,
    key: &SigningKey,
) -> Result<T, JwtError> {
    let decoding_key = DecodingKey::from_rsa_pem(key.public_pem.as_bytes())
        .map_err(|e| JwtError::KeyMaterial(e.to_string()))?;
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    // Audience is checked by the caller against the requesting client
    validation.validate_aud = false;
    decode::<T>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(map_decode_error)
}

/// Verifies a token against a set of live keys, resolving by `kid`
///
/// Resolution rules:
/// - a `kid` must match a non-expired key, otherwise [`JwtError::UnknownKey`]
/// - a token without `kid` is accepted only while a single key is live;
///   with several live keys it fails with [`JwtError::MissingKid`]
pub fn resolve_and_verify<T: DeserializeOwned>(
    token: &str,
    keys: &[SigningKey],
    now: DateTime<Utc>,
) -> Result<T, JwtError> {
    let live: Vec<&SigningKey> = keys.iter().filter(|k| k.is_usable(now)).collect();
    let kid = peek_kid(token)?;

    let key = match kid {
        Some(ref kid) => live
            .iter()
            .find(|k| &k.kid == kid)
            .ok_or_else(|| JwtError::UnknownKey(kid.clone()))?,
        None => match live.as_slice() {
            [only] => only,
            [] => return Err(JwtError::InvalidSignature),
            _ => return Err(JwtError::MissingKid),
        },
    };

    verify_with_key(token, key)
}

/// Left-half hash used for `at_hash` and `c_hash` (OIDC Core §3.1.3.6):
/// SHA-256 over the ASCII value, left 128 bits, base64url without padding
pub fn left_half_hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    URL_SAFE_NO_PAD.encode(&digest[..16])
}
