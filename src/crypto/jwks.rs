// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JWKS export of public key material (RFC 7517)
//!
//! Only public parameters ever leave this module: the modulus and exponent of
//! the active signing key and of every demoted key still inside its
//! verification grace window.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
    RSAKeyParameters, RSAKeyType,
};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;

use crate::storage::models::SigningKey;

/// Parses a public key PEM (SPKI or PKCS#1) into its RSA parameters
fn parse_public_pem(public_pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(public_pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
        .map_err(|e| anyhow!("unparseable public key PEM: {}", e))
}

/// Builds the public JWK for one signing key
pub fn jwk_from_signing_key(key: &SigningKey) -> Result<Jwk> {
    let public_key =
        parse_public_pem(&key.public_pem).with_context(|| format!("signing key {}", key.kid))?;

    let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

    Ok(Jwk {
        common: CommonParameters {
            public_key_use: Some(PublicKeyUse::Signature),
            key_algorithm: Some(KeyAlgorithm::RS256),
            key_id: Some(key.kid.clone()),
            ..Default::default()
        },
        algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
            key_type: RSAKeyType::RSA,
            n,
            e,
        }),
    })
}

/// Builds the published key set: the active key plus every non-expired key.
/// Keys with unusable PEM material are skipped rather than failing the whole
/// document.
pub fn export_jwk_set(keys: &[SigningKey], now: DateTime<Utc>) -> JwkSet {
    let mut jwks = Vec::new();
    for key in keys {
        if !key.is_active && !key.is_usable(now) {
            continue;
        }
        match jwk_from_signing_key(key) {
            Ok(jwk) => jwks.push(jwk),
            Err(e) => log::warn!("Skipping key {} in JWKS export: {}", key.kid, e),
        }
    }
    JwkSet { keys: jwks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_rsa_keypair;

    fn stored_key(active: bool, expires_at: Option<DateTime<Utc>>) -> SigningKey {
        let pair = generate_rsa_keypair(2048).unwrap();
        SigningKey {
            id: pair.kid.clone(),
            kid: pair.kid.clone(),
            algorithm: "RS256".to_string(),
            private_pem: pair.private_pem,
            public_pem: pair.public_pem,
            is_active: active,
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn jwk_carries_rsa_parameters() {
        let key = stored_key(true, None);
        let jwk = jwk_from_signing_key(&key).unwrap();

        assert_eq!(jwk.common.key_id.as_deref(), Some(key.kid.as_str()));
        match jwk.algorithm {
            AlgorithmParameters::RSA(params) => {
                // 65537
                assert_eq!(params.e, "AQAB");
                assert!(!params.n.is_empty());
            }
            other => panic!("expected RSA parameters, got {:?}", other),
        }
    }

    #[test]
    fn export_includes_grace_keys_and_drops_expired() {
        let now = Utc::now();
        let active = stored_key(true, None);
        let in_grace = stored_key(false, Some(now + chrono::Duration::days(10)));
        let expired = stored_key(false, Some(now - chrono::Duration::days(1)));

        let set = export_jwk_set(&[active.clone(), in_grace.clone(), expired], now);
        let kids: Vec<_> = set
            .keys
            .iter()
            .filter_map(|k| k.common.key_id.clone())
            .collect();
        assert_eq!(set.keys.len(), 2);
        assert!(kids.contains(&active.kid));
        assert!(kids.contains(&in_grace.kid));
    }
}
