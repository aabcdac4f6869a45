// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! RSA key pair generation and PEM serialization

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

/// Default RSA modulus size in bits
pub const DEFAULT_RSA_KEY_BITS: usize = 4096;

/// Smallest modulus size the provider accepts
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// A freshly generated RSA key pair in PEM form
///
/// The private key is PKCS#8 PEM, the public key SPKI PEM; both encodings are
/// accepted by `jsonwebtoken` for RS256 signing and verification.
#[derive(Debug, Clone)]
pub struct GeneratedKeyPair {
    pub private_pem: String,
    pub public_pem: String,
    /// Key id derived from the public key material
    pub kid: String,
}

/// Generates an RSA key pair of the requested size
///
/// Rejects moduli below 2048 bits. Generation of a 4096-bit key takes a few
/// seconds of CPU; callers on the async runtime offload this to a blocking
/// executor (see [`super::key_manager::KeyManager`]).
pub fn generate_rsa_keypair(bits: usize) -> Result<GeneratedKeyPair> {
    if bits < MIN_RSA_KEY_BITS {
        bail!(
            "RSA key size {} is below the {}-bit minimum",
            bits,
            MIN_RSA_KEY_BITS
        );
    }

    let mut rng = rsa::rand_core::OsRng;
    let private_key =
        RsaPrivateKey::new(&mut rng, bits).context("Failed to generate RSA private key")?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("Failed to encode private key to PEM")?
        .to_string();
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .context("Failed to encode public key to PEM")?;

    let kid = kid_for_public_pem(&public_pem);

    Ok(GeneratedKeyPair {
        private_pem,
        public_pem,
        kid,
    })
}

/// Derives a stable key id from the public key PEM
///
/// The kid is the first 16 base64url characters of SHA-256 over the PEM body,
/// stable across restarts for the same key material.
pub fn kid_for_public_pem(public_pem: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_pem.as_bytes());
    let digest = hasher.finalize();
    URL_SAFE_NO_PAD.encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;

    #[test]
    fn small_keys_are_rejected() {
        assert!(generate_rsa_keypair(1024).is_err());
    }

    #[test]
    fn generated_pem_round_trips() {
        let pair = generate_rsa_keypair(2048).unwrap();
        assert!(pair.private_pem.contains("BEGIN PRIVATE KEY"));
        assert!(pair.public_pem.contains("BEGIN PUBLIC KEY"));
        assert_eq!(pair.kid.len(), 16);

        let parsed = RsaPrivateKey::from_pkcs8_pem(&pair.private_pem).unwrap();
        assert_eq!(
            kid_for_public_pem(&pair.public_pem),
            pair.kid,
        );
        let _ = RsaPublicKey::from(&parsed);
    }
}
