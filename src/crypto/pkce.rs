// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PKCE (RFC 7636) challenge verification
//!
//! Supported methods are `plain` and `S256`. Comparisons are constant-time so
//! that the token endpoint does not leak how many leading characters of a
//! guessed verifier were correct.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::storage::models::CodeChallengeMethod;

/// Computes the S256 challenge for a verifier: base64url(SHA-256(verifier))
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Verifies a code verifier against the stored challenge
pub fn verify_pkce(verifier: &str, challenge: &str, method: CodeChallengeMethod) -> bool {
    match method {
        CodeChallengeMethod::Plain => constant_time_eq(verifier.as_bytes(), challenge.as_bytes()),
        CodeChallengeMethod::S256 => {
            constant_time_eq(s256_challenge(verifier).as_bytes(), challenge.as_bytes())
        }
    }
}

/// Byte-wise comparison whose duration does not depend on where the inputs
/// first differ. Length is not secret here (challenges have a fixed shape).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s256_matches_rfc7636_appendix_b() {
        // Verifier and challenge from RFC 7636 appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(s256_challenge(verifier), challenge);
        assert!(verify_pkce(verifier, challenge, CodeChallengeMethod::S256));
    }

    #[test]
    fn wrong_verifier_fails() {
        let challenge = s256_challenge("right-verifier");
        assert!(!verify_pkce(
            "wrong-verifier",
            &challenge,
            CodeChallengeMethod::S256
        ));
    }

    #[test]
    fn plain_is_equality() {
        assert!(verify_pkce("abc", "abc", CodeChallengeMethod::Plain));
        assert!(!verify_pkce("abc", "abd", CodeChallengeMethod::Plain));
        assert!(!verify_pkce("abc", "abcd", CodeChallengeMethod::Plain));
    }
}
