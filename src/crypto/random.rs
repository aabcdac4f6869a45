// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Opaque token generation
//!
//! All opaque values handed to the outside (authorization codes, access and
//! refresh tokens, session ids, registration tokens) come from the operating
//! system CSPRNG and carry 256 bits of entropy, encoded base64url without
//! padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Generates a fresh opaque token (32 random bytes, base64url, no padding)
pub fn opaque_token() -> String {
    let bytes = rand::random::<[u8; 32]>();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates a session identifier; same construction as [`opaque_token`],
/// separate entry point so call sites say what they mean
pub fn session_id() -> String {
    opaque_token()
}
