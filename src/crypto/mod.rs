// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Cryptographic core of the provider
//!
//! Everything the protocol engine needs from cryptography lives here:
//!
//! - RSA key pair generation and PEM (de)serialization ([`keys`])
//! - JWS signing and verification with `kid` resolution ([`jwt`])
//! - JWKS export of public key material ([`jwks`])
//! - PKCE challenge verification ([`pkce`])
//! - CSPRNG-backed opaque token generation ([`random`])
//! - The signing-key rotation policy ([`key_manager`])
//!
//! The signing algorithm set is `["RS256"]`; nothing here accepts `none` or a
//! symmetric algorithm.

pub mod jwks;
pub mod jwt;
pub mod key_manager;
pub mod keys;
pub mod pkce;
pub mod random;

pub use key_manager::KeyManager;
