// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Rust OIDC Provider Library
//!
//! An OpenID Connect 1.0 Provider built on OAuth 2.0. The crate implements
//! the full protocol surface of a small identity provider: discovery, JWKS,
//! authorization with login and consent gating, token issuance with
//! single-use codes and refresh rotation, userinfo, introspection,
//! revocation and dynamic client registration.
//!
//! ## Main Components
//!
//! - **Config**: YAML-backed configuration with JSON-Schema validation
//! - **Crypto**: RSA key management, RS256 JWS, JWKS export, PKCE
//! - **Storage**: the persistence contract and the embedded backends
//! - **OAuth**: the protocol engine (authorize state machine, token grants,
//!   registration validation, error taxonomy)
//! - **Session**: the two session kinds and their cookie discipline
//! - **Server**: the Rocket endpoints mapping HTTP onto the engine
//! - **Daemon**: task lifecycle (web server, sweeper, heartbeat)
//!
//! ## Usage
//!
//! This crate can be used either:
//!
//! 1. As a library embedding an OpenID Provider into another service
//! 2. Through the provided binaries
//!
//! ## Binaries
//!
//! - **main**: the provider daemon
//! - **rs256keygen**: generates RSA key pairs for offline key provisioning

/// Configuration handling for the provider.
///
/// Provides functionality for loading, validating, and managing application
/// settings including server binding, protocol lifetimes and bootstrap seeds.
pub mod config;

/// Cryptographic core: RSA keys, RS256 JWS, JWKS export, PKCE, CSPRNG tokens.
pub mod crypto;

/// Daemon management for the web server and background tasks.
pub mod daemon;

/// The OAuth 2.0 / OpenID Connect protocol engine.
pub mod oauth;

/// Rocket web server exposing the protocol endpoints.
pub mod server;

/// Session kinds and cookie discipline.
pub mod session;

/// Persistence contract and embedded storage backends.
pub mod storage;
