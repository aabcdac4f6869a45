// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration validation helpers

use anyhow::{bail, Result};
use url::Url;

use super::Config;
use crate::crypto::keys::MIN_RSA_KEY_BITS;

/// Prints the embedded JSON schema for the configuration file and exits
/// successfully; used by the `--show-config-schema` flag.
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");
    // Re-serialize so the output is always well-formed and pretty
    let schema: serde_json::Value = serde_json::from_str(schema_str)?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Rules the JSON schema cannot express
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    // The issuer must be an absolute http(s) URL without query or fragment
    let issuer = Url::parse(&config.oidc.issuer)
        .map_err(|e| anyhow::anyhow!("oidc.issuer is not a valid URL: {}", e))?;
    if issuer.scheme() != "https" && issuer.scheme() != "http" {
        bail!("oidc.issuer must use http or https");
    }
    if issuer.query().is_some() || issuer.fragment().is_some() {
        bail!("oidc.issuer must not carry a query or fragment");
    }

    // Authorization codes are capped at ten minutes by OAuth guidance
    if config.oidc.code_expiry_seconds <= 0 || config.oidc.code_expiry_seconds > 600 {
        bail!("oidc.code_expiry_seconds must be in 1..=600");
    }
    if config.oidc.auth_session_expiry_seconds <= 0
        || config.oidc.auth_session_expiry_seconds > 600
    {
        bail!("oidc.auth_session_expiry_seconds must be in 1..=600");
    }
    if config.oidc.token_expiry_minutes <= 0 {
        bail!("oidc.token_expiry_minutes must be positive");
    }
    if config.oidc.user_session_expiry_hours <= 0 {
        bail!("oidc.user_session_expiry_hours must be positive");
    }
    if config.oidc.rsa_key_bits < MIN_RSA_KEY_BITS {
        bail!("oidc.rsa_key_bits must be at least {}", MIN_RSA_KEY_BITS);
    }
    if config.oidc.key_rotation_grace_days < 0 {
        bail!("oidc.key_rotation_grace_days must not be negative");
    }
    if config.oidc.storage_timeout_seconds == 0 {
        bail!("oidc.storage_timeout_seconds must be positive");
    }

    // TLS material comes in pairs
    if config.server.cert.is_some() != config.server.key.is_some() {
        bail!("server.cert and server.key must be set together");
    }

    for user in &config.bootstrap.users {
        if user.password_hash.is_none() && user.password.is_none() {
            bail!(
                "bootstrap user {} needs password_hash or password",
                user.username
            );
        }
    }
    for client in &config.bootstrap.clients {
        if client.redirect_uris.is_empty() {
            bail!(
                "bootstrap client {} needs at least one redirect_uri",
                client.client_id
            );
        }
    }

    Ok(())
}
