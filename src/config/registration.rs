// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dynamic client registration settings

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Whether `POST /register` is exposed at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Require a single-use initial access token for registration
    #[serde(default)]
    pub require_initial_access_token: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        RegistrationConfig {
            enabled: default_enabled(),
            require_initial_access_token: false,
        }
    }
}
