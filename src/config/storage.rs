// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Storage backend selection

use serde::{Deserialize, Serialize};

/// Which persistence backend backs the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-memory store; state dies with the process
    Memory,
    /// Embedded JSON document with in-memory index
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Path of the JSON document for the file backend
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_path() -> String {
    "oidc_provider_data.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_backend(),
            path: default_path(),
        }
    }
}
