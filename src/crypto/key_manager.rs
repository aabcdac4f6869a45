// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Signing key selection and rotation
//!
//! The provider maintains an append-only log of [`SigningKey`]s in storage
//! with exactly one active element. All signing uses the active key; all
//! verification resolves by `kid` inside the non-expired set, so tokens
//! signed before a rotation keep verifying until the grace window closes.
//!
//! Key state is read-mostly: the active key is cached behind an async
//! `RwLock` and only rotation takes the write half.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use log::{debug, info};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::keys::{generate_rsa_keypair, GeneratedKeyPair};
use crate::storage::models::SigningKey;
use crate::storage::{SharedStorage, Storage};

pub struct KeyManager {
    storage: SharedStorage,
    /// RSA modulus size for newly generated keys
    key_bits: usize,
    /// Verification grace granted to a demoted key
    rotation_grace: Duration,
    /// Cache of the active key; rotation invalidates it
    active_cache: RwLock<Option<SigningKey>>,
}

impl KeyManager {
    /// Creates the manager and guarantees one active key exists in storage,
    /// generating the first key pair on a pristine deployment.
    pub async fn initialize(
        storage: SharedStorage,
        key_bits: usize,
        rotation_grace: Duration,
    ) -> Result<Arc<Self>> {
        let manager = Arc::new(KeyManager {
            storage,
            key_bits,
            rotation_grace,
            active_cache: RwLock::new(None),
        });

        if manager.load_active().await?.is_none() {
            info!("No active signing key found, generating the first one");
            manager.rotate().await?;
        }
        Ok(manager)
    }

    async fn load_active(&self) -> Result<Option<SigningKey>> {
        let keys = self
            .storage
            .list_signing_keys()
            .await
            .context("listing signing keys")?;
        Ok(keys.into_iter().find(|k| k.is_active))
    }

    /// The one active signing key
    pub async fn active(&self) -> Result<SigningKey> {
        if let Some(key) = self.active_cache.read().await.clone() {
            return Ok(key);
        }
        let key = self
            .load_active()
            .await?
            .ok_or_else(|| anyhow!("no active signing key in storage"))?;
        *self.active_cache.write().await = Some(key.clone());
        Ok(key)
    }

    /// Any non-expired key addressed by kid, for verification of in-flight
    /// tokens signed before a rotation
    pub async fn for_kid(&self, kid: &str) -> Result<Option<SigningKey>> {
        let key = self
            .storage
            .get_signing_key_by_kid(kid)
            .await
            .context("resolving signing key by kid")?;
        Ok(key.filter(|k| k.is_usable(Utc::now())))
    }

    /// All keys usable for verification right now (active + grace window)
    pub async fn verification_keys(&self) -> Result<Vec<SigningKey>> {
        let now = Utc::now();
        let keys = self
            .storage
            .list_signing_keys()
            .await
            .context("listing signing keys")?;
        Ok(keys.into_iter().filter(|k| k.is_usable(now)).collect())
    }

    /// Generates a fresh key pair, promotes it to active and demotes the
    /// previous active key with `expires_at = now + grace`. The storage
    /// backend applies the swap as a single step.
    pub async fn rotate(&self) -> Result<SigningKey> {
        let bits = self.key_bits;
        // Key generation is seconds of CPU at 4096 bits; keep it off the
        // async workers.
        let pair: GeneratedKeyPair =
            tokio::task::spawn_blocking(move || generate_rsa_keypair(bits))
                .await
                .context("key generation task failed")??;

        let now = Utc::now();
        let new_key = SigningKey {
            id: Uuid::new_v4().to_string(),
            kid: pair.kid.clone(),
            algorithm: "RS256".to_string(),
            private_pem: pair.private_pem,
            public_pem: pair.public_pem,
            is_active: true,
            created_at: now,
            expires_at: None,
        };

        self.storage
            .activate_signing_key(new_key.clone(), now + self.rotation_grace)
            .await
            .context("activating rotated signing key")?;

        *self.active_cache.write().await = Some(new_key.clone());
        debug!("Rotated signing key, new kid {}", new_key.kid);
        Ok(new_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn memory() -> SharedStorage {
        Arc::new(MemoryStorage::new())
    }

    #[tokio::test]
    async fn initialize_creates_the_first_key() {
        let manager = KeyManager::initialize(memory(), 2048, Duration::days(30))
            .await
            .unwrap();
        let active = manager.active().await.unwrap();
        assert!(active.is_active);
        assert_eq!(active.algorithm, "RS256");
    }

    #[tokio::test]
    async fn rotation_keeps_old_key_verifiable_within_grace() {
        let manager = KeyManager::initialize(memory(), 2048, Duration::days(30))
            .await
            .unwrap();
        let first = manager.active().await.unwrap();
        let second = manager.rotate().await.unwrap();
        assert_ne!(first.kid, second.kid);

        // The demoted key stays resolvable for verification
        let old = manager.for_kid(&first.kid).await.unwrap().unwrap();
        assert!(!old.is_active);
        assert!(old.expires_at.is_some());

        // And the active key is the new one
        assert_eq!(manager.active().await.unwrap().kid, second.kid);
        assert_eq!(manager.verification_keys().await.unwrap().len(), 2);
    }
}
