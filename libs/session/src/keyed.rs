use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};

use crate::{KvStore, SharedKvStore, StoreError};

/// Hex characters kept from the digest of a hashed key.
pub const HASHED_KEY_WIDTH: usize = 32;

/// How a [`KeyedStore`] derives the raw key from a caller key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// `prefix + base64url(key)`: injective and reversible.
    Encoded,
    /// `prefix + hex(sha256(key))[..HASHED_KEY_WIDTH]`: the key cannot be recovered.
    Hashed,
}

/// Namespaced view over a raw [`KvStore`]. The empty key maps to the bare prefix under either
/// strategy.
#[derive(Clone)]
pub struct KeyedStore {
    raw: SharedKvStore,
    prefix: String,
    strategy: KeyStrategy,
}

impl std::fmt::Debug for KeyedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStore")
            .field("prefix", &self.prefix)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl KeyedStore {
    pub fn new(raw: SharedKvStore, prefix: impl Into<String>, strategy: KeyStrategy) -> Self {
        Self {
            raw,
            prefix: prefix.into(),
            strategy,
        }
    }

    pub fn encoded(raw: SharedKvStore, prefix: impl Into<String>) -> Self {
        Self::new(raw, prefix, KeyStrategy::Encoded)
    }

    pub fn hashed(raw: SharedKvStore, prefix: impl Into<String>) -> Self {
        Self::new(raw, prefix, KeyStrategy::Hashed)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// Raw key under which `key` is stored.
    ///
    /// ```
    /// use vab_session::{KeyedStore, shared_memory_store};
    ///
    /// let users = KeyedStore::encoded(shared_memory_store(), "user_");
    /// assert_eq!(users.transform("abc"), "user_YWJj");
    /// assert_eq!(users.transform(""), "user_");
    ///
    /// let states = KeyedStore::hashed(shared_memory_store(), "state_");
    /// assert_eq!(states.transform("abc").len(), "state_".len() + 32);
    /// ```
    pub fn transform(&self, key: &str) -> String {
        if key.is_empty() {
            return self.prefix.clone();
        }
        let suffix = match self.strategy {
            KeyStrategy::Encoded => URL_SAFE_NO_PAD.encode(key.as_bytes()),
            KeyStrategy::Hashed => {
                let mut digest = hex::encode(Sha256::digest(key.as_bytes()));
                digest.truncate(HASHED_KEY_WIDTH);
                digest
            }
        };
        format!("{}{}", self.prefix, suffix)
    }

    fn restore(&self, raw_key: &str) -> Option<String> {
        let suffix = raw_key.strip_prefix(&self.prefix)?;
        match self.strategy {
            KeyStrategy::Encoded => URL_SAFE_NO_PAD
                .decode(suffix)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok()),
            KeyStrategy::Hashed => Some(suffix.to_string()),
        }
    }

    pub async fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        let bytes = self.load(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn store_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.store(key, bytes).await
    }
}

#[async_trait]
impl KvStore for KeyedStore {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.raw.load(&self.transform(key)).await
    }

    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.raw.store(&self.transform(key), value).await
    }

    async fn store_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.raw
            .store_with_ttl(&self.transform(key), value, ttl)
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.raw.delete(&self.transform(key)).await
    }

    async fn take(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.raw.take(&self.transform(key)).await
    }

    /// Lists caller keys in this namespace. Hashed namespaces yield the digests, since the
    /// original keys cannot be recovered.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let raw_keys = self.raw.list_keys(&self.prefix).await?;
        let mut keys: Vec<String> = raw_keys
            .iter()
            .filter_map(|raw| self.restore(raw))
            .filter(|key| !key.is_empty() && key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
