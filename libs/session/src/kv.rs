use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is absent or its TTL has elapsed.
    #[error("key not found")]
    NotFound,
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored value could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
    /// The first half of a dual-keyed write landed, the second did not.
    #[error("record written under {written} but not under {failed}: {source}")]
    InconsistentWrite {
        written: String,
        failed: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Raw byte-oriented key/value capability supplied by the host platform.
///
/// TTL'd entries must become unreadable and unlistable once their TTL elapses.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    async fn store_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Loads and deletes a value. Backends that can do this atomically should override it.
    async fn take(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let value = self.load(key).await?;
        self.delete(key).await?;
        Ok(value)
    }

    /// Lists live keys starting with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
