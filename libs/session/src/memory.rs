use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::{KvStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-process [`KvStore`] with lazy TTL eviction.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Entry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Err(StoreError::NotFound)
    }

    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn store_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(Instant::now()) => Ok(entry.value),
            _ => Err(StoreError::NotFound),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_after_store_and_delete() {
        let store = MemoryKvStore::new();
        store.store("a", b"1".to_vec()).await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), b"1");
        store.delete("a").await.unwrap();
        assert!(store.load("a").await.unwrap_err().is_not_found());
        store.delete("a").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_entries_become_unreadable_and_unlistable() {
        let store = MemoryKvStore::new();
        store
            .store_with_ttl("state_a", b"x".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        store.store("state_b", b"y".to_vec()).await.unwrap();
        assert_eq!(
            store.list_keys("state_").await.unwrap(),
            vec!["state_a".to_string(), "state_b".to_string()]
        );

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(store.load("state_a").await.unwrap_err().is_not_found());
        assert_eq!(
            store.list_keys("state_").await.unwrap(),
            vec!["state_b".to_string()]
        );
    }

    #[tokio::test]
    async fn take_removes_the_value_exactly_once() {
        let store = MemoryKvStore::new();
        store
            .store_with_ttl("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.take("k").await.unwrap(), b"v");
        assert!(store.take("k").await.unwrap_err().is_not_found());
        assert!(store.load("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_entries() {
        let store = MemoryKvStore::new();
        store
            .store_with_ttl("short", b"1".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        store.store("long", b"2".to_vec()).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.load("long").await.unwrap(), b"2");
    }
}
