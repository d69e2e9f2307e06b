use std::time::Duration;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::error;

use crate::{KeyedStore, KvStore, SharedKvStore, StoreError};

const SESSION_BY_LOCAL_PREFIX: &str = "session_local_";
const SESSION_BY_REMOTE_PREFIX: &str = "session_remote_";
const OAUTH_STATE_PREFIX: &str = "oauth2_state_";

/// Durable link between a chat user and their remote agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub local_user_id: String,
    pub remote_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_username: Option<String>,
    /// Sealed OAuth2 token; only the bridge's token cipher can open it.
    pub encrypted_token: String,
    pub linked_at: i64,
}

/// Session records reachable by both the local and the remote user id.
#[derive(Debug, Clone)]
pub struct SessionStore {
    by_local: KeyedStore,
    by_remote: KeyedStore,
}

impl SessionStore {
    pub fn new(raw: SharedKvStore) -> Self {
        Self {
            by_local: KeyedStore::encoded(raw.clone(), SESSION_BY_LOCAL_PREFIX),
            by_remote: KeyedStore::encoded(raw, SESSION_BY_REMOTE_PREFIX),
        }
    }

    /// Writes the record under the local id, then under the remote id.
    ///
    /// The two writes are not transactional. When the second fails the first is left in place
    /// and [`StoreError::InconsistentWrite`] is returned.
    pub async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.by_local
            .store_json(&record.local_user_id, record)
            .await?;
        if let Err(err) = self
            .by_remote
            .store_json(&record.remote_user_id, record)
            .await
        {
            error!(
                local_user_id = %record.local_user_id,
                remote_user_id = %record.remote_user_id,
                error = %err,
                "session record written by local id only"
            );
            return Err(StoreError::InconsistentWrite {
                written: "local id".into(),
                failed: "remote id".into(),
                source: Box::new(err),
            });
        }
        Ok(())
    }

    pub async fn load_by_local(&self, local_user_id: &str) -> Result<SessionRecord, StoreError> {
        self.by_local.load_json(local_user_id).await
    }

    pub async fn load_by_remote(&self, remote_user_id: &str) -> Result<SessionRecord, StoreError> {
        self.by_remote.load_json(remote_user_id).await
    }

    pub async fn delete(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.by_local.delete(&record.local_user_id).await?;
        self.by_remote.delete(&record.remote_user_id).await
    }
}

/// One-time OAuth2 state values, stored under hashed keys with a TTL.
#[derive(Debug, Clone)]
pub struct OAuthStateStore {
    store: KeyedStore,
}

impl OAuthStateStore {
    pub fn new(raw: SharedKvStore) -> Self {
        Self {
            store: KeyedStore::hashed(raw, OAUTH_STATE_PREFIX),
        }
    }

    pub async fn put(&self, state: &str, ttl: Duration) -> Result<(), StoreError> {
        self.store
            .store_with_ttl(state, state.as_bytes().to_vec(), ttl)
            .await
    }

    /// Removes the state and succeeds only if it was present, unexpired and not a digest
    /// collision. A second call for the same state returns [`StoreError::NotFound`].
    pub async fn consume(&self, state: &str) -> Result<(), StoreError> {
        let stored = self.store.take(state).await?;
        if bool::from(stored.ct_eq(state.as_bytes())) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}

/// Per-user boolean flags such as "link pending" or "awaiting disconnect confirmation".
#[derive(Debug, Clone)]
pub struct FlagStore {
    store: KeyedStore,
}

impl FlagStore {
    pub fn new(raw: SharedKvStore, prefix: impl Into<String>) -> Self {
        Self {
            store: KeyedStore::encoded(raw, prefix),
        }
    }

    pub async fn raise(&self, user_id: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        match ttl {
            Some(ttl) => self.store.store_with_ttl(user_id, vec![1], ttl).await,
            None => self.store.store(user_id, vec![1]).await,
        }
    }

    pub async fn is_raised(&self, user_id: &str) -> Result<bool, StoreError> {
        match self.store.load(user_id).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        self.store.delete(user_id).await
    }
}
