//! Key/value storage for the virtual agent bridge.
//!
//! The only injected dependency is a raw byte-oriented [`KvStore`]. [`KeyedStore`] wraps it with
//! a per-namespace key strategy, and the record stores in [`records`] build on that to persist
//! session links, one-time OAuth2 state and per-user conversation flags.

mod keyed;
mod kv;
mod memory;
pub mod records;

use std::sync::Arc;

pub use keyed::{HASHED_KEY_WIDTH, KeyStrategy, KeyedStore};
pub use kv::{KvStore, StoreError};
pub use memory::MemoryKvStore;
pub use records::{FlagStore, OAuthStateStore, SessionRecord, SessionStore};

/// Shared raw store handle used across services.
pub type SharedKvStore = Arc<dyn KvStore>;

/// Returns an in-memory raw store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedKvStore {
    Arc::new(MemoryKvStore::new())
}
