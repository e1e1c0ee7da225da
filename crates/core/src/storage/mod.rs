//! Module of MemStorage, the entry store and its cold tier

pub mod cold;
pub mod entry;
pub mod memory;
pub mod store;

use async_trait::async_trait;

pub use self::cold::ColdTier;
pub use self::cold::MemColdTier;
pub use self::entry::StoredEntry;
pub use self::store::EntryStore;
pub use self::store::PutOutcome;
use crate::error::Result;
pub use crate::storage::memory::MemStorage;

/// Key value storage interface
#[async_trait]
pub trait KvStorageInterface<V> {
    /// Get a cache entry by `key`.
    async fn get(&self, key: &str) -> Result<Option<V>>;

    /// Put `entry` in the cache under `key`.
    async fn put(&self, key: &str, value: &V) -> Result<()>;

    /// Every stored pair.
    async fn get_all(&self) -> Result<Vec<(String, V)>>;

    /// Remove an `entry` by `key`.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Delete all values.
    async fn clear(&self) -> Result<()>;

    /// Get the current storage usage.
    async fn count(&self) -> Result<u32>;
}
