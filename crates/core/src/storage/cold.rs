//! Cold tier: remote blob storage holding entries nobody touched for a while.
use async_trait::async_trait;

use super::entry::StoredEntry;
use super::KvStorageInterface;
use super::MemStorage;
use crate::error::Result;

/// Remote storage for rarely accessed entries.
#[async_trait]
pub trait ColdTier: Send + Sync {
    /// Store `entry`, replacing any copy under the same key.
    async fn upload(&self, entry: &StoredEntry) -> Result<()>;

    /// Fetch the copy stored under `key`.
    async fn download(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Remove the copy stored under `key`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys currently held.
    async fn list(&self) -> Result<Vec<String>>;
}

/// A cold tier living in process memory.
#[derive(Debug, Default)]
pub struct MemColdTier {
    blobs: MemStorage<StoredEntry>,
}

impl MemColdTier {
    /// Empty tier.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColdTier for MemColdTier {
    async fn upload(&self, entry: &StoredEntry) -> Result<()> {
        self.blobs.put(&entry.key, entry).await
    }

    async fn download(&self, key: &str) -> Result<Option<StoredEntry>> {
        self.blobs.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.remove(key).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .get_all()
            .await?
            .into_iter()
            .map(|(k, _)| k)
            .collect())
    }
}
