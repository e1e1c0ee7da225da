//! The local entry store with its cold tier.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::cold::ColdTier;
use super::cold::MemColdTier;
use super::entry::append_value;
use super::entry::bracket;
use super::entry::merge_entries;
use super::entry::reconcile_entries;
use super::entry::StoredEntry;
use super::KvStorageInterface;
use super::MemStorage;
use crate::error::Error;
use crate::error::Result;

/// What a put did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was new.
    Inserted,
    /// The key existed and its value was replaced.
    Updated,
}

impl PutOutcome {
    /// Status line reported to clients.
    pub fn message(&self) -> &'static str {
        match self {
            PutOutcome::Inserted => "Entry correctly inserted in the DB",
            PutOutcome::Updated => "Entry already exists. Correctly updated",
        }
    }
}

/// Key/value records of one node.
///
/// Every operation runs under one lock, so whole-collection merges never interleave
/// with single-key writes.
pub struct EntryStore {
    table: Box<dyn KvStorageInterface<StoredEntry> + Send + Sync>,
    cold: Arc<dyn ColdTier>,
    lock: Mutex<()>,
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new(Arc::new(MemColdTier::new()))
    }
}

impl EntryStore {
    /// In-memory store offloading to `cold`.
    pub fn new(cold: Arc<dyn ColdTier>) -> Self {
        Self::with_table(Box::new(MemStorage::new()), cold)
    }

    /// Store over an explicit table.
    pub fn with_table(
        table: Box<dyn KvStorageInterface<StoredEntry> + Send + Sync>,
        cold: Arc<dyn ColdTier>,
    ) -> Self {
        Self {
            table,
            cold,
            lock: Mutex::new(()),
        }
    }

    /// Bring `key` back from the cold tier when it lives there.
    async fn rehydrate(&self, key: &str) -> Result<()> {
        if !self.cold.list().await?.iter().any(|k| k == key) {
            return Ok(());
        }
        tracing::info!("entry {} is on the cold tier, downloading", key);
        if let Some(remote) = self.cold.download(key).await? {
            let local: Vec<StoredEntry> = self.table.get(key).await?.into_iter().collect();
            for entry in merge_entries(local, vec![remote]) {
                self.table.put(&entry.key, &entry).await?;
            }
        }
        self.cold.delete(key).await
    }

    /// Read `key`, refreshing its access time.
    pub async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let _guard = self.lock.lock().await;
        self.rehydrate(key).await?;
        let Some(mut entry) = self.table.get(key).await? else {
            return Ok(None);
        };
        entry.last_accessed = Utc::now();
        self.table.put(key, &entry).await?;
        Ok(Some(entry))
    }

    /// Read `key` without touching its access time.
    pub async fn peek(&self, key: &str) -> Result<Option<StoredEntry>> {
        self.table.get(key).await
    }

    /// Insert or overwrite `key`.
    pub async fn put(&self, key: &str, value: &str) -> Result<PutOutcome> {
        let _guard = self.lock.lock().await;
        self.rehydrate(key).await?;
        let outcome = match self.table.get(key).await? {
            Some(_) => PutOutcome::Updated,
            None => PutOutcome::Inserted,
        };
        self.table.put(key, &StoredEntry::new(key, value)).await?;
        tracing::debug!("put {} = {} ({:?})", key, bracket(value), outcome);
        Ok(outcome)
    }

    /// Add `value` to the list stored under `key`.
    pub async fn append(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.rehydrate(key).await?;
        let Some(entry) = self.table.get(key).await? else {
            return Err(Error::EntryNotFound(key.to_string()));
        };
        let now = Utc::now();
        let entry = StoredEntry {
            value: append_value(&entry.value, value),
            timestamp: now,
            last_accessed: now,
            ..entry
        };
        self.table.put(key, &entry).await?;
        tracing::debug!("appended {} to {}", value, key);
        Ok(())
    }

    /// Remove `key` locally and from the cold tier.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.cold.list().await?.iter().any(|k| k == key) {
            tracing::info!("entry {} is on the cold tier, deleting it there", key);
            self.cold.delete(key).await?;
        }
        if self.table.get(key).await?.is_none() {
            return Err(Error::EntryNotFound(key.to_string()));
        }
        self.table.remove(key).await
    }

    /// Every local entry.
    pub async fn export_all(&self) -> Result<Vec<StoredEntry>> {
        let _guard = self.lock.lock().await;
        self.entries().await
    }

    /// The entry under `key`, if any.
    pub async fn export_one(&self, key: &str) -> Result<Vec<StoredEntry>> {
        let _guard = self.lock.lock().await;
        Ok(self.table.get(key).await?.into_iter().collect())
    }

    /// Replace the collection with its symmetric merge against `update`.
    pub async fn merge_import(&self, update: Vec<StoredEntry>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let local = self.entries().await?;
        self.replace(merge_entries(local, update)).await?;
        tracing::info!("collection merged successfully");
        Ok(())
    }

    /// Replace the collection with its reconciliation against `update`.
    pub async fn reconcile_import(&self, update: Vec<StoredEntry>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let local = self.entries().await?;
        self.replace(reconcile_entries(local, update)).await?;
        tracing::info!("local collection reconciled");
        Ok(())
    }

    /// Move entries idle for at least `threshold` to the cold tier. A copy already on the
    /// tier is merged first so the later write is the one kept. Returns how many moved.
    pub async fn offload_rarely_accessed(&self, threshold: Duration) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let threshold = chrono::Duration::from_std(threshold)
            .map_err(|e| Error::ColdTier(e.to_string()))?;
        let now = Utc::now();
        let cold_keys = self.cold.list().await?;

        let mut moved = 0;
        for entry in self.entries().await? {
            let idle = now - entry.last_accessed;
            tracing::trace!("key {} not accessed since {}", entry.key, idle);
            if idle < threshold {
                continue;
            }
            let key = entry.key.clone();
            let mut latest = vec![entry];
            if cold_keys.contains(&key) {
                if let Some(remote) = self.cold.download(&key).await? {
                    latest = merge_entries(latest, vec![remote]);
                }
            }
            for e in latest.iter() {
                self.cold.upload(e).await?;
            }
            self.table.remove(&key).await?;
            tracing::info!("entry {} moved to the cold tier", key);
            moved += 1;
        }
        Ok(moved)
    }

    /// Number of local entries.
    pub async fn count(&self) -> Result<u32> {
        self.table.count().await
    }

    async fn entries(&self) -> Result<Vec<StoredEntry>> {
        Ok(self
            .table
            .get_all()
            .await?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    async fn replace(&self, entries: Vec<StoredEntry>) -> Result<()> {
        self.table.clear().await?;
        for entry in entries.iter() {
            self.table.put(&entry.key, entry).await?;
        }
        Ok(())
    }
}
