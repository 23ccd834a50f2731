//! Optimistic check-in cache.
//!
//! Bridges a local check-in and the next reconciliation. Stored as one JSON
//! object under [`CHECKIN_CACHE_KEY`], mapping worker id to an RFC 3339 start.
//! An unreadable blob is treated as empty.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::ServiceError;
use crate::services::KeyValueStore;

pub const CHECKIN_CACHE_KEY: &str = "vg_volunteer_checkin_times";

#[derive(Debug, Default)]
struct Mirror {
    loaded: bool,
    entries: BTreeMap<u64, DateTime<Utc>>,
}

/// Every read-modify-write runs inside a [`CacheSection`], so writers that
/// suspend on the store never interleave.
pub struct PersistedCheckinCache<K> {
    store: K,
    mirror: Mutex<Mirror>,
}

impl<K: KeyValueStore> PersistedCheckinCache<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            mirror: Mutex::new(Mirror::default()),
        }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// Exclusive access until the section is dropped. Loads from the store on
    /// first use.
    pub async fn section(&self) -> Result<CacheSection<'_, K>, ServiceError> {
        let mut mirror = self.mirror.lock().await;
        if !mirror.loaded {
            mirror.entries = read_blob(&self.store).await?;
            mirror.loaded = true;
        }
        Ok(CacheSection {
            store: &self.store,
            mirror,
        })
    }

    /// Reads the blob from the store, replacing anything held in memory.
    pub async fn load(&self) -> Result<BTreeMap<u64, DateTime<Utc>>, ServiceError> {
        let mut mirror = self.mirror.lock().await;
        mirror.entries = read_blob(&self.store).await?;
        mirror.loaded = true;
        Ok(mirror.entries.clone())
    }

    pub async fn get(&self, worker_id: u64) -> Result<Option<DateTime<Utc>>, ServiceError> {
        Ok(self.section().await?.get(worker_id))
    }

    pub async fn put(&self, worker_id: u64, start: DateTime<Utc>) -> Result<(), ServiceError> {
        self.section().await?.put(worker_id, start).await
    }

    pub async fn remove(&self, worker_id: u64) -> Result<(), ServiceError> {
        self.section().await?.remove(worker_id).await
    }
}

/// Locked view of the cache. The in-memory copy only changes after the store
/// accepted the write.
pub struct CacheSection<'a, K> {
    store: &'a K,
    mirror: MutexGuard<'a, Mirror>,
}

impl<K: KeyValueStore> CacheSection<'_, K> {
    pub fn get(&self, worker_id: u64) -> Option<DateTime<Utc>> {
        self.mirror.entries.get(&worker_id).copied()
    }

    pub fn entries(&self) -> &BTreeMap<u64, DateTime<Utc>> {
        &self.mirror.entries
    }

    /// Discards the in-memory copy and reads the store again.
    pub async fn reload(&mut self) -> Result<(), ServiceError> {
        self.mirror.entries = read_blob(self.store).await?;
        Ok(())
    }

    pub async fn put(&mut self, worker_id: u64, start: DateTime<Utc>) -> Result<(), ServiceError> {
        if self.get(worker_id) == Some(start) {
            return Ok(());
        }
        let mut next = self.mirror.entries.clone();
        next.insert(worker_id, start);
        self.persist(next).await
    }

    pub async fn remove(&mut self, worker_id: u64) -> Result<(), ServiceError> {
        if !self.mirror.entries.contains_key(&worker_id) {
            return Ok(());
        }
        let mut next = self.mirror.entries.clone();
        next.remove(&worker_id);
        self.persist(next).await
    }

    /// Drops entries `keep` rejects and returns their worker ids.
    pub async fn retain(
        &mut self,
        mut keep: impl FnMut(u64, DateTime<Utc>) -> bool,
    ) -> Result<Vec<u64>, ServiceError> {
        let (kept, dropped): (BTreeMap<_, _>, BTreeMap<_, _>) = self
            .mirror
            .entries
            .iter()
            .map(|(worker, start)| (*worker, *start))
            .partition(|&(worker, start)| keep(worker, start));
        if dropped.is_empty() {
            return Ok(Vec::new());
        }
        self.persist(kept).await?;
        Ok(dropped.into_keys().collect())
    }

    async fn persist(&mut self, entries: BTreeMap<u64, DateTime<Utc>>) -> Result<(), ServiceError> {
        if entries.is_empty() {
            self.store.remove(CHECKIN_CACHE_KEY).await?;
        } else {
            self.store.set(CHECKIN_CACHE_KEY, render_blob(&entries)).await?;
        }
        self.mirror.entries = entries;
        Ok(())
    }
}

async fn read_blob<K: KeyValueStore>(
    store: &K,
) -> Result<BTreeMap<u64, DateTime<Utc>>, ServiceError> {
    let raw = store.get(CHECKIN_CACHE_KEY).await?;
    Ok(raw.map(|blob| parse_blob(&blob)).unwrap_or_default())
}

fn parse_blob(blob: &str) -> BTreeMap<u64, DateTime<Utc>> {
    let raw: BTreeMap<String, String> = match serde_json::from_str(blob) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable check-in cache, treating as empty");
            return BTreeMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(worker, start)| {
            let worker_id = worker.parse::<u64>().ok();
            let start = DateTime::parse_from_rfc3339(&start)
                .ok()
                .map(|t| t.with_timezone(&Utc));
            match (worker_id, start) {
                (Some(worker_id), Some(start)) => Some((worker_id, start)),
                _ => {
                    tracing::warn!(worker = %worker, "Dropping malformed check-in cache entry");
                    None
                }
            }
        })
        .collect()
}

fn render_blob(entries: &BTreeMap<u64, DateTime<Utc>>) -> String {
    let raw: BTreeMap<String, String> = entries
        .iter()
        .map(|(worker, start)| {
            (
                worker.to_string(),
                start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )
        })
        .collect();
    // A map of strings always serializes.
    serde_json::to_string(&raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 23, 50, 0).unwrap()
    }

    #[tokio::test]
    async fn test_put_writes_single_blob() {
        let store = Arc::new(MemoryStore::new());
        let cache = PersistedCheckinCache::new(Arc::clone(&store));

        cache.put(42, start()).await.unwrap();
        cache.put(7, start()).await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec![CHECKIN_CACHE_KEY]);
        let blob = store.get(CHECKIN_CACHE_KEY).await.unwrap().unwrap();
        assert_eq!(
            blob,
            r#"{"42":"2025-03-10T23:50:00Z","7":"2025-03-10T23:50:00Z"}"#
        );
    }

    #[tokio::test]
    async fn test_remove_last_entry_removes_key() {
        let store = Arc::new(MemoryStore::new());
        let cache = PersistedCheckinCache::new(Arc::clone(&store));

        cache.put(42, start()).await.unwrap();
        cache.remove(42).await.unwrap();

        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(cache.get(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_reads_existing_blob() {
        let store = MemoryStore::new();
        store
            .set(
                CHECKIN_CACHE_KEY,
                r#"{"42":"2025-03-11T07:50:00+08:00","bogus":"x","9":"not a time"}"#.to_string(),
            )
            .await
            .unwrap();
        let cache = PersistedCheckinCache::new(store);

        let entries = cache.load().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get(&42), Some(&start()));
    }

    #[tokio::test]
    async fn test_retain_drops_rejected_entries() {
        let store = Arc::new(MemoryStore::new());
        let cache = PersistedCheckinCache::new(Arc::clone(&store));
        cache.put(42, start()).await.unwrap();
        cache.put(7, start() - chrono::Duration::hours(30)).await.unwrap();

        let dropped = cache
            .section()
            .await
            .unwrap()
            .retain(|_, at| at >= start() - chrono::Duration::hours(24))
            .await
            .unwrap();

        assert_eq!(dropped, vec![7]);
        let reloaded = PersistedCheckinCache::new(Arc::clone(&store));
        assert_eq!(
            reloaded.load().await.unwrap().keys().copied().collect::<Vec<_>>(),
            vec![42]
        );
    }

    #[tokio::test]
    async fn test_corrupt_blob_loads_empty() {
        let store = MemoryStore::new();
        store
            .set(CHECKIN_CACHE_KEY, "[1,2".to_string())
            .await
            .unwrap();
        let cache = PersistedCheckinCache::new(store);
        assert!(cache.load().await.unwrap().is_empty());
    }
}
