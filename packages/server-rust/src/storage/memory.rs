//! In-memory dataset store with TTL, LRU eviction, and a background reaper.
//!
//! All public operations serialize on a single async mutex guarding an
//! insertion-ordered map; index 0 is the least-recently-used entry and the
//! tail is the most-recently-used. Engine calls that feed the metadata
//! (`deep_memory_bytes`, `copy`) run before the critical section.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use framecache_core::{ColumnarEngine, Table, TableEngine};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::metadata::DatasetMetadata;
use super::store::{DatasetStore, StorageStats};
use crate::config::StorageConfig;
use crate::error::FrameError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One registry entry: the owned dataset plus its metadata.
struct StoredEntry {
    table: Table,
    metadata: DatasetMetadata,
}

/// Mutex-guarded registry state.
#[derive(Default)]
struct StoreInner {
    /// Index 0 is LRU; the tail is MRU.
    entries: IndexMap<String, StoredEntry>,
    /// Running sum of `memory_bytes` across entries.
    total_bytes: u64,
}

impl StoreInner {
    fn remove(&mut self, id: &str) -> Option<StoredEntry> {
        let entry = self.entries.shift_remove(id)?;
        self.total_bytes -= entry.metadata.memory_bytes;
        Some(entry)
    }

    /// Evicts the LRU entry. Caller must ensure the map is non-empty.
    fn evict_lru(&mut self) -> (String, StoredEntry) {
        let (id, entry) = self
            .entries
            .shift_remove_index(0)
            .expect("evict_lru on empty registry");
        self.total_bytes -= entry.metadata.memory_bytes;
        (id, entry)
    }

    /// Removes every expired entry, returning how many were removed.
    fn remove_expired(&mut self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.metadata.is_expired_at(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.remove(id);
            tracing::debug!(df_id = %id, "removed expired dataset");
        }
        expired.len()
    }
}

/// State shared between the store facade and its reaper task.
struct Shared {
    engine: Arc<dyn TableEngine>,
    config: StorageConfig,
    inner: Mutex<StoreInner>,
}

/// Handle to a running reaper task.
struct Reaper {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// In-memory [`DatasetStore`] backend.
pub struct InMemoryDatasetStore {
    shared: Arc<Shared>,
    reaper: Mutex<Option<Reaper>>,
}

impl InMemoryDatasetStore {
    /// Creates a store over the default columnar engine.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self::with_engine(Arc::new(ColumnarEngine::new()), config)
    }

    /// Creates a store over a caller-supplied engine.
    #[must_use]
    pub fn with_engine(engine: Arc<dyn TableEngine>, config: StorageConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                config,
                inner: Mutex::new(StoreInner::default()),
            }),
            reaper: Mutex::new(None),
        }
    }

    /// The engine this store computes metadata with.
    #[must_use]
    pub fn engine(&self) -> Arc<dyn TableEngine> {
        Arc::clone(&self.shared.engine)
    }
}

#[async_trait]
impl DatasetStore for InMemoryDatasetStore {
    async fn store(
        &self,
        table: Table,
        id: &str,
        ttl_seconds: Option<u64>,
        tags: Option<Map<String, JsonValue>>,
    ) -> Result<DatasetMetadata, FrameError> {
        let engine = &self.shared.engine;
        if engine.is_empty(&table) {
            return Err(FrameError::invalid("cannot store an empty dataset"));
        }
        if ttl_seconds == Some(0) {
            return Err(FrameError::invalid("ttl_seconds must be positive"));
        }

        // Metadata inputs are computed before taking the lock.
        let memory_bytes = engine.deep_memory_bytes(&table);
        let shape = (table.row_count(), table.col_count());
        let dtypes = table.dtypes();
        let ttl = ttl_seconds.or(self.shared.config.default_ttl_seconds);

        let max_bytes = self.shared.config.max_memory_bytes;
        let mut inner = self.shared.inner.lock().await;

        // Feasibility first: a dataset that cannot fit alone must leave the
        // registry untouched.
        if memory_bytes > max_bytes {
            return Err(FrameError::OutOfCapacity {
                message: format!(
                    "dataset needs {memory_bytes} bytes but the cap is {max_bytes} bytes"
                ),
            });
        }

        if inner.remove(id).is_some() {
            tracing::debug!(df_id = %id, "replacing existing dataset");
        }

        let mut evicted = 0_usize;
        let mut freed = 0_u64;
        while inner.total_bytes + memory_bytes > max_bytes && !inner.entries.is_empty() {
            let (evicted_id, entry) = inner.evict_lru();
            freed += entry.metadata.memory_bytes;
            evicted += 1;
            tracing::debug!(df_id = %evicted_id, "evicted LRU dataset to free memory");
        }
        while inner.entries.len() >= self.shared.config.max_datasets
            && !inner.entries.is_empty()
        {
            let (evicted_id, entry) = inner.evict_lru();
            freed += entry.metadata.memory_bytes;
            evicted += 1;
            tracing::debug!(df_id = %evicted_id, "evicted LRU dataset to free a slot");
        }
        #[allow(clippy::cast_precision_loss)]
        if evicted > 0 {
            tracing::info!(
                count = evicted,
                freed_mb = freed as f64 / BYTES_PER_MB,
                "evicted LRU datasets to make room"
            );
        }

        let metadata = DatasetMetadata {
            id: id.to_string(),
            created_at: Utc::now(),
            shape,
            dtypes,
            memory_bytes,
            size_bytes: memory_bytes,
            ttl_seconds: ttl,
            tags: tags.unwrap_or_default(),
        };
        inner.total_bytes += memory_bytes;
        inner.entries.insert(
            id.to_string(),
            StoredEntry {
                table,
                metadata: metadata.clone(),
            },
        );

        #[allow(clippy::cast_precision_loss)]
        {
            tracing::debug!(
                df_id = %id,
                rows = shape.0,
                cols = shape.1,
                memory_mb = memory_bytes as f64 / BYTES_PER_MB,
                "stored dataset"
            );
        }
        Ok(metadata)
    }

    async fn retrieve(&self, id: &str) -> Result<Option<Table>, FrameError> {
        let mut inner = self.shared.inner.lock().await;
        let Some(index) = inner.entries.get_index_of(id) else {
            return Ok(None);
        };
        if inner.entries[index].metadata.is_expired() {
            inner.remove(id);
            tracing::debug!(df_id = %id, "removed expired dataset on retrieve");
            return Ok(None);
        }
        let last = inner.entries.len() - 1;
        inner.entries.move_index(index, last);
        let entry = &inner.entries[last];
        Ok(Some(self.shared.engine.copy(&entry.table)))
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<DatasetMetadata>, FrameError> {
        let mut inner = self.shared.inner.lock().await;
        let expired = match inner.entries.get(id) {
            None => return Ok(None),
            Some(entry) => entry.metadata.is_expired(),
        };
        if expired {
            inner.remove(id);
            tracing::debug!(df_id = %id, "removed expired dataset on metadata lookup");
            return Ok(None);
        }
        Ok(Some(inner.entries[id].metadata.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, FrameError> {
        let mut inner = self.shared.inner.lock().await;
        let removed = inner.remove(id).is_some();
        if removed {
            tracing::debug!(df_id = %id, "deleted dataset");
        }
        Ok(removed)
    }

    async fn list(
        &self,
        tags: Option<&Map<String, JsonValue>>,
        limit: Option<usize>,
    ) -> Result<Vec<DatasetMetadata>, FrameError> {
        let mut inner = self.shared.inner.lock().await;
        inner.remove_expired();

        let empty = Map::new();
        let filter = tags.unwrap_or(&empty);
        let mut listed: Vec<DatasetMetadata> = inner
            .entries
            .values()
            .filter(|e| e.metadata.matches_tags(filter))
            .map(|e| e.metadata.clone())
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            listed.truncate(limit);
        }
        Ok(listed)
    }

    async fn cleanup_expired(&self) -> Result<usize, FrameError> {
        let mut inner = self.shared.inner.lock().await;
        Ok(inner.remove_expired())
    }

    #[allow(clippy::cast_precision_loss)]
    async fn stats(&self) -> Result<StorageStats, FrameError> {
        let inner = self.shared.inner.lock().await;
        let total_memory_mb = inner.total_bytes as f64 / BYTES_PER_MB;
        let max_memory_mb = self.shared.config.max_memory_bytes as f64 / BYTES_PER_MB;
        Ok(StorageStats {
            backend: "memory",
            dataset_count: inner.entries.len(),
            total_memory_mb,
            total_size_mb: total_memory_mb,
            max_memory_mb,
            max_datasets: self.shared.config.max_datasets,
            memory_usage_pct: if max_memory_mb > 0.0 {
                total_memory_mb / max_memory_mb * 100.0
            } else {
                0.0
            },
        })
    }

    async fn clear_all(&self) -> Result<usize, FrameError> {
        let mut inner = self.shared.inner.lock().await;
        let count = inner.entries.len();
        inner.entries.clear();
        inner.total_bytes = 0;
        tracing::info!(count, "cleared all datasets");
        Ok(count)
    }

    async fn start(&self) {
        let mut reaper = self.reaper.lock().await;
        if reaper.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let interval = shared.config.cleanup_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        let removed = {
                            let mut inner = shared.inner.lock().await;
                            inner.remove_expired()
                        };
                        if removed > 0 {
                            tracing::info!(count = removed, "reaper removed expired datasets");
                        }
                    }
                    changed = stop_rx.changed() => {
                        // Stop on signal or on a dropped sender.
                        let _ = changed;
                        break;
                    }
                }
            }
        });
        *reaper = Some(Reaper {
            stop: stop_tx,
            handle,
        });
        tracing::debug!("dataset reaper started");
    }

    async fn shutdown(&self) {
        let Some(reaper) = self.reaper.lock().await.take() else {
            return;
        };
        let _ = reaper.stop.send(true);
        let _ = reaper.handle.await;
        tracing::debug!("dataset reaper stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use framecache_core::TableBuilder;
    use serde_json::json;

    use super::*;

    fn fixture(rows: usize) -> Table {
        #[allow(clippy::cast_possible_wrap)]
        let ids: Vec<i64> = (0..rows as i64).collect();
        let names: Vec<String> = (0..rows).map(|i| format!("name-{i:04}")).collect();
        TableBuilder::new()
            .int("id", ids)
            .str("name", names.iter().map(String::as_str).collect())
            .build()
            .unwrap()
    }

    fn config() -> StorageConfig {
        StorageConfig {
            max_memory_bytes: 64 * 1024 * 1024,
            default_ttl_seconds: Some(3600),
            cleanup_interval: Duration::from_secs(300),
            max_datasets: 1000,
        }
    }

    fn store_with(config: StorageConfig) -> InMemoryDatasetStore {
        InMemoryDatasetStore::new(config)
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trip() {
        let store = store_with(config());
        let table = fixture(10);

        let metadata = store.store(table.clone(), "df-1", None, None).await.unwrap();
        assert_eq!(metadata.shape, (10, 2));
        assert_eq!(metadata.memory_bytes, table.deep_memory_bytes());
        assert_eq!(metadata.size_bytes, metadata.memory_bytes);
        assert_eq!(metadata.ttl_seconds, Some(3600));

        let fetched = store.retrieve("df-1").await.unwrap().unwrap();
        assert_eq!(fetched, table);
    }

    #[tokio::test]
    async fn empty_dataset_rejected() {
        let store = store_with(config());
        let empty = TableBuilder::new().int("a", vec![]).build().unwrap();
        let err = store.store(empty, "df-1", None, None).await.unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn zero_ttl_rejected() {
        let store = store_with(config());
        let err = store
            .store(fixture(2), "df-1", Some(0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn oversized_dataset_fails_and_leaves_registry_unchanged() {
        let small = fixture(2);
        let cap = small.deep_memory_bytes() * 2;
        let store = store_with(StorageConfig {
            max_memory_bytes: cap,
            ..config()
        });

        store.store(small, "df-small", None, None).await.unwrap();

        let big = fixture(100);
        assert!(big.deep_memory_bytes() > cap);
        let err = store.store(big, "df-big", None, None).await.unwrap_err();
        assert!(matches!(err, FrameError::OutOfCapacity { .. }));

        // Prior entry intact, nothing evicted by the failed store.
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.dataset_count, 1);
        assert!(store.retrieve("df-small").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_id_overwrites_and_releases_prior_entry() {
        let store = store_with(config());
        store.store(fixture(4), "df-1", None, None).await.unwrap();
        let replacement = fixture(8);
        let metadata = store
            .store(replacement.clone(), "df-1", None, None)
            .await
            .unwrap();
        assert_eq!(metadata.shape.0, 8);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.dataset_count, 1);
        assert_eq!(
            store.retrieve("df-1").await.unwrap().unwrap(),
            replacement
        );
    }

    #[tokio::test]
    async fn count_cap_evicts_least_recently_used() {
        let store = store_with(StorageConfig {
            max_datasets: 3,
            ..config()
        });
        for id in ["a", "b", "c", "d", "e"] {
            store.store(fixture(2), id, None, None).await.unwrap();
        }

        let listed = store.list(None, None).await.unwrap();
        let mut ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["c", "d", "e"]);
        assert!(store.retrieve("a").await.unwrap().is_none());
        assert!(store.retrieve("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_cap_evicts_until_new_entry_fits() {
        let unit = fixture(4).deep_memory_bytes();
        let store = store_with(StorageConfig {
            max_memory_bytes: unit * 2 + unit / 2,
            ..config()
        });

        store.store(fixture(4), "a", None, None).await.unwrap();
        store.store(fixture(4), "b", None, None).await.unwrap();
        // Third store exceeds the cap; "a" is the LRU victim.
        store.store(fixture(4), "c", None, None).await.unwrap();

        assert!(store.retrieve("a").await.unwrap().is_none());
        assert!(store.retrieve("b").await.unwrap().is_some());
        assert!(store.retrieve("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn retrieve_refreshes_lru_position() {
        let store = store_with(StorageConfig {
            max_datasets: 3,
            ..config()
        });
        store.store(fixture(2), "a", None, None).await.unwrap();
        store.store(fixture(2), "b", None, None).await.unwrap();
        store.store(fixture(2), "c", None, None).await.unwrap();

        // Touch "a" so "b" becomes the eviction victim.
        store.retrieve("a").await.unwrap().unwrap();
        store.store(fixture(2), "d", None, None).await.unwrap();

        assert!(store.retrieve("a").await.unwrap().is_some());
        assert!(store.retrieve("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn metadata_lookup_does_not_refresh_lru() {
        let store = store_with(StorageConfig {
            max_datasets: 2,
            ..config()
        });
        store.store(fixture(2), "a", None, None).await.unwrap();
        store.store(fixture(2), "b", None, None).await.unwrap();

        store.get_metadata("a").await.unwrap().unwrap();
        store.store(fixture(2), "c", None, None).await.unwrap();

        // "a" was still LRU despite the metadata lookup.
        assert!(store.retrieve("a").await.unwrap().is_none());
        assert!(store.retrieve("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_gone_from_every_read_path() {
        let store = store_with(config());
        store
            .store(fixture(2), "df-ttl", Some(1), None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert!(store.retrieve("df-ttl").await.unwrap().is_none());
        assert!(store.get_metadata("df-ttl").await.unwrap().is_none());
        assert!(!store.delete("df-ttl").await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_tags_and_sorts_newest_first() {
        let store = store_with(config());
        let tags = |v: serde_json::Value| v.as_object().cloned();
        store
            .store(
                fixture(2),
                "t1",
                None,
                tags(json!({"source": "upload", "type": "test"})),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .store(
                fixture(2),
                "t2",
                None,
                tags(json!({"source": "upload", "type": "prod"})),
            )
            .await
            .unwrap();

        let uploads = store
            .list(json!({"source": "upload"}).as_object(), None)
            .await
            .unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].id, "t2"); // newest first

        let tests = store
            .list(json!({"type": "test"}).as_object(), None)
            .await
            .unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].id, "t1");

        let limited = store.list(None, Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_expired_reports_count() {
        let store = store_with(config());
        store.store(fixture(2), "a", Some(1), None).await.unwrap();
        store.store(fixture(2), "b", Some(1), None).await.unwrap();
        store.store(fixture(2), "c", None, None).await.unwrap();

        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(store.cleanup_expired().await.unwrap(), 2);
        assert_eq!(store.stats().await.unwrap().dataset_count, 1);
    }

    #[tokio::test]
    async fn stats_track_counts_and_usage() {
        let table = fixture(4);
        let bytes = table.deep_memory_bytes();
        let store = store_with(StorageConfig {
            max_memory_bytes: bytes * 4,
            ..config()
        });
        store.store(table, "a", None, None).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.dataset_count, 1);
        assert!((stats.memory_usage_pct - 25.0).abs() < 0.01);
        assert_eq!(stats.total_memory_mb, stats.total_size_mb);
    }

    #[tokio::test]
    async fn clear_all_empties_the_registry() {
        let store = store_with(config());
        store.store(fixture(2), "a", None, None).await.unwrap();
        store.store(fixture(2), "b", None, None).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert_eq!(store.stats().await.unwrap().dataset_count, 0);
        assert_eq!(store.clear_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reaper_removes_expired_entries_without_foreground_calls() {
        let store = store_with(StorageConfig {
            cleanup_interval: Duration::from_millis(100),
            ..config()
        });
        store.start().await;
        store
            .store(fixture(2), "df-ttl", Some(1), None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        // stats() does not run the lazy expiry check, so a zero count proves
        // the reaper did the removal.
        assert_eq!(store.stats().await.unwrap().dataset_count, 0);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn reaper_lifecycle_is_idempotent() {
        let store = store_with(StorageConfig {
            cleanup_interval: Duration::from_millis(50),
            ..config()
        });

        // Shutdown without start is a no-op.
        store.shutdown().await;

        store.start().await;
        store.start().await; // second start is a no-op
        store.shutdown().await;
        store.shutdown().await; // second shutdown is a no-op

        // Restart after shutdown works.
        store.start().await;
        store.shutdown().await;
    }
}
