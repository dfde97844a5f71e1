//! Storage backend trait for dataset registries.
//!
//! Defines [`DatasetStore`], the async interface every registry backend
//! implements. The in-memory backend lives in
//! [`memory`](super::memory); a future on-disk backend would implement the
//! same trait and supply its own `size_bytes` measure.

use async_trait::async_trait;
use framecache_core::Table;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::metadata::DatasetMetadata;
use crate::error::FrameError;

/// Point-in-time registry statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    /// Backend identifier (`"memory"` for the in-memory store).
    pub backend: &'static str,
    pub dataset_count: usize,
    pub total_memory_mb: f64,
    pub total_size_mb: f64,
    pub max_memory_mb: f64,
    pub max_datasets: usize,
    /// Memory in use as a percentage of the configured cap.
    pub memory_usage_pct: f64,
}

/// Async storage backend for datasets.
///
/// Used as `Arc<dyn DatasetStore>`. All operations serialize on the backend's
/// internal lock; callers never observe partial state.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Stores a dataset under `id`, evicting as needed to satisfy the caps.
    ///
    /// A duplicate `id` overwrites, releasing the prior entry. The stored
    /// copy is owned by the registry.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty dataset or a zero TTL; `OutOfCapacity`
    /// when the dataset cannot fit even after evicting everything else (the
    /// registry is left unchanged).
    async fn store(
        &self,
        table: Table,
        id: &str,
        ttl_seconds: Option<u64>,
        tags: Option<Map<String, JsonValue>>,
    ) -> Result<DatasetMetadata, FrameError>;

    /// Retrieves a copy of the dataset, updating its LRU position.
    ///
    /// Observing an expired entry removes it and returns `None`.
    ///
    /// # Errors
    ///
    /// Only internal failures; absence is `Ok(None)`.
    async fn retrieve(&self, id: &str) -> Result<Option<Table>, FrameError>;

    /// Metadata lookup without touching the LRU position.
    ///
    /// # Errors
    ///
    /// Only internal failures; absence is `Ok(None)`.
    async fn get_metadata(&self, id: &str) -> Result<Option<DatasetMetadata>, FrameError>;

    /// Removes a dataset. Idempotent; `true` iff an entry was removed.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    async fn delete(&self, id: &str) -> Result<bool, FrameError>;

    /// Lists live metadata, newest first, after an implicit expired sweep.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    async fn list(
        &self,
        tags: Option<&Map<String, JsonValue>>,
        limit: Option<usize>,
    ) -> Result<Vec<DatasetMetadata>, FrameError>;

    /// Removes all expired datasets, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    async fn cleanup_expired(&self) -> Result<usize, FrameError>;

    /// Current counts, byte totals, and limits.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    async fn stats(&self) -> Result<StorageStats, FrameError>;

    /// Removes every dataset, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    async fn clear_all(&self) -> Result<usize, FrameError>;

    /// Starts the background reaper. Idempotent.
    async fn start(&self);

    /// Stops the background reaper and awaits its termination. Calling
    /// without a prior `start` is a no-op.
    async fn shutdown(&self);
}
