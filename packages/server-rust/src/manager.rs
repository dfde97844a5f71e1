//! Manager facade composing the registry, dispatcher, and summarizer.
//!
//! The manager owns lifecycle (start/shutdown), generates dataset IDs, and
//! enforces the start-before-use invariant: every operation that touches the
//! registry starts the manager first if needed. `NotFound` never escapes the
//! manager; absent or expired datasets come back as `None`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use framecache_core::{ColumnarEngine, Table, TableEngine};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::error::FrameError;
use crate::query::{QueryProcessor, QueryResult};
use crate::storage::{DatasetMetadata, DatasetStore, InMemoryDatasetStore, StorageStats};
use crate::summarizer::{DatasetSummarizer, DatasetSummary, DisplayFormat};

/// Generates a human-scannable dataset ID: `dataframe-` + 8 hex chars.
fn generate_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("dataframe-{}", &uuid[..8])
}

/// Single entry point for dataset storage, queries, and summaries.
pub struct DatasetManager {
    config: ManagerConfig,
    storage: Arc<dyn DatasetStore>,
    processor: QueryProcessor,
    summarizer: DatasetSummarizer,
    started: AtomicBool,
}

impl DatasetManager {
    /// Builds a manager over the in-memory store and columnar engine.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        let engine: Arc<dyn TableEngine> = Arc::new(ColumnarEngine::new());
        let storage: Arc<dyn DatasetStore> = Arc::new(InMemoryDatasetStore::with_engine(
            Arc::clone(&engine),
            config.storage_config(),
        ));
        Self::with_parts(config, storage, engine)
    }

    /// Builds a manager over a caller-supplied backend and engine.
    #[must_use]
    pub fn with_parts(
        config: ManagerConfig,
        storage: Arc<dyn DatasetStore>,
        engine: Arc<dyn TableEngine>,
    ) -> Self {
        Self {
            config,
            storage,
            processor: QueryProcessor::new(Arc::clone(&engine)),
            summarizer: DatasetSummarizer::new(engine),
            started: AtomicBool::new(false),
        }
    }

    /// The storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn DatasetStore> {
        &self.storage
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Starts the manager and its background reaper. Idempotent.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.storage.start().await;
        tracing::info!("dataset manager started");
    }

    /// Stops the reaper and marks the manager stopped. Idempotent.
    pub async fn shutdown(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.storage.shutdown().await;
        tracing::info!("dataset manager shut down");
    }

    /// Stores a dataset and returns its generated ID.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty dataset; `OutOfCapacity` when it cannot
    /// fit under the configured caps.
    pub async fn store(
        &self,
        table: Table,
        ttl_seconds: Option<u64>,
        tags: Option<Map<String, JsonValue>>,
    ) -> Result<String, FrameError> {
        self.start().await;
        let id = generate_id();
        let metadata = self.storage.store(table, &id, ttl_seconds, tags).await?;
        #[allow(clippy::cast_precision_loss)]
        {
            tracing::info!(
                df_id = %id,
                rows = metadata.shape.0,
                cols = metadata.shape.1,
                memory_mb = metadata.memory_bytes as f64 / (1024.0 * 1024.0),
                "stored dataset"
            );
        }
        Ok(id)
    }

    /// Retrieves a copy of a stored dataset, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    pub async fn get(&self, id: &str) -> Result<Option<Table>, FrameError> {
        self.start().await;
        let table = self.storage.retrieve(id).await?;
        if table.is_none() {
            tracing::debug!(df_id = %id, "dataset not found or expired");
        }
        Ok(table)
    }

    /// Executes a query operation, or returns `None` when the dataset is
    /// absent or expired.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` and `Engine` errors from the dispatcher surface with
    /// their message intact.
    pub async fn query(
        &self,
        id: &str,
        operation: &str,
        parameters: Option<Map<String, JsonValue>>,
    ) -> Result<Option<QueryResult>, FrameError> {
        self.start().await;
        let Some(table) = self.storage.retrieve(id).await? else {
            return Ok(None);
        };
        let parameters = parameters.unwrap_or_default();
        let result = self.processor.dispatch(&table, operation, &parameters).await?;
        tracing::debug!(
            df_id = %id,
            operation,
            elapsed_ms = result.execution_time_ms,
            "executed query"
        );
        Ok(Some(result))
    }

    /// Summarizes a stored dataset within `max_size_bytes`, or `None` when
    /// absent or expired. The returned summary carries the dataset ID.
    ///
    /// # Errors
    ///
    /// Summarizer failures surface; per-column failures are embedded in the
    /// summary instead.
    pub async fn summarize(
        &self,
        id: &str,
        max_size_bytes: usize,
        include_sample: bool,
    ) -> Result<Option<DatasetSummary>, FrameError> {
        self.start().await;
        let Some(table) = self.storage.retrieve(id).await? else {
            return Ok(None);
        };
        let mut summary = self
            .summarizer
            .summarize(&table, max_size_bytes, include_sample, None)
            .await?;
        summary.df_id = Some(id.to_string());
        Ok(Some(summary))
    }

    /// Renders a stored dataset for display, or `None` when absent or
    /// expired.
    ///
    /// # Errors
    ///
    /// Only internal failures; unknown format names fall back to `table`.
    pub async fn format_for_display(
        &self,
        id: &str,
        max_size_bytes: usize,
        format: &str,
    ) -> Result<Option<String>, FrameError> {
        self.start().await;
        let Some(table) = self.storage.retrieve(id).await? else {
            return Ok(None);
        };
        let rendered = self
            .summarizer
            .format_for_display(&table, max_size_bytes, DisplayFormat::parse(format))
            .await?;
        Ok(Some(rendered))
    }

    /// Lists live dataset metadata, optionally filtered by tags.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    pub async fn list(
        &self,
        tags: Option<&Map<String, JsonValue>>,
    ) -> Result<Vec<DatasetMetadata>, FrameError> {
        self.start().await;
        self.storage.list(tags, None).await
    }

    /// Deletes a dataset; `true` iff it existed.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    pub async fn delete(&self, id: &str) -> Result<bool, FrameError> {
        self.start().await;
        let deleted = self.storage.delete(id).await?;
        if deleted {
            tracing::info!(df_id = %id, "deleted dataset");
        }
        Ok(deleted)
    }

    /// Registry statistics.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    pub async fn stats(&self) -> Result<StorageStats, FrameError> {
        self.start().await;
        self.storage.stats().await
    }

    /// Triggers an expired-entry sweep, returning the removal count.
    ///
    /// # Errors
    ///
    /// Only internal failures.
    pub async fn cleanup_expired(&self) -> Result<usize, FrameError> {
        self.start().await;
        let removed = self.storage.cleanup_expired().await?;
        if removed > 0 {
            tracing::info!(count = removed, "cleaned up expired datasets");
        }
        Ok(removed)
    }
}

/// Process-wide default manager, lazily constructed.
static GLOBAL_MANAGER: parking_lot::Mutex<Option<Arc<DatasetManager>>> =
    parking_lot::Mutex::new(None);

/// Returns the process-wide manager, constructing it on first use.
///
/// `config` only takes effect on the constructing call; later calls return
/// the existing instance unchanged.
pub fn global_manager(config: Option<ManagerConfig>) -> Arc<DatasetManager> {
    let mut guard = GLOBAL_MANAGER.lock();
    if let Some(manager) = guard.as_ref() {
        return Arc::clone(manager);
    }
    let manager = Arc::new(DatasetManager::new(config.unwrap_or_default()));
    *guard = Some(Arc::clone(&manager));
    manager
}

/// Shuts down and disposes the process-wide manager, if any.
pub async fn shutdown_global_manager() {
    let taken = GLOBAL_MANAGER.lock().take();
    if let Some(manager) = taken {
        manager.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecache_core::TableBuilder;
    use serde_json::json;

    fn fixture() -> Table {
        TableBuilder::new()
            .int("id", vec![1, 2, 3])
            .str("name", vec!["a", "b", "c"])
            .build()
            .unwrap()
    }

    #[test]
    fn generated_ids_have_the_documented_format() {
        let id = generate_id();
        assert_eq!(id.len(), "dataframe-".len() + 8);
        assert!(id.starts_with("dataframe-"));
        assert!(id["dataframe-".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(generate_id(), generate_id());
    }

    #[tokio::test]
    async fn operations_start_the_manager_implicitly() {
        let manager = DatasetManager::new(ManagerConfig::default());
        // No explicit start(); store must succeed anyway.
        let id = manager.store(fixture(), None, None).await.unwrap();
        assert!(manager.get(&id).await.unwrap().is_some());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn start_and_shutdown_are_idempotent() {
        let manager = DatasetManager::new(ManagerConfig::default());
        manager.start().await;
        manager.start().await;
        manager.shutdown().await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn summarize_injects_the_dataset_id() {
        let manager = DatasetManager::new(ManagerConfig::default());
        let id = manager.store(fixture(), None, None).await.unwrap();
        let summary = manager.summarize(&id, 65536, true).await.unwrap().unwrap();
        assert_eq!(summary.df_id.as_deref(), Some(id.as_str()));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn missing_dataset_is_none_not_error() {
        let manager = DatasetManager::new(ManagerConfig::default());
        assert!(manager.get("dataframe-ffffffff").await.unwrap().is_none());
        assert!(manager
            .query("dataframe-ffffffff", "head", None)
            .await
            .unwrap()
            .is_none());
        assert!(manager
            .summarize("dataframe-ffffffff", 1024, false)
            .await
            .unwrap()
            .is_none());
        assert!(manager
            .format_for_display("dataframe-ffffffff", 1024, "table")
            .await
            .unwrap()
            .is_none());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn query_errors_surface_for_live_datasets() {
        let manager = DatasetManager::new(ManagerConfig::default());
        let id = manager.store(fixture(), None, None).await.unwrap();
        let err = manager
            .query(&id, "head", json!({"n": 0}).as_object().cloned())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn global_manager_is_shared_and_disposable() {
        let a = global_manager(None);
        let b = global_manager(None);
        assert!(Arc::ptr_eq(&a, &b));
        shutdown_global_manager().await;
        // A fresh instance after teardown.
        let c = global_manager(None);
        assert!(!Arc::ptr_eq(&a, &c));
        shutdown_global_manager().await;
    }
}
