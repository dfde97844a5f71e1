//! Manager-level configuration.

use std::time::Duration;

/// User-facing configuration for a dataset manager.
///
/// Converted to [`StorageConfig`] when wiring the in-memory store.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Cap on the sum of deep memory across stored datasets, in megabytes.
    pub max_memory_mb: u64,
    /// TTL applied to stores that do not specify one. `None` means datasets
    /// without an explicit TTL never expire.
    pub default_ttl_seconds: Option<u64>,
    /// Background reaper sweep period in seconds.
    pub cleanup_interval_seconds: u64,
    /// Cap on the number of stored datasets.
    pub max_datasets: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024,
            default_ttl_seconds: Some(3600),
            cleanup_interval_seconds: 300,
            max_datasets: 1000,
        }
    }
}

/// Storage-level limits, applied per store instance.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Cap on the sum of deep memory across stored datasets, in bytes.
    pub max_memory_bytes: u64,
    /// Default TTL for stores that do not specify one.
    pub default_ttl_seconds: Option<u64>,
    /// Background reaper sweep period.
    pub cleanup_interval: Duration,
    /// Cap on the number of stored datasets.
    pub max_datasets: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        ManagerConfig::default().storage_config()
    }
}

impl ManagerConfig {
    /// Derives the byte-level storage limits from this config.
    #[must_use]
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            max_memory_bytes: self.max_memory_mb * 1024 * 1024,
            default_ttl_seconds: self.default_ttl_seconds,
            cleanup_interval: Duration::from_secs(self.cleanup_interval_seconds),
            max_datasets: self.max_datasets,
        }
    }
}
