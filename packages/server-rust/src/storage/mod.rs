//! Dataset registry: metadata, the storage-backend trait, and the in-memory
//! implementation with TTL expiry, LRU eviction, and the background reaper.

pub mod memory;
pub mod metadata;
pub mod store;

pub use memory::InMemoryDatasetStore;
pub use metadata::DatasetMetadata;
pub use store::{DatasetStore, StorageStats};
