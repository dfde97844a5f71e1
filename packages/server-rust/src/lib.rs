//! Framecache server -- process-resident tabular dataset cache and query
//! dispatcher.
//!
//! Components, composed by [`DatasetManager`]:
//!
//! 1. **Registry** ([`storage`]): concurrent ID-keyed store with memory and
//!    count caps, TTL expiry, and LRU eviction
//! 2. **Reaper**: background task owned by the store that sweeps expired
//!    entries on an interval
//! 3. **Dispatcher** ([`query`]): validates `(id, operation, parameters)` and
//!    routes to the tabular engine
//! 4. **Summarizer** ([`summarizer`]): size-bounded structured summaries and
//!    budgeted text renderings
//! 5. **Wire shapes** ([`response`]): listing, query-response, and error JSON
//!    forms for outer wrappers

pub mod config;
pub mod error;
pub mod manager;
pub mod query;
pub mod response;
pub mod storage;
pub mod summarizer;

pub use config::{ManagerConfig, StorageConfig};
pub use error::FrameError;
pub use manager::{global_manager, shutdown_global_manager, DatasetManager};
pub use query::{QueryProcessor, QueryResult, OPERATIONS};
pub use response::{api_error_response, error_response, metadata_wire, query_response};
pub use storage::{DatasetMetadata, DatasetStore, InMemoryDatasetStore, StorageStats};
pub use summarizer::{DatasetSummarizer, DatasetSummary, DisplayFormat};
