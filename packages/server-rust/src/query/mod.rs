//! Query dispatch: typed operation parameters and the operation router.

pub mod params;
pub mod processor;

pub use processor::{QueryProcessor, QueryResult, OPERATIONS};
