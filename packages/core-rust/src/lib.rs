//! Framecache core -- cell values, columnar tables, and the tabular engine.
//!
//! This crate provides the data-plane foundation for the framecache server:
//!
//! - **Values** ([`value`]): [`Cell`] and [`DType`], the cell/column type model
//! - **Tables** ([`table`]): [`Table`] and [`Column`], the rectangular
//!   column-typed value the cache stores and queries
//! - **Conditions** ([`conditions`]): the declarative filter grammar
//! - **Engine** ([`engine`]): the [`TableEngine`] capability trait and its
//!   in-memory [`ColumnarEngine`] implementation
//!
//! Everything here is synchronous and owns no shared state; the async cache,
//! dispatcher, and summarizer live in `framecache-server`.

pub mod conditions;
pub mod engine;
pub mod error;
pub mod table;
pub mod value;

pub use conditions::{parse_conditions, FilterCondition, FilterOp};
pub use engine::{ColumnarEngine, DescribeInclude, TableEngine};
pub use error::EngineError;
pub use table::{Column, Table, TableBuilder};
pub use value::{format_timestamp, Cell, DType};
