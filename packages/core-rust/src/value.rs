//! Cell values and column type tags.
//!
//! A [`Cell`] is a single tabular value; a [`DType`] is the declared type of a
//! column. `Null` is a member of every column type rather than a type of its
//! own, matching the usual dataframe convention.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Column type tag.
///
/// The wire form is the lowercase tag string (`"int64"`, `"str"`, ...), which
/// is what metadata listings and summaries report as the column dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int64,
    Float64,
    Str,
    /// Milliseconds since the Unix epoch, rendered as ISO-8601 on the wire.
    Timestamp,
}

impl DType {
    /// Stable tag string used in metadata and summaries.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Str => "str",
            Self::Timestamp => "timestamp",
        }
    }

    /// Parses a tag string produced by [`DType::tag`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bool" => Some(Self::Bool),
            "int64" => Some(Self::Int64),
            "float64" => Some(Self::Float64),
            "str" => Some(Self::Str),
            "timestamp" => Some(Self::Timestamp),
            _ => None,
        }
    }

    /// Whether columns of this dtype participate in numeric statistics.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single tabular value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
}

impl Cell {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this cell is storable in a column of the given dtype.
    ///
    /// `Null` is valid in every column.
    #[must_use]
    pub fn fits(&self, dtype: DType) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(_) => dtype == DType::Bool,
            Self::Int(_) => dtype == DType::Int64,
            Self::Float(_) => dtype == DType::Float64,
            Self::Str(_) => dtype == DType::Str,
            Self::Timestamp(_) => dtype == DType::Timestamp,
        }
    }

    /// Numeric view of the cell, if it has one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Estimated heap + inline cost of this cell in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> u64 {
        let inline = std::mem::size_of::<Self>() as u64;
        match self {
            Self::Str(s) => inline + s.len() as u64,
            _ => inline,
        }
    }

    /// Display rendering used by text formats and substring matching.
    ///
    /// `Null` renders as the empty string; substring operators must check
    /// [`Cell::is_null`] before coercing.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format_float(*v),
            Self::Str(s) => s.clone(),
            Self::Timestamp(ms) => format_timestamp(*ms),
        }
    }

    /// JSON value for record output. `Timestamp` becomes an ISO-8601 string.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(ms) => serde_json::Value::String(format_timestamp(*ms)),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Renders a float without a trailing `.0` for whole numbers.
fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

/// ISO-8601 UTC rendering of epoch milliseconds.
#[must_use]
pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |dt| dt.to_rfc3339())
}
