//! Typed parameters for the query operations.
//!
//! Each operation deserializes its parameter map into one of these structs
//! with `deny_unknown_fields`, so a stray key is a caller error rather than a
//! silent ignore. Range checks that serde cannot express live in `validate`
//! methods.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::FrameError;

fn default_n() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

/// Deserializes an operation's parameter map into its typed struct.
///
/// # Errors
///
/// Returns `InvalidArgument` naming the operation on any shape mismatch.
pub fn from_map<T: serde::de::DeserializeOwned>(
    operation: &str,
    params: &Map<String, JsonValue>,
) -> Result<T, FrameError> {
    T::deserialize(JsonValue::Object(params.clone())).map_err(|e| {
        FrameError::invalid(format!("bad parameters for '{operation}': {e}"))
    })
}

/// `head` / `tail`: first or last `n` rows.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowWindowParams {
    #[serde(default = "default_n")]
    pub n: u64,
}

impl RowWindowParams {
    /// # Errors
    ///
    /// `InvalidArgument` when `n` is zero.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.n == 0 {
            return Err(FrameError::invalid("'n' must be at least 1"));
        }
        Ok(())
    }
}

/// `sample`: uniform random rows by count or fraction.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleParams {
    #[serde(default)]
    pub n: Option<u64>,
    #[serde(default)]
    pub frac: Option<f64>,
    #[serde(default)]
    pub random_state: Option<u64>,
}

impl SampleParams {
    /// # Errors
    ///
    /// `InvalidArgument` when both `n` and `frac` are given, `n` is zero, or
    /// `frac` is outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.n.is_some() && self.frac.is_some() {
            return Err(FrameError::invalid(
                "'n' and 'frac' are mutually exclusive",
            ));
        }
        if self.n == Some(0) {
            return Err(FrameError::invalid("'n' must be at least 1"));
        }
        if let Some(frac) = self.frac {
            if !(frac > 0.0 && frac <= 1.0) {
                return Err(FrameError::invalid(format!(
                    "'frac' must be in (0, 1], got {frac}"
                )));
            }
        }
        Ok(())
    }
}

/// `describe`: optional column selector.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescribeParams {
    #[serde(default)]
    pub include: Option<JsonValue>,
}

/// `info` takes no parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InfoParams {}

/// `filter`: conditions map, combined with AND.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterParams {
    pub conditions: Map<String, JsonValue>,
}

impl FilterParams {
    /// # Errors
    ///
    /// `InvalidArgument` when the conditions map is empty.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.conditions.is_empty() {
            return Err(FrameError::invalid("'conditions' must not be empty"));
        }
        Ok(())
    }
}

/// `search`: case-insensitive literal substring match.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

/// `value_counts`: distinct values of one column.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueCountsParams {
    pub column: String,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default = "default_true")]
    pub dropna: bool,
}
