//! Engine error kinds.
//!
//! Every fallible engine primitive returns a distinguishable [`EngineError`]
//! so callers can map malformed requests to caller errors and everything else
//! to engine failures.

/// Errors raised by the tabular engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("column '{name}' not found")]
    MissingColumn { name: String },

    #[error("malformed expression: {message}")]
    MalformedExpression { message: String },

    #[error("unknown filter operator: {op}")]
    UnknownOperator { op: String },

    #[error("cannot order column '{column}' ({dtype}) against {operand}")]
    NonNumericComparison {
        column: String,
        dtype: String,
        operand: String,
    },

    #[error("malformed table: {message}")]
    MalformedTable { message: String },

    #[error("engine internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Whether the error is attributable to the caller's request rather than
    /// the engine itself.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Self::Internal { .. })
    }
}
