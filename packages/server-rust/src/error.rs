//! Server-side error kinds and their stable wire codes.

use framecache_core::EngineError;

/// Errors surfaced by the registry, dispatcher, summarizer, and manager.
///
/// `NotFound` is converted to a none-result at the manager boundary and never
/// escapes `get`/`query`/`summarize`; the remaining kinds surface to callers
/// with their message intact.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("dataset not found: {id}")]
    NotFound { id: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("out of capacity: {message}")]
    OutOfCapacity { message: String },

    #[error("engine failure: {0}")]
    Engine(EngineError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FrameError {
    /// Shorthand for caller errors.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Stable code string for the wire error shape.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::OutOfCapacity { .. } => "out_of_capacity",
            Self::Engine(_) => "engine_failure",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<EngineError> for FrameError {
    /// Malformed requests are the caller's fault; everything else is an
    /// engine failure.
    fn from(e: EngineError) -> Self {
        if e.is_caller_error() {
            Self::InvalidArgument {
                message: e.to_string(),
            }
        } else {
            Self::Engine(e)
        }
    }
}
