//! Error types for the variable engine.

use promptvar_core::FsError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Systemic engine failures.
///
/// Per-entry resolution problems are reported as diagnostics instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The clipboard rejected the resolved text.
    #[error("Clipboard unavailable: {message}")]
    Clipboard { message: String },

    /// The template has no variable with this name.
    #[error("Unknown variable: {name}")]
    UnknownVariable { name: String },

    /// A filesystem failure that is not tied to a single entry.
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl EngineError {
    /// Create a clipboard error.
    pub fn clipboard(message: impl Into<String>) -> Self {
        Self::Clipboard {
            message: message.into(),
        }
    }
}
