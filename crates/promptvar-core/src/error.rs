//! Error types for handle, permission and batch operations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::{AccessMode, HandleKind};

/// Result type for filesystem-facing operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors that can occur while working with file and directory handles.
///
/// Per-item variants (`NotFound`, `Read`, `Write`, `PermissionDenied`) are
/// recovered and aggregated by callers; `Registry` is systemic.
#[derive(Debug, Clone, Error)]
pub enum FsError {
    /// The user declined access, or no user gesture was active.
    #[error("Permission denied for '{name}' ({mode}): {reason}")]
    PermissionDenied {
        name: String,
        mode: AccessMode,
        reason: String,
    },

    /// The host cannot perform the requested primitive.
    #[error("Capability unavailable for '{name}': {capability}")]
    Capability { name: String, capability: String },

    /// The handle no longer points at anything.
    #[error("Not found: {name}")]
    NotFound { name: String },

    /// Reading the handle failed.
    #[error("Failed to read '{name}': {source}")]
    Read {
        name: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Writing the handle failed.
    #[error("Failed to write '{name}': {source}")]
    Write {
        name: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Summary of a batch with failed operations.
    #[error("{} of {total} batch operations failed", failed.len())]
    BatchOperation {
        total: usize,
        failed: Vec<FailedOperation>,
    },

    /// The handle registry or its durable store is unavailable.
    #[error("Handle registry error: {message}")]
    Registry { message: String },

    /// Options supplied for a read or listing are invalid.
    #[error("Invalid options: {message}")]
    InvalidOptions { message: String },

    /// A handle of the wrong kind was supplied.
    #[error("'{name}' is a {actual}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: HandleKind,
        actual: HandleKind,
    },
}

impl FsError {
    /// Create a read error with handle context.
    pub fn read(name: impl Into<String>, source: std::io::Error) -> Self {
        let name = name.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { name },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                name,
                mode: AccessMode::Read,
                reason: source.to_string(),
            },
            _ => Self::Read {
                name,
                source: Arc::new(source),
            },
        }
    }

    /// Create a write error with handle context.
    pub fn write(name: impl Into<String>, source: std::io::Error) -> Self {
        let name = name.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { name },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                name,
                mode: AccessMode::ReadWrite,
                reason: source.to_string(),
            },
            _ => Self::Write {
                name,
                source: Arc::new(source),
            },
        }
    }

    /// Create a capability error.
    pub fn capability(name: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::Capability {
            name: name.into(),
            capability: capability.into(),
        }
    }

    /// Create a registry error.
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Whether the error is a permission failure.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Whether the error is a missing host capability.
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Capability { .. })
    }
}

/// A single failed operation inside a batch.
#[derive(Debug, Clone)]
pub struct FailedOperation {
    /// Index of the operation in the submitted batch.
    pub index: usize,
    /// Why it failed.
    pub error: FsError,
}

impl FailedOperation {
    /// Create a new failed operation record.
    pub fn new(index: usize, error: FsError) -> Self {
        Self { index, error }
    }
}

/// Error recorded while parsing template text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} at {position}")]
pub struct ParseError {
    /// Human-readable message.
    pub message: String,
    /// Character offset of the offending placeholder.
    pub position: usize,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Kind of validation failure for a variable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationErrorKind {
    /// A required variable has no value.
    Required,
    /// Value is shorter than the configured minimum.
    MinLength,
    /// Value is longer than the configured maximum.
    MaxLength,
    /// Value does not match the configured pattern.
    Pattern,
}

/// Validation failure for a single variable value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    /// Which rule failed.
    pub kind: ValidationErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
