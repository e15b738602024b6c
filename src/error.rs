//! Error types for the dynascope context system.

use thiserror::Error;

/// Structural-update path navigation errors.
///
/// Raised when an override path cannot be resolved against the base value.
/// Navigation errors always abort the whole update; no partial result is
/// ever pushed onto a scope stack.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("missing key '{segment}' while navigating '{path}'")]
    MissingKey { path: String, segment: String },

    #[error("index {index} out of range while navigating '{path}'")]
    IndexOutOfRange { path: String, index: usize },

    #[error("segment '{segment}' is not a valid sequence index in '{path}'")]
    NotAnIndex { path: String, segment: String },

    #[error("segment '{segment}' of '{path}' addresses into {found}, which is not a container")]
    NotAContainer {
        path: String,
        segment: String,
        found: &'static str,
    },
}

/// Context-level errors surfaced by handle operations.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("override path error: {0}")]
    Path(#[from] PathError),

    #[error("key '{key}' not found in context '{context}'")]
    KeyNotFound { context: &'static str, key: String },

    #[error("context '{context}' is read-only outside enter(): cannot assign '{field}'")]
    ReadOnlyViolation { context: &'static str, field: String },

    #[error("context '{context}' payload is not a structured value: {detail}")]
    TypeMismatch {
        context: &'static str,
        detail: String,
    },

    #[error("timed out acquiring the mutation lock for context '{context}'")]
    LockTimeout { context: &'static str },
}

impl ContextError {
    /// Check whether this error is a key-not-found lookup failure.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, ContextError::KeyNotFound { .. })
    }

    /// Check whether this error rejects a write outside the enter protocol.
    pub fn is_read_only_violation(&self) -> bool {
        matches!(self, ContextError::ReadOnlyViolation { .. })
    }
}
