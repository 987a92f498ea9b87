//! Error types for livepage.
//!
//! Library crates use [`LivePageError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all livepage operations.
#[derive(Debug, thiserror::Error)]
pub enum LivePageError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the content store.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed payload from the content store or the live channel.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The requested entry does not exist in the content store.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Missing or invalid request context (entry id, environment, locale).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An entry references one of its own ancestors.
    #[error("reference cycle detected at entry {id}")]
    CycleDetected { id: String },

    /// Entry nesting exceeds the configured rebuild depth.
    #[error("entry graph deeper than {limit} levels")]
    DepthExceeded { limit: usize },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LivePageError>;

impl LivePageError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error for the given entry identity.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
