//! Error types for the TermForge pipeline.
//!
//! Library crates use [`TermForgeError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.
//!
//! The taxonomy separates fatal errors (input unreadable, unknown column
//! layout) from recoverable per-row and per-job errors that are collected
//! into run reports without halting the pipeline.

use std::path::PathBuf;

/// Top-level error type for all TermForge operations.
#[derive(Debug, thiserror::Error)]
pub enum TermForgeError {
    /// Unreadable or empty source file. Fatal; raised before any
    /// checkpoint or record write.
    #[error("input error: {message}")]
    Input { message: String },

    /// Source header does not match any known column layout version.
    /// Fatal; raised before any row is yielded.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Per-row mapping failure. Recorded in the run report; the stream
    /// continues.
    #[error("row {offset}: {message}")]
    Row { offset: u64, message: String },

    /// Bulk upsert failure (whole batch or transport-level). Partial
    /// per-record failures are reported through batch outcomes instead.
    #[error("write error: {0}")]
    Write(String),

    /// AI backend failure. `retryable` drives the orchestrator's
    /// backoff-vs-short-circuit decision.
    #[error("generation error: {message}")]
    Generation { message: String, retryable: bool },

    /// Budget ceiling reached. A policy stop, not a call failure.
    #[error("budget exceeded: {message}")]
    BudgetExceeded { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TermForgeError>;

impl TermForgeError {
    /// Create an input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    /// Create a schema-mismatch error from any displayable message.
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: msg.into(),
        }
    }

    /// Create a per-row error carrying the source row offset.
    pub fn row(offset: u64, msg: impl Into<String>) -> Self {
        Self::Row {
            offset,
            message: msg.into(),
        }
    }

    /// Create a retryable generation error (rate limits, timeouts, 5xx).
    pub fn generation_retryable(msg: impl Into<String>) -> Self {
        Self::Generation {
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a terminal generation error (malformed prompt, rejected
    /// content, auth failure).
    pub fn generation_terminal(msg: impl Into<String>) -> Self {
        Self::Generation {
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the orchestrator may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Generation { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TermForgeError::input("zero rows in workbook");
        assert_eq!(err.to_string(), "input error: zero rows in workbook");

        let err = TermForgeError::row(17, "missing key column");
        assert_eq!(err.to_string(), "row 17: missing key column");

        let err = TermForgeError::schema_mismatch("no layout matches 12 columns");
        assert!(err.to_string().contains("12 columns"));
    }

    #[test]
    fn retryable_classification() {
        assert!(TermForgeError::generation_retryable("429").is_retryable());
        assert!(!TermForgeError::generation_terminal("400").is_retryable());
        assert!(!TermForgeError::input("bad file").is_retryable());
    }
}
