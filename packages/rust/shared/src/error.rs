//! Error types for paperfilter.
//!
//! Library crates use [`PaperFilterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all paperfilter operations.
#[derive(Debug, thiserror::Error)]
pub enum PaperFilterError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the feed, classifier, or artifact host.
    #[error("network error: {0}")]
    Network(String),

    /// Feed or response body could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The relevance classifier is unreachable or returned an unusable result.
    #[error("scoring unavailable: {0}")]
    ScoringUnavailable(String),

    /// The run snapshot could not be written.
    #[error("persist failed at {path:?}: {message}")]
    Persist { path: PathBuf, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input (threshold out of range, empty topic set, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PaperFilterError>;

impl PaperFilterError {
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

    /// Create a scoring error from any displayable message.
    pub fn scoring(msg: impl Into<String>) -> Self {
        Self::ScoringUnavailable(msg.into())
    }

    /// Create a persist error for the snapshot at `path`.
    pub fn persist(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Persist {
            path: path.into(),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PaperFilterError::config("unknown backend 'gpt'");
        assert_eq!(err.to_string(), "config error: unknown backend 'gpt'");

        let err = PaperFilterError::validation("threshold 1.5 outside [0, 1]");
        assert!(err.to_string().contains("threshold 1.5"));

        let err = PaperFilterError::scoring("connection refused");
        assert_eq!(err.to_string(), "scoring unavailable: connection refused");
    }

    #[test]
    fn persist_error_mentions_path() {
        let err = PaperFilterError::persist("/tmp/papers/arxiv_ai_papers.json", "disk full");
        let msg = err.to_string();
        assert!(msg.contains("arxiv_ai_papers.json"));
        assert!(msg.contains("disk full"));
    }
}
