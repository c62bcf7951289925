//! Error types for docfleet.
//!
//! Library crates use [`DocfleetError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docfleet operations.
#[derive(Debug, thiserror::Error)]
pub enum DocfleetError {
    /// Missing or invalid build configuration. Aborts the whole run.
    #[error("config error: {message}")]
    Config { message: String },

    /// A required tool, repository, or directory is missing. Aborts the whole run.
    #[error("prerequisite error: {message}")]
    Prerequisite { message: String },

    /// A step of a single version's build failed.
    #[error("build error: {message}")]
    Build { message: String },

    /// Network/HTTP error talking to the artifact host.
    #[error("network error: {0}")]
    Network(String),

    /// An external process could not be spawned or exited unsuccessfully.
    #[error("process error ({program}): {message}")]
    Process { program: String, message: String },

    /// Archive download or extraction error.
    #[error("archive error: {0}")]
    Archive(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed JSON, unexpected layout, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocfleetError>;

impl DocfleetError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a prerequisite error from any displayable message.
    pub fn prerequisite(msg: impl Into<String>) -> Self {
        Self::Prerequisite {
            message: msg.into(),
        }
    }

    /// Create a per-version build error from any displayable message.
    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build {
            message: msg.into(),
        }
    }

    /// Create a process error for `program`.
    pub fn process(program: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Process {
            program: program.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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
