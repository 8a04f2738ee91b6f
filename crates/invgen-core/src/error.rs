//! Error types for the inventory engine.
//!
//! User-input problems (schema violations, duplicate keys, lifecycle misuse,
//! lock contention) are kept apart from internal failures so the command
//! surface can map them onto distinct exit codes.

use crate::loader::ValidationReport;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the inventory engine.
#[derive(Debug, Error)]
pub enum InvgenError {
    // Source validation
    #[error("Validation failed for {}: {}", file.display(), report.summary())]
    Validation {
        file: PathBuf,
        report: Box<ValidationReport>,
    },

    // Concurrency
    #[error("Timed out after {timeout:?} waiting for exclusive lock on {}", path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    // File system errors
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("CSV error in {}: {message}", path.display())]
    Csv {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<csv::Error>,
    },

    #[error("YAML error: {message}")]
    Yaml {
        message: String,
        #[source]
        source: Option<serde_yaml::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Lifecycle errors
    #[error("Lifecycle error for {key}: {message}")]
    Lifecycle { key: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, InvgenError>;

impl From<std::io::Error> for InvgenError {
    fn from(err: std::io::Error) -> Self {
        InvgenError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_yaml::Error> for InvgenError {
    fn from(err: serde_yaml::Error) -> Self {
        InvgenError::Yaml {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for InvgenError {
    fn from(err: serde_json::Error) -> Self {
        InvgenError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl InvgenError {
    /// Create an IO error with path context.
    ///
    /// A `NotFound` error becomes [`InvgenError::FileNotFound`] so callers see
    /// the missing-file exit code.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            return InvgenError::FileNotFound(path);
        }
        InvgenError::Io {
            message: err.to_string(),
            path: Some(path),
            source: Some(err),
        }
    }

    /// Process exit code for this error.
    ///
    /// - 1: validation or user error
    /// - 2: missing required file
    /// - 3: unexpected internal error
    pub fn exit_code(&self) -> i32 {
        match self {
            InvgenError::Validation { .. }
            | InvgenError::LockTimeout { .. }
            | InvgenError::Lifecycle { .. }
            | InvgenError::Config { .. } => 1,

            InvgenError::FileNotFound(_) => 2,

            _ => 3,
        }
    }

    /// Whether the error was caused by user input rather than an internal failure.
    pub fn is_user_error(&self) -> bool {
        self.exit_code() != 3
    }
}
