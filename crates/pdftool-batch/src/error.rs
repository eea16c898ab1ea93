//! Setup errors for a batch run.
//!
//! Per-file failures never surface here; they are recorded as
//! [`FileResult`](crate::dispatcher::FileResult) values.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Why a single file failed. Recorded in its
/// [`FileResult`](crate::dispatcher::FileResult) as a message.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid parameters for {operation}: {message}")]
    InvalidParams { operation: String, message: String },

    #[error("Failed to read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pdf(#[from] pdftool_core::PdfToolError),

    #[error("Worker panicked: {0}")]
    Panicked(String),
}
