//! Error types for braid-jsonl operations.

use std::io;
use thiserror::Error;

/// The error type for braid-jsonl operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred while reading or writing.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    ///
    /// Only raised when *writing* records; unparseable input lines are
    /// reported as [`crate::Warning`]s instead.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for braid-jsonl operations.
pub type Result<T> = std::result::Result<T, Error>;
