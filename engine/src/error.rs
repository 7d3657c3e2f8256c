//! Error types for index building and serving.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A single input document was rejected. Ingestion can continue.
    #[error("invalid document: {0}")]
    Ingest(#[from] IngestError),

    /// Writing a partial segment failed. Fatal for the ingestion run.
    #[error("failed to flush partial segment {path}: {reason}")]
    Flush { path: PathBuf, reason: String },

    /// The merge phase aborted; any previously published index is untouched.
    #[error("merge failed: {0}")]
    Merge(String),

    /// The published index is structurally inconsistent and must not be served.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary encoding errors.
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// JSON errors.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-document ingestion failures.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The document has no URL.
    #[error("document has no url")]
    MissingUrl,

    /// No field produced a single term.
    #[error("document {url} has no indexable terms")]
    Empty { url: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
