//! Error types for the document portal.
//!
//! Library code returns [`Error`]. The ingestion pipeline wraps whatever
//! failed inside it exactly once into [`Error::Ingestion`], so callers get a
//! single domain-level failure whose `source()` chain still points at the
//! original cause.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for indexing, ingestion and query operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No index on disk and no texts to build one from.
    #[error("no existing vector index and no data to create one")]
    NoDataToInitialize,

    /// `add_documents` was called before `load_or_create`.
    #[error("call load_or_create() before adding documents")]
    NotInitialized,

    /// Extraction produced zero documents (all files unsupported or empty).
    #[error("no valid documents loaded")]
    NoValidDocuments,

    /// Index metadata could not be parsed. Recovered locally by the index
    /// manager; only surfaced by the low-level metadata reader.
    #[error("corrupt index metadata at {path}: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    /// File extension is not one of `.pdf`, `.docx`, `.txt`.
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Text extraction failed for a supported file.
    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// Chunk size / overlap combination is unusable.
    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(String),

    /// Session id would escape its base directory.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Embedding provider call failed.
    #[error("embedding provider failure: {0}")]
    Embedding(#[source] anyhow::Error),

    /// Reading or writing the persisted vector index failed.
    #[error("vector index I/O failure at {path}: {source}")]
    VectorIndexIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted vector index exists but is malformed.
    #[error("invalid vector index at {path}: {reason}")]
    InvalidIndex { path: PathBuf, reason: String },

    /// Chat model call failed.
    #[error("LLM failure: {0}")]
    Llm(#[source] anyhow::Error),

    /// Model output could not be parsed into the expected structure.
    #[error("could not parse model output: {0}")]
    OutputParse(String),

    /// Required provider or setting is missing or disabled.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any failure inside the ingestion pipeline, wrapped once at its boundary.
    #[error("failed to build retriever: {source}")]
    Ingestion {
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps `err` as an ingestion failure unless it already is one.
    pub fn ingestion(err: Error) -> Self {
        match err {
            wrapped @ Error::Ingestion { .. } => wrapped,
            other => Error::Ingestion {
                source: Box::new(other),
            },
        }
    }

    /// Strips the [`Error::Ingestion`] wrapper, if any.
    pub fn root(&self) -> &Error {
        match self {
            Error::Ingestion { source } => source.root(),
            other => other,
        }
    }

    /// True for failures caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.root(),
            Error::NoValidDocuments
                | Error::UnsupportedFileType(_)
                | Error::InvalidChunking(_)
                | Error::InvalidSessionId(_)
        )
    }
}

/// Result type alias for portal operations.
pub type Result<T> = std::result::Result<T, Error>;
