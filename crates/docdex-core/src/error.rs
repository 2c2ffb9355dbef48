//! Error types for docdex.

use thiserror::Error;

/// Main error type for docdex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Metadata store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Content extraction failed
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Metadata store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("prepare failed: {0}")]
    Prepare(String),

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

/// Document reading errors (§7 error kinds for the scheduler).
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Path vanished between enqueue and processing
    #[error("file missing: {0}")]
    IoMissing(String),

    /// Permission denied, locked, or not valid text
    #[error("file unreadable: {0}")]
    IoUnreadable(String),

    /// PDF failed to load or decode
    #[error("corrupt document: {0}")]
    Corrupt(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("no embedding model configured")]
    NoModel,

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Result type alias for docdex operations.
pub type Result<T> = std::result::Result<T, Error>;
