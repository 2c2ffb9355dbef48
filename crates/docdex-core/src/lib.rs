//! Core types for the docdex local document retrieval engine.
//!
//! This crate defines the data model shared across the workspace (folders,
//! collections, documents, chunks and the messages that flow between the
//! scan scheduler, the embedding service and the vector index) plus the
//! trait seams behind which the external collaborators live.
//!
//! The other crates build on these:
//!
//! - `docdex-chunker`: word-bounded text splitting
//! - `docdex-extract`: plain-text and PDF document readers
//! - `docdex-store`: SQLite metadata store with a trigram FTS mirror
//! - `docdex-index`: the scan scheduler and the indexing worker

pub mod error;
pub mod traits;
pub mod types;

pub use error::{EmbedError, Error, ExtractError, Result, StoreError};
pub use traits::{EmbeddingService, FolderWatcher, VectorIndex};
pub use types::{
    ChunkProvenance, CollectionProgress, CollectionSpec, DocumentInfo, EmbeddingChunk,
    EmbeddingMessage, EmbeddingResult, FolderStatistics, ProgressEvent, RetrievedChunk,
};

/// Chunks are dispatched to the embedding service in batches of this size.
pub const EMBEDDING_BATCH_SIZE: usize = 100;
