//! Trait seams for the external collaborators.
//!
//! The engine treats the embedding runtime, the dense vector index and the
//! filesystem watcher as pluggable collaborators:
//!
//! - [`EmbeddingService`]: batched async text → vector
//! - [`VectorIndex`]: append-only `chunk_id → vector` map with k-NN search
//! - [`FolderWatcher`]: path-change notifications
//!
//! Results and change notifications are delivered as one-way messages on
//! channels handed to the implementation at construction; the indexing
//! worker consumes them serially.

use async_trait::async_trait;
use std::path::Path;

use crate::error::EmbedError;
use crate::types::EmbeddingChunk;

/// Batched asynchronous embedding backend.
///
/// `submit` is fire-and-forget: the implementation eventually delivers an
/// [`EmbeddingMessage`] on the channel it was constructed with, either the
/// vectors for the whole batch or a per-folder error.
///
/// [`EmbeddingMessage`]: crate::EmbeddingMessage
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Name of the model in use; empty means no model is configured.
    fn model(&self) -> String;

    /// Dispatch a batch for embedding. Results arrive asynchronously.
    fn submit(&self, batch: Vec<EmbeddingChunk>);

    /// Embed a single query text synchronously from the caller's view.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Dense vector index over chunk ids.
///
/// Mutations are applied by the worker strictly after the corresponding
/// metadata transaction commits, then persisted via [`save`].
///
/// [`save`]: VectorIndex::save
pub trait VectorIndex: Send {
    /// Add a vector under `chunk_id`. Returns false if the add failed.
    fn add(&mut self, vector: &[f32], chunk_id: i64) -> bool;

    /// Remove the vector for `chunk_id`, if present.
    fn remove(&mut self, chunk_id: i64);

    /// Return the ids of the `k` nearest vectors.
    fn search(&self, vector: &[f32], k: usize) -> Vec<i64>;

    /// Load the persisted index. Returns false on failure.
    fn load(&mut self) -> bool;

    /// Persist the index.
    fn save(&self);

    fn is_loaded(&self) -> bool;

    fn file_exists(&self) -> bool;
}

/// Recursive directory watcher.
///
/// Change notifications are delivered as directory paths on the channel the
/// implementation was constructed with.
pub trait FolderWatcher: Send {
    /// Start watching `path`. Returns false if the watch could not be added.
    fn add(&mut self, path: &Path) -> bool;

    /// Stop watching `path`. Returns false if the path was not watched.
    fn remove(&mut self, path: &Path) -> bool;
}
