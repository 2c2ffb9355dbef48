//! Shared data structures for docdex.
//!
//! ## Corpus model
//! - [`CollectionSpec`]: a named view binding one folder to an embedding model
//! - [`ChunkProvenance`]: where a chunk came from (file, title, page, ...)
//!
//! ## Pipeline messages
//! - [`EmbeddingChunk`]: in-flight request to the embedding service
//! - [`EmbeddingResult`]: the service's reply for one chunk
//! - [`DocumentInfo`]: a resumable scan-scheduler work item
//!
//! ## Observation
//! - [`CollectionProgress`]: derived per-collection indexing state
//! - [`ProgressEvent`]: one-way notifications emitted by the worker
//! - [`RetrievedChunk`]: retrieval result projection

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named view over exactly one folder, bound to an embedding model.
///
/// Unique by `(name, folder_id)`; the same folder may back several
/// collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub folder_id: i64,
    pub folder_path: PathBuf,
    /// Epoch milliseconds of the last completed update, if any.
    pub last_update_time: Option<i64>,
    pub embedding_model: String,
    /// Set after a schema upgrade; the collection must be fully rescanned
    /// before it is usable again.
    pub force_indexing: bool,
}

/// Provenance fields stored alongside every chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProvenance {
    pub file: String,
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    /// 1-based PDF page, -1 for free text.
    pub page: i64,
    /// Line tracking is not derived; always -1.
    pub line_from: i64,
    pub line_to: i64,
}

impl ChunkProvenance {
    /// Provenance for a plain-text document: file name only, no page.
    pub fn plain(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            page: -1,
            line_from: -1,
            line_to: -1,
            ..Default::default()
        }
    }
}

/// A chunk awaiting embedding, dispatched to the [`EmbeddingService`].
///
/// [`EmbeddingService`]: crate::EmbeddingService
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingChunk {
    pub folder_id: i64,
    pub chunk_id: i64,
    pub text: String,
}

/// One embedded vector, returned by the embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub folder_id: i64,
    pub chunk_id: i64,
    pub vector: Vec<f32>,
}

/// Messages delivered from the embedding service back to the worker.
#[derive(Debug, Clone)]
pub enum EmbeddingMessage {
    Completed(Vec<EmbeddingResult>),
    Failed { folder_id: i64, error: String },
}

/// A scan-scheduler work item: one document plus a resumable cursor.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub folder_id: i64,
    pub path: PathBuf,
    /// Size at enqueue time, used for byte-progress accounting.
    pub size: u64,
    /// True when this item resumes a partially processed document.
    pub currently_processing: bool,
    /// Next PDF page to read, 1-based.
    pub current_page: usize,
    /// Next byte offset for plain-text documents.
    pub current_position: usize,
}

impl DocumentInfo {
    pub fn new(folder_id: i64, path: PathBuf, size: u64) -> Self {
        Self {
            folder_id,
            path,
            size,
            currently_processing: false,
            current_page: 1,
            current_position: 0,
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.path.extension().is_some_and(|ext| ext == "pdf")
    }
}

/// Derived indexing state for one collection, pushed to observers.
///
/// The worker is the sole writer; observers only ever see snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionProgress {
    pub collection: String,
    pub folder_id: i64,
    pub folder_path: PathBuf,
    pub indexing: bool,
    pub installed: bool,
    pub force_indexing: bool,
    pub error: String,
    pub file_currently_processing: String,
    pub current_docs_to_index: usize,
    pub total_docs_to_index: usize,
    pub current_bytes_to_index: u64,
    pub total_bytes_to_index: u64,
    pub current_embeddings_to_index: usize,
    pub total_embeddings_to_index: usize,
    pub total_docs: usize,
    pub total_words: usize,
    pub total_tokens: usize,
}

/// One-way notifications from the indexing worker.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    CollectionAdded(CollectionProgress),
    CollectionUpdated(CollectionProgress),
    FolderRemoved(i64),
    CollectionListUpdated(Vec<CollectionProgress>),
    DatabaseValidChanged(bool),
}

/// A retrieval hit with its provenance (§4.5 projection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub file: String,
    pub title: String,
    pub author: String,
    /// Document mtime rendered as `yyyy, MMMM dd`.
    pub date: String,
    pub text: String,
    pub page: i64,
    pub line_from: i64,
    pub line_to: i64,
}

/// Per-folder corpus statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderStatistics {
    pub total_docs: usize,
    pub total_words: usize,
    pub total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_info_defaults() {
        let info = DocumentInfo::new(3, PathBuf::from("/corpus/notes.txt"), 42);
        assert_eq!(info.folder_id, 3);
        assert_eq!(info.current_page, 1);
        assert_eq!(info.current_position, 0);
        assert!(!info.currently_processing);
        assert!(!info.is_pdf());
    }

    #[test]
    fn document_info_pdf_detection() {
        let pdf = DocumentInfo::new(1, PathBuf::from("/corpus/paper.pdf"), 0);
        assert!(pdf.is_pdf());
        // suffix matching is case-sensitive
        let upper = DocumentInfo::new(1, PathBuf::from("/corpus/paper.PDF"), 0);
        assert!(!upper.is_pdf());
    }

    #[test]
    fn plain_provenance_has_no_page() {
        let prov = ChunkProvenance::plain("notes.txt");
        assert_eq!(prov.file, "notes.txt");
        assert_eq!(prov.page, -1);
        assert_eq!(prov.line_from, -1);
        assert_eq!(prov.line_to, -1);
        assert!(prov.title.is_empty());
    }

    #[test]
    fn collection_spec_serialization() {
        let spec = CollectionSpec {
            name: "papers".to_string(),
            folder_id: 7,
            folder_path: PathBuf::from("/home/user/papers"),
            last_update_time: None,
            embedding_model: "all-minilm-l6-v2".to_string(),
            force_indexing: true,
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: CollectionSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "papers");
        assert!(back.force_indexing);
        assert!(back.last_update_time.is_none());
    }
}
