//! Feature-hash embedding backend.
//!
//! A deterministic stand-in for a real embedding model runtime: vectors are
//! derived from a blake3 digest of the text, so identical texts are exact
//! matches and the whole pipeline can run without model downloads. Swap in
//! a real backend behind [`EmbeddingService`] for semantic quality.

use async_trait::async_trait;
use docdex_core::{
    EmbedError, EmbeddingChunk, EmbeddingMessage, EmbeddingResult, EmbeddingService,
};
use tokio::sync::mpsc;

/// Embedding dimension of the hash backend.
pub const HASH_DIM: usize = 384;

/// Deterministic blake3-derived embedder.
pub struct HashEmbedder {
    results_tx: mpsc::Sender<EmbeddingMessage>,
}

impl HashEmbedder {
    /// Create an embedder delivering batch results on `results_tx`.
    pub fn new(results_tx: mpsc::Sender<EmbeddingMessage>) -> Self {
        Self { results_tx }
    }
}

/// Derive a unit vector from the text's blake3 digest.
pub fn hash_embedding(text: &str) -> Vec<f32> {
    let digest = blake3::hash(text.as_bytes());
    let bytes = digest.as_bytes();
    let mut vector: Vec<f32> = (0..HASH_DIM)
        .map(|i| (f32::from(bytes[i % 32]) / 255.0) - 0.5)
        .collect();
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[async_trait]
impl EmbeddingService for HashEmbedder {
    fn model(&self) -> String {
        "feature-hash-384".to_string()
    }

    fn submit(&self, batch: Vec<EmbeddingChunk>) {
        let results: Vec<EmbeddingResult> = batch
            .iter()
            .map(|chunk| EmbeddingResult {
                folder_id: chunk.folder_id,
                chunk_id: chunk.chunk_id,
                vector: hash_embedding(&chunk.text),
            })
            .collect();
        let tx = self.results_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(EmbeddingMessage::Completed(results)).await;
        });
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(hash_embedding(text))
    }
}
