//! Flat file-backed vector index.
//!
//! A brute-force cosine index over `chunk_id → vector`, persisted as JSON
//! next to the metadata database. Good enough for corpora in the tens of
//! thousands of chunks; anything larger belongs behind a real ANN library,
//! which this type's seam exists to make swappable.

use docdex_core::VectorIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const VECTOR_FILE: &str = "embeddings_v2.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedVectors {
    vectors: HashMap<i64, Vec<f32>>,
}

/// In-memory vector map with JSON persistence.
pub struct FlatVectorIndex {
    path: PathBuf,
    state: PersistedVectors,
    loaded: bool,
}

impl FlatVectorIndex {
    /// Create an index persisting under `model_path`.
    pub fn new(model_path: &Path) -> Self {
        Self {
            path: model_path.join(VECTOR_FILE),
            state: PersistedVectors::default(),
            loaded: false,
        }
    }

    pub fn len(&self) -> usize {
        self.state.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.vectors.is_empty()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

impl VectorIndex for FlatVectorIndex {
    fn add(&mut self, vector: &[f32], chunk_id: i64) -> bool {
        if vector.is_empty() {
            return false;
        }
        self.state.vectors.insert(chunk_id, vector.to_vec());
        // the index is materialized from the first write onward
        self.loaded = true;
        true
    }

    fn remove(&mut self, chunk_id: i64) {
        self.state.vectors.remove(&chunk_id);
    }

    fn search(&self, vector: &[f32], k: usize) -> Vec<i64> {
        let mut scored: Vec<(f32, i64)> = self
            .state
            .vectors
            .iter()
            .map(|(id, v)| (Self::cosine(vector, v), *id))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, id)| id).collect()
    }

    fn load(&mut self) -> bool {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), "cannot open vector file: {e}");
                return false;
            }
        };
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(state) => {
                self.state = state;
                self.loaded = true;
                debug!(vectors = self.len(), "vector index loaded");
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), "cannot parse vector file: {e}");
                false
            }
        }
    }

    fn save(&self) {
        let file = match File::create(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), "cannot create vector file: {e}");
                return;
            }
        };
        if let Err(e) = serde_json::to_writer(BufWriter::new(file), &self.state) {
            warn!(path = %self.path.display(), "cannot write vector file: {e}");
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn file_exists(&self) -> bool {
        self.path.exists()
    }
}
