//! docdex: a local document retrieval engine.
//!
//! docdex turns a user-configured set of filesystem folders into a
//! searchable corpus backed by two complementary indexes: a SQLite store of
//! text chunks with trigram full-text search, and a dense vector index over
//! per-chunk embeddings. Queries return the top-scoring chunks with their
//! provenance (file, title, author, page, timestamp).
//!
//! # Architecture
//!
//! A single indexing worker ([`docdex_index::IndexCoordinator`]) owns all
//! mutable state. Folders are walked and watched; documents stream into the
//! database in bounded time slices; chunks are dispatched to an
//! [`docdex_core::EmbeddingService`] in batches of 100 and their vectors
//! land in a [`docdex_core::VectorIndex`]. Retrieval fuses vector
//! similarity with a trigram N-gram fallback.
//!
//! This crate wires the engine together and ships two reference
//! collaborators:
//!
//! - [`HashEmbedder`]: deterministic blake3-derived embeddings
//! - [`FlatVectorIndex`]: brute-force cosine search, JSON persistence
//!
//! # Quick start
//!
//! ```rust,no_run
//! use docdex::{Config, Engine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::start(Config::default())?;
//! engine.handle().add_folder("notes", "/home/me/notes".as_ref()).await?;
//! engine.handle().wait_idle().await?;
//!
//! let hits = engine
//!     .handle()
//!     .retrieve(&["notes".to_string()], "quarterly report", 5)
//!     .await?;
//! for hit in hits {
//!     println!("{} ({}): {}", hit.file, hit.date, hit.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embed;
pub mod vector;

pub use config::{data_dir, Config};
pub use embed::{hash_embedding, HashEmbedder, HASH_DIM};
pub use vector::FlatVectorIndex;

use docdex_index::{CoordinatorConfig, CoordinatorHandle, IndexCoordinator, NotifyFolderWatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A fully wired engine: coordinator plus reference collaborators.
pub struct Engine {
    handle: CoordinatorHandle,
}

impl Engine {
    /// Wire up the reference stack and start the indexing worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: Config) -> Result<Self, docdex_core::Error> {
        std::fs::create_dir_all(&config.model_path)?;

        let (embed_tx, embed_rx) = mpsc::channel(256);
        let (watch_tx, watch_rx) = mpsc::channel(256);

        let watcher = NotifyFolderWatcher::new(watch_tx, Duration::from_millis(config.debounce_ms))
            .map_err(|e| docdex_core::Error::Other(format!("cannot start watcher: {e}")))?;
        let embedder = Arc::new(HashEmbedder::new(embed_tx));
        let vectors = Box::new(FlatVectorIndex::new(&config.model_path));

        let handle = IndexCoordinator::spawn(
            CoordinatorConfig {
                model_path: config.model_path.clone(),
                chunk_size: config.chunk_size,
            },
            embedder,
            vectors,
            Box::new(watcher),
            embed_rx,
            watch_rx,
        );

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &CoordinatorHandle {
        &self.handle
    }
}
