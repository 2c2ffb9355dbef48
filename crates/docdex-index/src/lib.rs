//! Indexing engine for docdex.
//!
//! This crate drives the pipeline that turns configured folders into a
//! searchable corpus: walk → chunk → store → embed, interleaved with
//! retrieval.
//!
//! # Components
//!
//! - [`IndexCoordinator`]: the single worker task owning all mutable state
//! - [`CoordinatorHandle`]: command/query interface to the worker
//! - [`ScanScheduler`]: per-folder FIFO of resumable document cursors
//! - [`NotifyFolderWatcher`]: filesystem watcher adapter
//! - [`retriever`]: N-gram fallback query construction and result shaping
//!
//! # Example
//!
//! ```rust,ignore
//! use docdex_index::{CoordinatorConfig, IndexCoordinator};
//!
//! let handle = IndexCoordinator::spawn(
//!     CoordinatorConfig { model_path, chunk_size: 512 },
//!     embedder,
//!     vectors,
//!     watcher,
//!     embed_rx,
//!     watch_rx,
//! );
//!
//! handle.add_folder("notes", &folder).await?;
//! handle.wait_idle().await?;
//! let hits = handle.retrieve(&["notes".into()], "the quick brown fox", 5).await?;
//! ```

pub mod coordinator;
pub mod retriever;
pub mod scheduler;
pub mod watcher;

pub use coordinator::{CoordinatorConfig, CoordinatorHandle, IndexCoordinator};
pub use scheduler::ScanScheduler;
pub use watcher::NotifyFolderWatcher;
