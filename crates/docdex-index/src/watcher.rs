//! Filesystem watcher adapter.
//!
//! Wraps `notify-debouncer-full` behind the [`FolderWatcher`] seam. Each
//! registered folder is watched recursively; debounced events are mapped
//! back to the registered folder that contains them and delivered as
//! directory paths, which is what the cleanup-and-rescan handler expects.

use docdex_core::FolderWatcher;
use notify_debouncer_full::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, warn};

/// Debounced recursive watcher emitting changed folder paths.
pub struct NotifyFolderWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    roots: Arc<Mutex<Vec<PathBuf>>>,
}

impl NotifyFolderWatcher {
    /// Create a watcher delivering changed folder paths on `event_tx`.
    pub fn new(
        event_tx: tokio_mpsc::Sender<PathBuf>,
        debounce: Duration,
    ) -> Result<Self, notify_debouncer_full::notify::Error> {
        let (tx, rx) = mpsc::channel();
        let roots = Arc::new(Mutex::new(Vec::new()));

        // Bridge thread: debouncer callbacks arrive on notify's thread and
        // are forwarded onto the worker's tokio channel.
        let thread_roots = Arc::clone(&roots);
        std::thread::spawn(move || {
            while let Ok(result) = rx.recv() {
                forward_changed_roots(result, &thread_roots, &event_tx);
            }
        });

        let debouncer = new_debouncer(debounce, None, move |result| {
            let _ = tx.send(result);
        })?;

        Ok(Self { debouncer, roots })
    }
}

impl FolderWatcher for NotifyFolderWatcher {
    fn add(&mut self, path: &Path) -> bool {
        match self.debouncer.watch(path, RecursiveMode::Recursive) {
            Ok(()) => {
                debug!(path = %path.display(), "watching folder");
                let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
                if !roots.iter().any(|r| r == path) {
                    roots.push(path.to_path_buf());
                }
                true
            }
            Err(e) => {
                warn!(path = %path.display(), "cannot watch folder: {e}");
                false
            }
        }
    }

    fn remove(&mut self, path: &Path) -> bool {
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        roots.retain(|r| r != path);
        drop(roots);
        match self.debouncer.unwatch(path) {
            Ok(()) => {
                debug!(path = %path.display(), "unwatched folder");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), "cannot unwatch folder: {e}");
                false
            }
        }
    }
}

fn forward_changed_roots(
    result: DebounceEventResult,
    roots: &Arc<Mutex<Vec<PathBuf>>>,
    event_tx: &tokio_mpsc::Sender<PathBuf>,
) {
    let events = match result {
        Ok(events) => events,
        Err(errors) => {
            for err in errors {
                error!("watch error: {err}");
            }
            return;
        }
    };

    let roots = roots.lock().unwrap_or_else(|e| e.into_inner()).clone();
    let mut changed = BTreeSet::new();
    for event in events {
        for path in &event.paths {
            if let Some(root) = roots.iter().find(|r| path.starts_with(r)) {
                changed.insert(root.clone());
            }
        }
    }

    for root in changed {
        if event_tx.blocking_send(root).is_err() {
            warn!("watch event channel closed");
            return;
        }
    }
}
