//! The indexing worker.
//!
//! [`IndexCoordinator`] owns the metadata store, the scan scheduler, the
//! vector index and the watcher registration, and runs as a single tokio
//! task: commands, embedding results and watcher notifications are handled
//! serially, interleaved with time-sliced scan ticks. Nothing else ever
//! touches the store.
//!
//! Every tick opens one store transaction and dequeues documents until the
//! time budget runs out; the tick commits only if every dequeued document's
//! metadata changes succeeded. Vector-index mutations are applied strictly
//! after a successful commit and then persisted, so the vector file can at
//! worst briefly contain entries whose chunks are gone; startup cleanup is
//! the safety net for that.

use docdex_chunker::{TextChunk, WordChunker};
use docdex_core::{
    ChunkProvenance, CollectionProgress, DocumentInfo, EmbeddingChunk, EmbeddingMessage,
    EmbeddingService, Error, FolderWatcher, ProgressEvent, RetrievedChunk, StoreError,
    VectorIndex, EMBEDDING_BATCH_SIZE,
};
use docdex_extract::{kind_for_path, text, PdfReader};
use docdex_store::{LegacyCollection, MetadataStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::retriever;
use crate::scheduler::ScanScheduler;

/// Wall-time budget of productive work per scan tick.
const SCAN_BUDGET: Duration = Duration::from_millis(100);

/// Scan timer cadence.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Chunk cap per plain-text slice, bounding work per dequeue.
const TEXT_CHUNKS_PER_SLICE: usize = 100;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Directory holding the database file.
    pub model_path: PathBuf,
    /// Chunk budget in characters, inclusive of inter-word spaces.
    pub chunk_size: usize,
}

enum Command {
    AddFolder {
        collection: String,
        path: PathBuf,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    RemoveFolder {
        collection: String,
        path: PathBuf,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    ForceIndexing {
        collection: String,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    ChangeChunkSize {
        chunk_size: usize,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Cleanup {
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Retrieve {
        collections: Vec<String>,
        query: String,
        limit: usize,
        reply: oneshot::Sender<Vec<RetrievedChunk>>,
    },
    Collections {
        reply: oneshot::Sender<Vec<CollectionProgress>>,
    },
    WaitIdle {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Cheap cloneable handle to the indexing worker.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<ProgressEvent>,
}

impl CoordinatorHandle {
    /// Subscribe to one-way progress notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.updates.subscribe()
    }

    pub async fn add_folder(&self, collection: &str, path: &Path) -> Result<(), Error> {
        self.request(|reply| Command::AddFolder {
            collection: collection.to_string(),
            path: path.to_path_buf(),
            reply,
        })
        .await?
    }

    pub async fn remove_folder(&self, collection: &str, path: &Path) -> Result<(), Error> {
        self.request(|reply| Command::RemoveFolder {
            collection: collection.to_string(),
            path: path.to_path_buf(),
            reply,
        })
        .await?
    }

    pub async fn force_indexing(&self, collection: &str) -> Result<(), Error> {
        self.request(|reply| Command::ForceIndexing {
            collection: collection.to_string(),
            reply,
        })
        .await?
    }

    pub async fn change_chunk_size(&self, chunk_size: usize) -> Result<(), Error> {
        self.request(|reply| Command::ChangeChunkSize { chunk_size, reply })
            .await?
    }

    pub async fn cleanup(&self) -> Result<(), Error> {
        self.request(|reply| Command::Cleanup { reply }).await?
    }

    /// Retrieve the top chunks for a query across the named collections.
    /// Failures surface as an empty result plus a diagnostic log line.
    pub async fn retrieve(
        &self,
        collections: &[String],
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, Error> {
        self.request(|reply| Command::Retrieve {
            collections: collections.to_vec(),
            query: query.to_string(),
            limit,
            reply,
        })
        .await
    }

    /// Snapshot of every collection's progress state.
    pub async fn collections(&self) -> Result<Vec<CollectionProgress>, Error> {
        self.request(|reply| Command::Collections { reply }).await
    }

    /// Resolve once the scan queue is drained and no embedding batches are
    /// in flight.
    pub async fn wait_idle(&self) -> Result<(), Error> {
        self.request(|reply| Command::WaitIdle { reply }).await
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| worker_gone())?;
        reply_rx.await.map_err(|_| worker_gone())
    }
}

fn worker_gone() -> Error {
    Error::Other("indexing worker stopped".to_string())
}

/// The indexing worker state. Constructed and driven by [`spawn`].
///
/// [`spawn`]: IndexCoordinator::spawn
pub struct IndexCoordinator {
    config: CoordinatorConfig,
    store: Option<MetadataStore>,
    scheduler: ScanScheduler,
    chunker: WordChunker,
    embedder: Arc<dyn EmbeddingService>,
    vectors: Box<dyn VectorIndex>,
    watcher: Box<dyn FolderWatcher>,
    pending: Vec<EmbeddingChunk>,
    inflight_batches: usize,
    progress: BTreeMap<i64, CollectionProgress>,
    updates: broadcast::Sender<ProgressEvent>,
    valid: bool,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl IndexCoordinator {
    /// Start the worker task and return a handle to it.
    ///
    /// `embed_rx` carries replies from the embedding service, `watch_rx`
    /// changed-folder notifications from the watcher; both are consumed
    /// serially by the worker.
    pub fn spawn(
        config: CoordinatorConfig,
        embedder: Arc<dyn EmbeddingService>,
        vectors: Box<dyn VectorIndex>,
        watcher: Box<dyn FolderWatcher>,
        embed_rx: mpsc::Receiver<EmbeddingMessage>,
        watch_rx: mpsc::Receiver<PathBuf>,
    ) -> CoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (updates_tx, _) = broadcast::channel(256);

        let chunk_size = config.chunk_size;
        let worker = Self {
            config,
            store: None,
            scheduler: ScanScheduler::new(),
            chunker: WordChunker::new(chunk_size),
            embedder,
            vectors,
            watcher,
            pending: Vec::new(),
            inflight_batches: 0,
            progress: BTreeMap::new(),
            updates: updates_tx.clone(),
            valid: true,
            idle_waiters: Vec::new(),
        };

        tokio::spawn(worker.run(command_rx, embed_rx, watch_rx));

        CoordinatorHandle {
            commands: command_tx,
            updates: updates_tx,
        }
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<Command>,
        mut embed_rx: mpsc::Receiver<EmbeddingMessage>,
        mut watch_rx: mpsc::Receiver<PathBuf>,
    ) {
        self.startup();

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                Some(msg) = embed_rx.recv() => self.handle_embedding_message(msg),
                Some(path) = watch_rx.recv() => self.directory_changed(&path),
                _ = tick.tick() => {
                    if self.scheduler.has_work() {
                        self.scan_tick();
                    }
                    self.notify_if_idle();
                }
            }
        }
        info!("indexing worker stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::AddFolder {
                collection,
                path,
                reply,
            } => {
                let result = self.add_folder(&collection, &path);
                let _ = reply.send(result);
            }
            Command::RemoveFolder {
                collection,
                path,
                reply,
            } => {
                let result = self.remove_folder(&collection, &path);
                let _ = reply.send(result);
            }
            Command::ForceIndexing { collection, reply } => {
                let result = self.force_indexing(&collection);
                let _ = reply.send(result);
            }
            Command::ChangeChunkSize { chunk_size, reply } => {
                let result = self.change_chunk_size(chunk_size);
                let _ = reply.send(result);
            }
            Command::Cleanup { reply } => {
                let result = self.cleanup();
                let _ = reply.send(result);
            }
            Command::Retrieve {
                collections,
                query,
                limit,
                reply,
            } => {
                let results = self.retrieve(&collections, &query, limit).await;
                let _ = reply.send(results);
            }
            Command::Collections { reply } => {
                let _ = reply.send(self.progress.values().cloned().collect());
            }
            Command::WaitIdle { reply } => {
                if self.is_idle() {
                    let _ = reply.send(());
                } else {
                    self.idle_waiters.push(reply);
                }
            }
            Command::Shutdown => {}
        }
    }

    // -- Startup --

    fn startup(&mut self) {
        match MetadataStore::open(&self.config.model_path) {
            Ok(outcome) => {
                self.store = Some(outcome.store);
                if !outcome.carried.is_empty() && !self.add_forced_collections(&outcome.carried) {
                    self.valid = false;
                }
            }
            Err(e) => {
                error!("cannot open metadata store: {e}");
                self.valid = false;
            }
        }

        if self.valid && self.vectors.file_exists() && !self.vectors.load() {
            error!("cannot load vector index");
            self.valid = false;
        }

        if self.valid {
            self.add_current_folders();
        } else {
            self.emit(ProgressEvent::DatabaseValidChanged(false));
        }
    }

    /// Re-insert collections carried over from an older database version,
    /// marked for forced indexing against the current embedding model.
    fn add_forced_collections(&mut self, carried: &[LegacyCollection]) -> bool {
        let model = self.embedder.model();
        if model.is_empty() {
            error!("no embedding model for carried collections");
            return false;
        }
        let Some(store) = &self.store else {
            return false;
        };
        if store.begin().is_err() {
            return false;
        }

        for legacy in carried {
            let added = self
                .check_and_add_folder(&legacy.folder_path)
                .and_then(|folder_id| {
                    self.store()?
                        .add_collection(&legacy.name, folder_id, None, &model, true)
                        .map_err(Error::from)?;
                    Ok(folder_id)
                });
            match added {
                Ok(folder_id) => {
                    let progress = self.progress_entry(folder_id, &legacy.name, &legacy.folder_path);
                    progress.force_indexing = true;
                    let snapshot = progress.clone();
                    self.emit(ProgressEvent::CollectionAdded(snapshot));
                }
                Err(e) => {
                    error!(collection = %legacy.name, "cannot carry collection forward: {e}");
                    if let Some(store) = &self.store {
                        let _ = store.rollback();
                    }
                    return false;
                }
            }
        }

        self.store.as_ref().is_some_and(|s| s.commit().is_ok())
    }

    /// Register all stored collections: re-dispatch incomplete embeddings
    /// and re-enqueue scans for everything not awaiting a forced reindex.
    fn add_current_folders(&mut self) {
        let collections = match self.store().and_then(|s| s.collections().map_err(Error::from)) {
            Ok(c) => c,
            Err(e) => {
                error!("cannot select collections: {e}");
                return;
            }
        };

        for spec in &collections {
            let entry = self.progress_entry(spec.folder_id, &spec.name, &spec.folder_path);
            entry.installed = true;
            entry.force_indexing = spec.force_indexing;
        }
        self.emit(ProgressEvent::CollectionListUpdated(
            self.progress.values().cloned().collect(),
        ));

        for spec in collections {
            if !spec.force_indexing {
                self.schedule_uncompleted_embeddings(spec.folder_id);
                if let Err(e) = self.add_folder(&spec.name, &spec.folder_path) {
                    warn!(collection = %spec.name, "cannot re-add folder: {e}");
                }
            }
        }

        self.update_statistics();
    }

    /// Re-dispatch chunks that never received an embedding, in batches.
    fn schedule_uncompleted_embeddings(&mut self, folder_id: i64) {
        let chunks = match self.store().and_then(|s| {
            s.uncompleted_chunks(folder_id).map_err(Error::from)
        }) {
            Ok(c) => c,
            Err(e) => {
                warn!("cannot select uncompleted chunks: {e}");
                return;
            }
        };
        if chunks.is_empty() {
            return;
        }

        let total = match self.store().and_then(|s| s.count_chunks(folder_id).map_err(Error::from))
        {
            Ok(n) => n,
            Err(e) => {
                warn!("cannot count chunks: {e}");
                return;
            }
        };

        if let Some(progress) = self.progress.get_mut(&folder_id) {
            progress.total_embeddings_to_index = total;
            progress.current_embeddings_to_index = total - chunks.len();
            let snapshot = progress.clone();
            self.emit(ProgressEvent::CollectionUpdated(snapshot));
        }

        for batch in chunks.chunks(EMBEDDING_BATCH_SIZE) {
            self.inflight_batches += 1;
            self.embedder.submit(batch.to_vec());
        }
    }

    // -- Folder management --

    fn add_folder(&mut self, collection: &str, path: &Path) -> Result<(), Error> {
        if !self.valid {
            return Err(Error::Store(StoreError::Init(
                "database invalid".to_string(),
            )));
        }
        let folder_id = self.check_and_add_folder(path)?;

        let model = self.embedder.model();
        if model.is_empty() {
            return Err(docdex_core::EmbedError::NoModel.into());
        }

        let known = self.store()?.folders_for_collection(collection)?;
        if !known.iter().any(|(id, _)| *id == folder_id) {
            self.store()?
                .add_collection(collection, folder_id, None, &model, false)?;
            let progress = self.progress_entry(folder_id, collection, path).clone();
            self.emit(ProgressEvent::CollectionAdded(progress));
        } else {
            self.progress_entry(folder_id, collection, path);
        }

        self.watcher.add(path);
        self.scan_documents(folder_id, path);
        Ok(())
    }

    /// Ensure the folder exists on disk, is readable, and has a row.
    fn check_and_add_folder(&mut self, path: &Path) -> Result<i64, Error> {
        let meta = std::fs::metadata(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        if !meta.is_dir() || std::fs::read_dir(path).is_err() {
            return Err(Error::Config(format!(
                "{} is not a readable folder",
                path.display()
            )));
        }

        if let Some(folder_id) = self.store()?.folder_id(path)? {
            return Ok(folder_id);
        }
        Ok(self.store()?.add_folder(path)?)
    }

    fn remove_folder(&mut self, collection: &str, path: &Path) -> Result<(), Error> {
        let Some(folder_id) = self.store()?.folder_id(path)? else {
            warn!(path = %path.display(), "folder not tracked");
            self.watcher.remove(path);
            return Ok(());
        };
        self.remove_folder_internal(collection, folder_id, path)
    }

    fn remove_folder_internal(
        &mut self,
        collection: &str,
        folder_id: i64,
        path: &Path,
    ) -> Result<(), Error> {
        let sharing = self.store()?.collections_for_folder(folder_id)?;

        self.store()?.begin()?;
        if let Err(e) = self.store()?.remove_collection(collection, folder_id) {
            let _ = self.store()?.rollback();
            return Err(e.into());
        }

        // Other collections still reference the folder: keep its contents.
        if sharing.len() > 1 {
            self.store()?.commit()?;
            return Ok(());
        }

        self.scheduler.remove_folder(folder_id);
        self.progress.remove(&folder_id);

        let removed = match self.delete_folder_rows(folder_id) {
            Ok(ids) => ids,
            Err(e) => {
                let _ = self.store()?.rollback();
                return Err(e.into());
            }
        };
        self.store()?.commit()?;

        for chunk_id in &removed {
            self.vectors.remove(*chunk_id);
        }
        if !removed.is_empty() {
            self.vectors.save();
        }

        self.emit(ProgressEvent::FolderRemoved(folder_id));
        self.watcher.remove(path);
        Ok(())
    }

    /// Delete all documents, chunks and the folder row itself, returning the
    /// chunk ids whose vectors must go once the transaction commits.
    fn delete_folder_rows(&self, folder_id: i64) -> Result<Vec<i64>, StoreError> {
        let Some(store) = &self.store else {
            return Err(StoreError::Init("database invalid".to_string()));
        };
        let mut chunk_ids = Vec::new();
        for document_id in store.document_ids(folder_id)? {
            chunk_ids.extend(store.chunk_ids_by_document(document_id)?);
            store.remove_chunks_by_document(document_id)?;
            store.remove_document(document_id)?;
        }
        store.remove_folder(folder_id)?;
        Ok(chunk_ids)
    }

    /// Delete one document with its chunks, collecting the chunk ids.
    fn delete_document_rows(
        &self,
        document_id: i64,
        removed: &mut Vec<i64>,
    ) -> Result<(), StoreError> {
        let Some(store) = &self.store else {
            return Err(StoreError::Init("database invalid".to_string()));
        };
        removed.extend(store.chunk_ids_by_document(document_id)?);
        store.remove_chunks_by_document(document_id)?;
        store.remove_document(document_id)
    }

    fn force_indexing(&mut self, collection: &str) -> Result<(), Error> {
        let folders = self.store()?.folders_for_collection(collection)?;
        self.store()?.clear_force_indexing(collection)?;

        for (folder_id, path) in folders {
            if let Some(progress) = self.progress.get_mut(&folder_id) {
                progress.force_indexing = false;
                let snapshot = progress.clone();
                self.emit(ProgressEvent::CollectionUpdated(snapshot));
            }
            self.add_folder(collection, &path)?;
        }
        Ok(())
    }

    fn change_chunk_size(&mut self, chunk_size: usize) -> Result<(), Error> {
        if chunk_size == self.chunker.chunk_size() {
            return Ok(());
        }
        info!(chunk_size, "changing chunk size, full rechunk required");
        self.chunker = WordChunker::new(chunk_size);

        let documents = self.store()?.all_documents()?;

        self.store()?.begin()?;
        let mut removed = Vec::new();
        for (document_id, _path) in documents {
            if let Err(e) = self.delete_document_rows(document_id, &mut removed) {
                let _ = self.store()?.rollback();
                return Err(e.into());
            }
        }
        self.store()?.commit()?;

        for chunk_id in &removed {
            self.vectors.remove(*chunk_id);
        }
        if !removed.is_empty() {
            self.vectors.save();
        }

        self.add_current_folders();
        self.update_statistics();
        Ok(())
    }

    /// Drop folders and documents whose paths no longer exist, then refresh
    /// statistics.
    fn cleanup(&mut self) -> Result<(), Error> {
        let collections = self.store()?.collections()?;
        for spec in collections {
            if !folder_is_readable(&spec.folder_path) {
                debug!(path = %spec.folder_path.display(), "cleanup removing folder");
                if let Err(e) =
                    self.remove_folder_internal(&spec.name, spec.folder_id, &spec.folder_path)
                {
                    warn!("cleanup cannot remove folder: {e}");
                }
            }
        }

        let documents = self.store()?.all_documents()?;

        self.store()?.begin()?;
        let mut removed = Vec::new();
        for (document_id, path) in documents {
            if std::fs::File::open(&path).is_ok() {
                continue;
            }
            debug!(path = %path.display(), "cleanup removing document");
            if let Err(e) = self.delete_document_rows(document_id, &mut removed) {
                let _ = self.store()?.rollback();
                self.update_statistics();
                return Err(e.into());
            }
        }
        self.store()?.commit()?;

        for chunk_id in &removed {
            self.vectors.remove(*chunk_id);
        }
        if !removed.is_empty() {
            self.vectors.save();
        }

        self.update_statistics();
        Ok(())
    }

    /// A watched directory changed: clean the database, then rescan it.
    fn directory_changed(&mut self, path: &Path) {
        let folder_id = match self.store().and_then(|s| s.folder_id(path).map_err(Error::from)) {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(path = %path.display(), "watched folder is not tracked");
                self.watcher.remove(path);
                return;
            }
            Err(e) => {
                warn!("cannot look up changed folder: {e}");
                return;
            }
        };

        if let Err(e) = self.cleanup() {
            warn!("cleanup after change failed: {e}");
        }
        self.scan_documents(folder_id, path);
    }

    // -- Scanning --

    /// Walk a folder recursively and enqueue every supported document.
    fn scan_documents(&mut self, folder_id: i64, path: &Path) {
        let mut infos = Vec::new();
        walk_folder(path, folder_id, &mut infos);
        if infos.is_empty() {
            return;
        }

        for info in infos {
            self.scheduler.enqueue(info);
        }

        let count = self.scheduler.documents_for_folder(folder_id);
        let bytes = self.scheduler.bytes_for_folder(folder_id);
        if let Some(progress) = self.progress.get_mut(&folder_id) {
            progress.indexing = true;
            progress.current_docs_to_index = count;
            progress.total_docs_to_index = count;
            progress.current_bytes_to_index = bytes;
            progress.total_bytes_to_index = bytes;
            let snapshot = progress.clone();
            self.emit(ProgressEvent::CollectionUpdated(snapshot));
        }
    }

    /// One timer tick: dequeue documents inside a single transaction until
    /// the queue or the time budget is exhausted.
    fn scan_tick(&mut self) {
        if !self.valid {
            return;
        }
        let started = Instant::now();
        {
            let Some(store) = &self.store else { return };
            if let Err(e) = store.begin() {
                warn!("cannot begin tick transaction: {e}");
                return;
            }
        }

        let mut chunks_to_remove = Vec::new();
        while self.scheduler.has_work() && started.elapsed() < SCAN_BUDGET {
            if !self.scan_one(&mut chunks_to_remove) {
                if let Some(store) = &self.store {
                    let _ = store.rollback();
                }
                return;
            }
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.commit() {
                warn!("cannot commit tick: {e}");
                let _ = store.rollback();
                return;
            }
        }

        for chunk_id in &chunks_to_remove {
            self.vectors.remove(*chunk_id);
        }
        if !chunks_to_remove.is_empty() {
            self.vectors.save();
        }
    }

    /// Process one dequeued document. Returns false on a store failure, in
    /// which case the whole tick rolls back. I/O problems only drop the
    /// work item.
    fn scan_one(&mut self, chunks_to_remove: &mut Vec<i64>) -> bool {
        let Some(info) = self.scheduler.dequeue() else {
            return true;
        };
        let folder_id = info.folder_id;
        let remaining = self.scheduler.documents_for_folder(folder_id);

        // Re-stat: documents that vanished are dropped without an error row.
        let meta = match std::fs::metadata(&info.path) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %info.path.display(), "dropping vanished document: {e}");
                self.schedule_next(folder_id, remaining);
                return true;
            }
        };
        let document_time = mtime_millis(&meta);

        let existing = match self.store_lookup(|s| s.document_by_path(&info.path)) {
            Ok(found) => found,
            Err(e) => {
                warn!(path = %info.path.display(), "cannot select document: {e}");
                self.schedule_next(folder_id, remaining);
                return false;
            }
        };

        let document_id = match (existing, info.currently_processing) {
            (Some((id, stored_time)), false) => {
                if stored_time == document_time {
                    // unchanged since the last scan
                    self.schedule_next(folder_id, remaining);
                    return true;
                }
                let stale = match self.store_lookup(|s| s.chunk_ids_by_document(id)) {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!("cannot select stale chunks: {e}");
                        self.schedule_next(folder_id, remaining);
                        return false;
                    }
                };
                chunks_to_remove.extend(stale);
                if let Err(e) = self.store_lookup(|s| s.remove_chunks_by_document(id)) {
                    warn!("cannot remove stale chunks: {e}");
                    self.schedule_next(folder_id, remaining);
                    return false;
                }
                self.update_statistics();
                if let Err(e) = self.store_lookup(|s| s.update_document_time(id, document_time)) {
                    warn!("cannot update document time: {e}");
                    self.schedule_next(folder_id, remaining);
                    return false;
                }
                id
            }
            (Some((id, _)), true) => id,
            (None, _) => {
                let id = match self.store_lookup(|s| {
                    s.add_document(folder_id, document_time, &info.path)
                }) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(path = %info.path.display(), "cannot add document: {e}");
                        self.schedule_next(folder_id, remaining);
                        return false;
                    }
                };
                if let Some(progress) = self.progress.get_mut(&folder_id) {
                    progress.total_docs += 1;
                    let snapshot = progress.clone();
                    self.emit(ProgressEvent::CollectionUpdated(snapshot));
                }
                id
            }
        };

        if info.is_pdf() {
            self.scan_pdf_slice(info, document_id, remaining)
        } else {
            self.scan_text_slice(info, document_id, remaining)
        }
    }

    /// Chunk one PDF page, then requeue the document for the next page.
    fn scan_pdf_slice(&mut self, info: DocumentInfo, document_id: i64, remaining: usize) -> bool {
        let folder_id = info.folder_id;
        let reader = match PdfReader::load(&info.path) {
            Ok(r) => r,
            Err(e) => {
                // corrupt PDFs are logged against the document and skipped
                warn!(document_id, path = %info.path.display(), "{e}");
                self.schedule_next(folder_id, remaining);
                return true;
            }
        };

        let page_count = reader.page_count();
        let page = info.current_page;
        let text = match reader.page_text(page) {
            Ok(t) => t,
            Err(e) => {
                warn!(document_id, page, "{e}");
                self.schedule_next(folder_id, remaining);
                return true;
            }
        };

        let meta = reader.metadata();
        let provenance = ChunkProvenance {
            file: file_name(&info.path),
            title: meta.title.clone(),
            author: meta.author.clone(),
            subject: meta.subject.clone(),
            keywords: meta.keywords.clone(),
            page: page as i64,
            line_from: -1,
            line_to: -1,
        };

        let batch = self.chunker.split(&text, 0);
        if !self.insert_chunks(&batch.chunks, folder_id, document_id, &provenance) {
            return false;
        }

        let bytes_per_page = if page_count > 0 {
            info.size / page_count as u64
        } else {
            info.size
        };
        self.consume_bytes(folder_id, bytes_per_page);

        if page < page_count {
            let mut next = info;
            next.current_page = page + 1;
            next.currently_processing = true;
            self.scheduler.requeue(next);
            self.schedule_next(folder_id, remaining + 1);
            return true;
        }

        // last page: charge the rounding remainder
        self.consume_bytes(
            folder_id,
            info.size.saturating_sub(bytes_per_page * page_count as u64),
        );
        self.schedule_next(folder_id, remaining);
        true
    }

    /// Chunk up to [`TEXT_CHUNKS_PER_SLICE`] chunks of a plain-text file,
    /// then requeue the document carrying the advanced byte cursor.
    fn scan_text_slice(&mut self, info: DocumentInfo, document_id: i64, remaining: usize) -> bool {
        let folder_id = info.folder_id;
        let text = match text::read_from(&info.path, info.current_position) {
            Ok(t) => t,
            Err(e) => {
                debug!(document_id, path = %info.path.display(), "dropping document: {e}");
                self.schedule_next(folder_id, remaining);
                return true;
            }
        };

        let provenance = ChunkProvenance::plain(file_name(&info.path));
        let batch = self.chunker.split(&text, TEXT_CHUNKS_PER_SLICE);
        if !self.insert_chunks(&batch.chunks, folder_id, document_id, &provenance) {
            return false;
        }

        self.consume_bytes(folder_id, batch.consumed as u64);

        if batch.consumed < text.len() {
            let mut next = info;
            next.current_position += batch.consumed;
            next.currently_processing = true;
            self.scheduler.requeue(next);
            self.schedule_next(folder_id, remaining + 1);
            return true;
        }

        self.schedule_next(folder_id, remaining);
        true
    }

    /// Insert produced chunks and stage them for embedding. A store failure
    /// here fails the tick.
    fn insert_chunks(
        &mut self,
        chunks: &[TextChunk],
        folder_id: i64,
        document_id: i64,
        provenance: &ChunkProvenance,
    ) -> bool {
        let mut added_words = 0;
        for chunk in chunks {
            let chunk_id = match self.store_lookup(|s| {
                s.add_chunk(document_id, &chunk.text, provenance, chunk.words)
            }) {
                Ok(id) => id,
                Err(e) => {
                    warn!(document_id, "cannot insert chunk: {e}");
                    return false;
                }
            };
            added_words += chunk.words;
            self.append_pending(EmbeddingChunk {
                folder_id,
                chunk_id,
                text: chunk.text.clone(),
            });
        }

        if !chunks.is_empty() {
            if let Some(progress) = self.progress.get_mut(&folder_id) {
                progress.total_embeddings_to_index += chunks.len();
                progress.total_words += added_words;
                progress.file_currently_processing = provenance.file.clone();
                let snapshot = progress.clone();
                self.emit(ProgressEvent::CollectionUpdated(snapshot));
            }
        }
        true
    }

    /// Charge chunked bytes against a folder's byte-progress counter.
    fn consume_bytes(&mut self, folder_id: i64, bytes: u64) {
        if bytes == 0 {
            return;
        }
        if let Some(progress) = self.progress.get_mut(&folder_id) {
            progress.current_bytes_to_index = progress.current_bytes_to_index.saturating_sub(bytes);
            let snapshot = progress.clone();
            self.emit(ProgressEvent::CollectionUpdated(snapshot));
        }
    }

    /// Advance per-folder progress after a dequeue step; a drained folder
    /// flushes the partial embedding batch and flips to installed.
    fn schedule_next(&mut self, folder_id: i64, count_for_folder: usize) {
        if count_for_folder == 0 {
            self.send_pending();
        }
        if let Some(progress) = self.progress.get_mut(&folder_id) {
            progress.current_docs_to_index = count_for_folder;
            if count_for_folder == 0 {
                progress.indexing = false;
                progress.installed = true;
            }
            let snapshot = progress.clone();
            self.emit(ProgressEvent::CollectionUpdated(snapshot));
        }
    }

    // -- Embeddings --

    fn append_pending(&mut self, chunk: EmbeddingChunk) {
        self.pending.push(chunk);
        if self.pending.len() >= EMBEDDING_BATCH_SIZE {
            self.send_pending();
        }
    }

    fn send_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.inflight_batches += 1;
        self.embedder.submit(std::mem::take(&mut self.pending));
    }

    fn handle_embedding_message(&mut self, msg: EmbeddingMessage) {
        self.inflight_batches = self.inflight_batches.saturating_sub(1);
        match msg {
            EmbeddingMessage::Completed(results) => self.handle_embeddings(results),
            EmbeddingMessage::Failed { folder_id, error } => {
                if let Some(progress) = self.progress.get_mut(&folder_id) {
                    progress.error = error;
                    let snapshot = progress.clone();
                    self.emit(ProgressEvent::CollectionUpdated(snapshot));
                }
            }
        }
        self.notify_if_idle();
    }

    /// Write returned vectors to the index and flip per-chunk completion.
    fn handle_embeddings(&mut self, results: Vec<docdex_core::EmbeddingResult>) {
        if results.is_empty() {
            return;
        }

        let mut folder_id = 0;
        for result in &results {
            folder_id = result.folder_id;
            if !self.vectors.add(&result.vector, result.chunk_id) {
                warn!(chunk_id = result.chunk_id, "cannot add vector to index");
                continue;
            }
            if let Err(e) = self.store_lookup(|s| s.set_chunk_embedded(result.chunk_id)) {
                warn!(chunk_id = result.chunk_id, "cannot mark chunk embedded: {e}");
            }
        }

        let file = self
            .store_lookup(|s| s.file_for_chunk(results[0].chunk_id))
            .ok()
            .flatten()
            .unwrap_or_default();

        if let Some(progress) = self.progress.get_mut(&folder_id) {
            progress.current_embeddings_to_index += results.len();
            progress.file_currently_processing = file;
            let snapshot = progress.clone();
            self.emit(ProgressEvent::CollectionUpdated(snapshot));
        }

        self.vectors.save();
    }

    // -- Retrieval --

    /// Two-path query: vector similarity when the index is loaded, trigram
    /// N-gram fallback otherwise. Failures yield empty results.
    async fn retrieve(
        &mut self,
        collections: &[String],
        query: &str,
        limit: usize,
    ) -> Vec<RetrievedChunk> {
        if self.store.is_none() || collections.is_empty() {
            return Vec::new();
        }

        let hits = if self.vectors.is_loaded() {
            let embedding = match self.embedder.embed_text(query).await {
                Ok(v) => v,
                Err(e) => {
                    debug!("query embedding failed: {e}");
                    return Vec::new();
                }
            };
            if embedding.is_empty() {
                debug!("query embedding is empty");
                return Vec::new();
            }
            let ids = self.vectors.search(&embedding, limit);
            if ids.is_empty() {
                return Vec::new();
            }
            self.store_lookup(|s| s.chunks_by_ids(&ids, collections))
        } else {
            self.store_lookup(|s| retriever::search_trigram(s, collections, query, limit))
        };

        match hits {
            Ok(hits) => hits.into_iter().map(retriever::to_retrieved).collect(),
            Err(e) => {
                debug!("retrieval query failed: {e}");
                Vec::new()
            }
        }
    }

    // -- Bookkeeping --

    fn update_statistics(&mut self) {
        let collections = match self.store().and_then(|s| s.collections().map_err(Error::from)) {
            Ok(c) => c,
            Err(e) => {
                warn!("cannot select collections for statistics: {e}");
                return;
            }
        };
        for spec in collections {
            match self.store_lookup(|s| s.count_statistics(spec.folder_id)) {
                Ok(stats) => {
                    if let Some(progress) = self.progress.get_mut(&spec.folder_id) {
                        progress.total_docs = stats.total_docs;
                        progress.total_words = stats.total_words;
                        progress.total_tokens = stats.total_tokens;
                        let snapshot = progress.clone();
                        self.emit(ProgressEvent::CollectionUpdated(snapshot));
                    }
                }
                Err(e) => warn!("cannot count statistics: {e}"),
            }
        }
    }

    fn progress_entry(
        &mut self,
        folder_id: i64,
        collection: &str,
        path: &Path,
    ) -> &mut CollectionProgress {
        self.progress.entry(folder_id).or_insert_with(|| CollectionProgress {
            collection: collection.to_string(),
            folder_id,
            folder_path: path.to_path_buf(),
            ..Default::default()
        })
    }

    fn is_idle(&self) -> bool {
        !self.scheduler.has_work() && self.pending.is_empty() && self.inflight_batches == 0
    }

    fn notify_if_idle(&mut self) {
        if self.is_idle() {
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.updates.send(event);
    }

    fn store(&self) -> Result<&MetadataStore, Error> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::Store(StoreError::Init("database invalid".to_string())))
    }

    fn store_lookup<T>(
        &self,
        op: impl FnOnce(&MetadataStore) -> Result<T, StoreError>,
    ) -> Result<T, Error> {
        let store = self.store()?;
        op(store).map_err(Error::from)
    }
}

/// Recursive walk collecting supported documents in sorted order.
fn walk_folder(dir: &Path, folder_id: i64, infos: &mut Vec<DocumentInfo>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), "cannot read folder: {e}");
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            walk_folder(&path, folder_id, infos);
        } else if kind_for_path(&path).is_some() {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            infos.push(DocumentInfo::new(folder_id, path, size));
        }
    }
}

fn folder_is_readable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
        && std::fs::read_dir(path).is_ok()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
