//! The SQLite-backed metadata store.

use docdex_core::{
    ChunkProvenance, CollectionSpec, EmbeddingChunk, FolderStatistics, StoreError,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::schema::{db_file_name, DB_MIN_VERSION, DB_VERSION, SCHEMA_SQL};

/// A collection carried over from an older database version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCollection {
    pub name: String,
    pub folder_path: PathBuf,
}

/// One retrieval row, shared by the vector and trigram query paths.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk_id: i64,
    /// Document mtime, epoch milliseconds.
    pub document_time: i64,
    pub text: String,
    pub file: String,
    pub title: String,
    pub author: String,
    pub page: i64,
    pub line_from: i64,
    pub line_to: i64,
}

/// Result of opening the store: the handle plus any collections read out of
/// an older database that must be re-inserted with `force_indexing` set.
pub struct OpenOutcome {
    pub store: MetadataStore,
    pub carried: Vec<LegacyCollection>,
}

/// Durable relational store of folders, documents, chunks and collections,
/// with a trigram FTS5 mirror over chunks.
///
/// Mutating operations run inside an explicit transaction managed by the
/// caller via [`begin`]/[`commit`]/[`rollback`]; outside of one they
/// autocommit.
///
/// [`begin`]: MetadataStore::begin
/// [`commit`]: MetadataStore::commit
/// [`rollback`]: MetadataStore::rollback
pub struct MetadataStore {
    conn: Connection,
    db_path: PathBuf,
}

impl MetadataStore {
    /// Open the newest database under `model_path`, upgrading if needed.
    ///
    /// Probes `localdocs_v<N>.db` descending from the current version to the
    /// minimum supported one; the first file that exists and contains a
    /// `chunks` table wins. An older version is opened just long enough to
    /// read its collections, then a fresh current-version database is
    /// created and the collections are handed back in
    /// [`OpenOutcome::carried`]. Chunk and document rows are never migrated.
    pub fn open(model_path: &Path) -> Result<OpenOutcome, StoreError> {
        for version in (DB_MIN_VERSION..=DB_VERSION).rev() {
            let db_path = model_path.join(db_file_name(version));
            if !db_path.exists() {
                continue;
            }
            let conn = Connection::open(&db_path).map_err(open_err)?;
            if !has_chunks_table(&conn)? {
                continue;
            }

            if version == DB_VERSION {
                let store = Self::init(conn, db_path)?;
                return Ok(OpenOutcome {
                    store,
                    carried: Vec::new(),
                });
            }

            info!(
                from = version,
                to = DB_VERSION,
                "older database found, carrying collections into a fresh one"
            );
            let carried = select_legacy_collections(&conn, version)?;
            drop(conn);
            let store = Self::create(model_path)?;
            return Ok(OpenOutcome { store, carried });
        }

        let store = Self::create(model_path)?;
        Ok(OpenOutcome {
            store,
            carried: Vec::new(),
        })
    }

    /// The path of the open database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn create(model_path: &Path) -> Result<Self, StoreError> {
        let db_path = model_path.join(db_file_name(DB_VERSION));
        let conn = Connection::open(&db_path).map_err(open_err)?;
        Self::init(conn, db_path)
    }

    fn init(conn: Connection, db_path: PathBuf) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(open_err)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::Init(e.to_string()))?;
        debug!(path = %db_path.display(), "metadata store ready");
        Ok(Self { conn, db_path })
    }

    // -- Transactions --

    pub fn begin(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    pub fn commit(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    pub fn rollback(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    // -- Folders --

    pub fn add_folder(&self, path: &Path) -> Result<i64, StoreError> {
        self.conn
            .execute(
                "INSERT INTO folders(folder_path) VALUES (?1)",
                params![path_str(path)],
            )
            .map_err(exec_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn remove_folder(&self, folder_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM folders WHERE id = ?1", params![folder_id])
            .map_err(exec_err)?;
        Ok(())
    }

    pub fn folder_id(&self, path: &Path) -> Result<Option<i64>, StoreError> {
        self.conn
            .query_row(
                "SELECT id FROM folders WHERE folder_path = ?1",
                params![path_str(path)],
                |row| row.get(0),
            )
            .optional()
            .map_err(exec_err)
    }

    pub fn folder_path(&self, folder_id: i64) -> Result<Option<PathBuf>, StoreError> {
        let path: Option<String> = self
            .conn
            .query_row(
                "SELECT folder_path FROM folders WHERE id = ?1",
                params![folder_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(exec_err)?;
        Ok(path.map(PathBuf::from))
    }

    // -- Documents --

    pub fn add_document(
        &self,
        folder_id: i64,
        document_time: i64,
        path: &Path,
    ) -> Result<i64, StoreError> {
        self.conn
            .execute(
                "INSERT INTO documents(folder_id, document_time, document_path) \
                 VALUES (?1, ?2, ?3)",
                params![folder_id, document_time, path_str(path)],
            )
            .map_err(exec_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_document_time(&self, id: i64, document_time: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE documents SET document_time = ?1 WHERE id = ?2",
                params![document_time, id],
            )
            .map_err(exec_err)?;
        Ok(())
    }

    pub fn remove_document(&self, id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(exec_err)?;
        Ok(())
    }

    /// Look up a document by path, returning `(id, document_time)`.
    pub fn document_by_path(&self, path: &Path) -> Result<Option<(i64, i64)>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, document_time FROM documents WHERE document_path = ?1",
                params![path_str(path)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(exec_err)
    }

    pub fn document_ids(&self, folder_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM documents WHERE folder_id = ?1")
            .map_err(prepare_err)?;
        let rows = stmt
            .query_map(params![folder_id], |row| row.get(0))
            .map_err(exec_err)?;
        rows.collect::<Result<_, _>>().map_err(exec_err)
    }

    pub fn all_documents(&self) -> Result<Vec<(i64, PathBuf)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, document_path FROM documents")
            .map_err(prepare_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(exec_err)?;
        let mut docs = Vec::new();
        for row in rows {
            let (id, path) = row.map_err(exec_err)?;
            docs.push((id, PathBuf::from(path)));
        }
        Ok(docs)
    }

    // -- Chunks --

    /// Insert one chunk and its FTS mirror row; returns the new chunk id.
    pub fn add_chunk(
        &self,
        document_id: i64,
        text: &str,
        provenance: &ChunkProvenance,
        words: usize,
    ) -> Result<i64, StoreError> {
        self.conn
            .execute(
                "INSERT INTO chunks(document_id, chunk_text, file, title, author, \
                 subject, keywords, page, line_from, line_to, words) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    document_id,
                    text,
                    provenance.file,
                    provenance.title,
                    provenance.author,
                    provenance.subject,
                    provenance.keywords,
                    provenance.page,
                    provenance.line_from,
                    provenance.line_to,
                    words as i64,
                ],
            )
            .map_err(exec_err)?;
        let chunk_id = self.conn.last_insert_rowid();

        self.conn
            .execute(
                "INSERT INTO chunks_fts(document_id, chunk_id, chunk_text, file, title, \
                 author, subject, keywords, page, line_from, line_to) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    document_id,
                    chunk_id,
                    text,
                    provenance.file,
                    provenance.title,
                    provenance.author,
                    provenance.subject,
                    provenance.keywords,
                    provenance.page,
                    provenance.line_from,
                    provenance.line_to,
                ],
            )
            .map_err(exec_err)?;

        Ok(chunk_id)
    }

    pub fn chunk_ids_by_document(&self, document_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT chunk_id FROM chunks WHERE document_id = ?1")
            .map_err(prepare_err)?;
        let rows = stmt
            .query_map(params![document_id], |row| row.get(0))
            .map_err(exec_err)?;
        rows.collect::<Result<_, _>>().map_err(exec_err)
    }

    /// Delete all chunks of a document from both tables.
    pub fn remove_chunks_by_document(&self, document_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![document_id],
            )
            .map_err(exec_err)?;
        self.conn
            .execute(
                "DELETE FROM chunks_fts WHERE document_id = ?1",
                params![document_id],
            )
            .map_err(exec_err)?;
        Ok(())
    }

    /// Chunks of a folder that have no embedding yet.
    pub fn uncompleted_chunks(&self, folder_id: i64) -> Result<Vec<EmbeddingChunk>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.chunk_id, c.chunk_text, d.folder_id \
                 FROM chunks c \
                 JOIN documents d ON c.document_id = d.id \
                 WHERE c.has_embedding != 1 AND d.folder_id = ?1",
            )
            .map_err(prepare_err)?;
        let rows = stmt
            .query_map(params![folder_id], |row| {
                Ok(EmbeddingChunk {
                    chunk_id: row.get(0)?,
                    text: row.get(1)?,
                    folder_id: row.get(2)?,
                })
            })
            .map_err(exec_err)?;
        rows.collect::<Result<_, _>>().map_err(exec_err)
    }

    pub fn count_chunks(&self, folder_id: i64) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT count(c.chunk_id) FROM chunks c \
                 JOIN documents d ON c.document_id = d.id \
                 WHERE d.folder_id = ?1",
                params![folder_id],
                |row| row.get(0),
            )
            .map_err(exec_err)?;
        Ok(count as usize)
    }

    pub fn set_chunk_embedded(&self, chunk_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE chunks SET has_embedding = 1 WHERE chunk_id = ?1",
                params![chunk_id],
            )
            .map_err(exec_err)?;
        Ok(())
    }

    pub fn file_for_chunk(&self, chunk_id: i64) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT file FROM chunks WHERE chunk_id = ?1",
                params![chunk_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(exec_err)
    }

    // -- Collections --

    pub fn add_collection(
        &self,
        name: &str,
        folder_id: i64,
        last_update_time: Option<i64>,
        embedding_model: &str,
        force_indexing: bool,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO collections(collection_name, folder_id, last_update_time, \
                 embedding_model, force_indexing) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, folder_id, last_update_time, embedding_model, force_indexing],
            )
            .map_err(exec_err)?;
        Ok(())
    }

    pub fn remove_collection(&self, name: &str, folder_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM collections WHERE collection_name = ?1 AND folder_id = ?2",
                params![name, folder_id],
            )
            .map_err(exec_err)?;
        Ok(())
    }

    /// All collections joined to their folders, current schema version.
    pub fn collections(&self) -> Result<Vec<CollectionSpec>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.collection_name, f.folder_path, f.id, c.last_update_time, \
                 c.embedding_model, c.force_indexing \
                 FROM collections c \
                 JOIN folders f ON c.folder_id = f.id \
                 ORDER BY c.collection_name ASC, f.folder_path ASC",
            )
            .map_err(prepare_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CollectionSpec {
                    name: row.get(0)?,
                    folder_path: PathBuf::from(row.get::<_, String>(1)?),
                    folder_id: row.get(2)?,
                    last_update_time: row.get(3)?,
                    embedding_model: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    force_indexing: row.get::<_, Option<bool>>(5)?.unwrap_or(false),
                })
            })
            .map_err(exec_err)?;
        rows.collect::<Result<_, _>>().map_err(exec_err)
    }

    pub fn folders_for_collection(&self, name: &str) -> Result<Vec<(i64, PathBuf)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT f.id, f.folder_path FROM collections c \
                 JOIN folders f ON c.folder_id = f.id \
                 WHERE c.collection_name = ?1",
            )
            .map_err(prepare_err)?;
        let rows = stmt
            .query_map(params![name], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(exec_err)?;
        let mut folders = Vec::new();
        for row in rows {
            let (id, path) = row.map_err(exec_err)?;
            folders.push((id, PathBuf::from(path)));
        }
        Ok(folders)
    }

    pub fn collections_for_folder(&self, folder_id: i64) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT collection_name FROM collections WHERE folder_id = ?1")
            .map_err(prepare_err)?;
        let rows = stmt
            .query_map(params![folder_id], |row| row.get(0))
            .map_err(exec_err)?;
        rows.collect::<Result<_, _>>().map_err(exec_err)
    }

    pub fn clear_force_indexing(&self, name: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE collections SET force_indexing = 0 WHERE collection_name = ?1",
                params![name],
            )
            .map_err(exec_err)?;
        Ok(())
    }

    // -- Statistics --

    /// Distinct documents plus word/token sums for one folder. Folders with
    /// no chunks report zero sums rather than NULL.
    pub fn count_statistics(&self, folder_id: i64) -> Result<FolderStatistics, StoreError> {
        self.conn
            .query_row(
                "SELECT count(DISTINCT d.id), coalesce(sum(c.words), 0), \
                 coalesce(sum(c.tokens), 0) \
                 FROM documents d \
                 LEFT JOIN chunks c ON d.id = c.document_id \
                 WHERE d.folder_id = ?1",
                params![folder_id],
                |row| {
                    Ok(FolderStatistics {
                        total_docs: row.get::<_, i64>(0)? as usize,
                        total_words: row.get::<_, i64>(1)? as usize,
                        total_tokens: row.get::<_, i64>(2)? as usize,
                    })
                },
            )
            .map_err(exec_err)
    }

    // -- Retrieval --

    /// Vector path: fetch chunk rows by id, restricted to collections.
    pub fn chunks_by_ids(
        &self,
        chunk_ids: &[i64],
        collections: &[String],
    ) -> Result<Vec<ChunkHit>, StoreError> {
        if chunk_ids.is_empty() || collections.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT chunks.chunk_id, documents.document_time, chunks.chunk_text, \
             chunks.file, chunks.title, chunks.author, chunks.page, \
             chunks.line_from, chunks.line_to \
             FROM chunks \
             JOIN documents ON chunks.document_id = documents.id \
             JOIN folders ON documents.folder_id = folders.id \
             JOIN collections ON folders.id = collections.folder_id \
             WHERE chunks.chunk_id IN ({}) AND collections.collection_name IN ({})",
            placeholders(chunk_ids.len()),
            placeholders(collections.len()),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(prepare_err)?;
        let bindings: Vec<Value> = chunk_ids
            .iter()
            .map(|id| Value::from(*id))
            .chain(collections.iter().map(|name| Value::from(name.clone())))
            .collect();
        let rows = stmt
            .query_map(params_from_iter(bindings), chunk_hit_from_row)
            .map_err(exec_err)?;
        rows.collect::<Result<_, _>>().map_err(exec_err)
    }

    /// Trigram path: run an FTS5 match, best bm25 first, capped at `limit`.
    pub fn search_fts(
        &self,
        match_expr: &str,
        collections: &[String],
        limit: usize,
    ) -> Result<Vec<ChunkHit>, StoreError> {
        if collections.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT chunks_fts.chunk_id, documents.document_time, chunks_fts.chunk_text, \
             chunks_fts.file, chunks_fts.title, chunks_fts.author, chunks_fts.page, \
             chunks_fts.line_from, chunks_fts.line_to \
             FROM chunks_fts \
             JOIN documents ON chunks_fts.document_id = documents.id \
             JOIN folders ON documents.folder_id = folders.id \
             JOIN collections ON folders.id = collections.folder_id \
             WHERE chunks_fts MATCH ?1 AND collections.collection_name IN ({}) \
             ORDER BY bm25(chunks_fts) \
             LIMIT {limit}",
            placeholders_at(collections.len(), 2),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(prepare_err)?;
        let bindings: Vec<Value> = std::iter::once(Value::from(match_expr.to_string()))
            .chain(collections.iter().map(|name| Value::from(name.clone())))
            .collect();
        let rows = stmt
            .query_map(params_from_iter(bindings), chunk_hit_from_row)
            .map_err(exec_err)?;
        rows.collect::<Result<_, _>>().map_err(exec_err)
    }
}

fn chunk_hit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkHit> {
    Ok(ChunkHit {
        chunk_id: row.get(0)?,
        document_time: row.get(1)?,
        text: row.get(2)?,
        file: row.get(3)?,
        title: row.get(4)?,
        author: row.get(5)?,
        page: row.get(6)?,
        line_from: row.get(7)?,
        line_to: row.get(8)?,
    })
}

/// `?1, ?2, ...` for dynamic IN lists, starting at parameter 1.
fn placeholders(count: usize) -> String {
    placeholders_at(count, 1)
}

fn placeholders_at(count: usize, first: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", first + i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn has_chunks_table(conn: &Connection) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'chunks'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(exec_err)?;
    Ok(found.is_some())
}

/// Read the collection set out of an older database with a version-specific
/// select; v1 lacks `last_update_time`, `embedding_model`, `force_indexing`.
fn select_legacy_collections(
    conn: &Connection,
    version: i32,
) -> Result<Vec<LegacyCollection>, StoreError> {
    let sql = match version {
        1 => {
            "SELECT c.collection_name, f.folder_path \
             FROM collections c \
             JOIN folders f ON c.folder_id = f.id \
             ORDER BY c.collection_name ASC, f.folder_path ASC"
        }
        _ => {
            warn!(version, "no legacy select for version");
            return Ok(Vec::new());
        }
    };
    let mut stmt = conn.prepare(sql).map_err(prepare_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LegacyCollection {
                name: row.get(0)?,
                folder_path: PathBuf::from(row.get::<_, String>(1)?),
            })
        })
        .map_err(exec_err)?;
    rows.collect::<Result<_, _>>().map_err(exec_err)
}

fn open_err(err: rusqlite::Error) -> StoreError {
    StoreError::Init(err.to_string())
}

fn prepare_err(err: rusqlite::Error) -> StoreError {
    StoreError::Prepare(err.to_string())
}

fn exec_err(err: rusqlite::Error) -> StoreError {
    StoreError::Exec(err.to_string())
}
