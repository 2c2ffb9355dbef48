//! SQLite metadata store for docdex.
//!
//! This crate owns the durable relational state of the engine: folders,
//! documents, chunks and collections, plus a trigram-tokenized FTS5 mirror
//! of the chunk table for substring full-text search.
//!
//! # Components
//!
//! - [`MetadataStore`]: the connection handle with typed operations
//! - [`OpenOutcome`]: open result carrying collections from older versions
//! - [`schema`]: schema SQL and the version probe constants
//!
//! Transactions are explicit and caller-managed: the indexing worker opens
//! one per scheduler tick (and per structural operation) and either commits
//! all of its metadata changes or rolls the whole tick back.

pub mod schema;
mod store;

pub use schema::{db_file_name, DB_MIN_VERSION, DB_VERSION};
pub use store::{ChunkHit, LegacyCollection, MetadataStore, OpenOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use docdex_core::ChunkProvenance;
    use rusqlite::Connection;
    use std::path::Path;

    fn open_store(dir: &Path) -> MetadataStore {
        let outcome = MetadataStore::open(dir).unwrap();
        assert!(outcome.carried.is_empty());
        outcome.store
    }

    /// Wire up folder → collection → document so chunks can be inserted.
    fn seed(store: &MetadataStore, collection: &str, folder: &str) -> (i64, i64) {
        let folder_id = store.add_folder(Path::new(folder)).unwrap();
        store
            .add_collection(collection, folder_id, None, "test-model", false)
            .unwrap();
        let doc_id = store
            .add_document(folder_id, 1_700_000_000_000, Path::new("/corpus/a.txt"))
            .unwrap();
        (folder_id, doc_id)
    }

    fn fts_rows(store: &MetadataStore) -> i64 {
        let conn = Connection::open(store.db_path()).unwrap();
        conn.query_row("SELECT count(*) FROM chunks_fts", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn open_creates_current_version_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(store.db_path().ends_with(db_file_name(DB_VERSION)));
        assert!(store.db_path().exists());
    }

    #[test]
    fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path());
            store.add_folder(Path::new("/corpus")).unwrap();
        }
        let store = open_store(dir.path());
        assert!(store.folder_id(Path::new("/corpus")).unwrap().is_some());
    }

    #[test]
    fn chunk_round_trip_preserves_text_and_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let (_folder_id, doc_id) = seed(&store, "notes", "/corpus");

        let prov = ChunkProvenance {
            file: "a.txt".into(),
            title: "Title".into(),
            author: "Someone".into(),
            subject: "S".into(),
            keywords: "k1 k2".into(),
            page: 4,
            line_from: -1,
            line_to: -1,
        };
        let chunk_id = store.add_chunk(doc_id, "hello chunk text", &prov, 3).unwrap();

        let hits = store
            .chunks_by_ids(&[chunk_id], &["notes".to_string()])
            .unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.text, "hello chunk text");
        assert_eq!(hit.file, "a.txt");
        assert_eq!(hit.title, "Title");
        assert_eq!(hit.author, "Someone");
        assert_eq!(hit.page, 4);
        assert_eq!(hit.line_from, -1);
        assert_eq!(hit.document_time, 1_700_000_000_000);
    }

    #[test]
    fn fts_mirror_tracks_chunk_inserts_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let (_folder_id, doc_id) = seed(&store, "notes", "/corpus");

        store
            .add_chunk(doc_id, "one", &ChunkProvenance::plain("a.txt"), 1)
            .unwrap();
        store
            .add_chunk(doc_id, "two", &ChunkProvenance::plain("a.txt"), 1)
            .unwrap();
        assert_eq!(store.chunk_ids_by_document(doc_id).unwrap().len(), 2);
        assert_eq!(fts_rows(&store), 2);

        store.remove_chunks_by_document(doc_id).unwrap();
        assert!(store.chunk_ids_by_document(doc_id).unwrap().is_empty());
        assert_eq!(fts_rows(&store), 0);
    }

    #[test]
    fn fts_match_finds_substring_via_trigrams() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let (_folder_id, doc_id) = seed(&store, "notes", "/corpus");

        store
            .add_chunk(
                doc_id,
                "the quick brown fox jumps",
                &ChunkProvenance::plain("a.txt"),
                5,
            )
            .unwrap();

        // proximity is measured in trigram tokens, one per character
        let hits = store
            .search_fts(
                "NEAR(\"quick\" \"brown\" \"fox\", 15)",
                &["notes".to_string()],
                5,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "the quick brown fox jumps");

        // trigram tokenization also matches plain substrings
        let hits = store
            .search_fts("\"uick brow\"", &["notes".to_string()], 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn retrieval_is_restricted_to_requested_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let (_folder_id, doc_id) = seed(&store, "notes", "/corpus");

        let chunk_id = store
            .add_chunk(doc_id, "restricted text", &ChunkProvenance::plain("a.txt"), 2)
            .unwrap();

        let hits = store
            .chunks_by_ids(&[chunk_id], &["other".to_string()])
            .unwrap();
        assert!(hits.is_empty());
        let hits = store
            .search_fts("\"restricted\"", &["other".to_string()], 5)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn uncompleted_chunks_and_embedding_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let (folder_id, doc_id) = seed(&store, "notes", "/corpus");

        let a = store
            .add_chunk(doc_id, "alpha", &ChunkProvenance::plain("a.txt"), 1)
            .unwrap();
        let b = store
            .add_chunk(doc_id, "beta", &ChunkProvenance::plain("a.txt"), 1)
            .unwrap();

        let pending = store.uncompleted_chunks(folder_id).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|c| c.folder_id == folder_id));

        store.set_chunk_embedded(a).unwrap();
        let pending = store.uncompleted_chunks(folder_id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].chunk_id, b);

        assert_eq!(store.count_chunks(folder_id).unwrap(), 2);
        assert_eq!(store.file_for_chunk(a).unwrap().unwrap(), "a.txt");
    }

    #[test]
    fn statistics_coalesce_to_zero_for_chunkless_folders() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let (folder_id, doc_id) = seed(&store, "notes", "/corpus");

        let stats = store.count_statistics(folder_id).unwrap();
        assert_eq!(stats.total_docs, 1);
        assert_eq!(stats.total_words, 0);
        assert_eq!(stats.total_tokens, 0);

        store
            .add_chunk(doc_id, "a b c", &ChunkProvenance::plain("a.txt"), 3)
            .unwrap();
        store
            .add_chunk(doc_id, "d e", &ChunkProvenance::plain("a.txt"), 2)
            .unwrap();
        let stats = store.count_statistics(folder_id).unwrap();
        assert_eq!(stats.total_docs, 1);
        assert_eq!(stats.total_words, 5);
        // tokens are stored but never written; they stay zero
        assert_eq!(stats.total_tokens, 0);
    }

    #[test]
    fn rollback_discards_tick_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let (folder_id, doc_id) = seed(&store, "notes", "/corpus");

        store.begin().unwrap();
        store
            .add_chunk(doc_id, "doomed", &ChunkProvenance::plain("a.txt"), 1)
            .unwrap();
        store.rollback().unwrap();

        assert_eq!(store.count_chunks(folder_id).unwrap(), 0);
        assert_eq!(fts_rows(&store), 0);
    }

    #[test]
    fn collections_listing_and_force_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let folder_id = store.add_folder(Path::new("/corpus")).unwrap();
        store
            .add_collection("notes", folder_id, None, "model-a", true)
            .unwrap();
        store
            .add_collection("work", folder_id, Some(5), "model-a", false)
            .unwrap();

        let all = store.collections().unwrap();
        assert_eq!(all.len(), 2);
        let notes = all.iter().find(|c| c.name == "notes").unwrap();
        assert!(notes.force_indexing);
        assert!(notes.last_update_time.is_none());

        store.clear_force_indexing("notes").unwrap();
        let all = store.collections().unwrap();
        assert!(!all.iter().find(|c| c.name == "notes").unwrap().force_indexing);

        assert_eq!(
            store.collections_for_folder(folder_id).unwrap().len(),
            2
        );
        assert_eq!(store.folders_for_collection("work").unwrap().len(), 1);
    }

    #[test]
    fn opening_v1_database_carries_collections_forward() {
        let dir = tempfile::tempdir().unwrap();

        // hand-build a v1 database: no last_update_time/embedding_model/
        // force_indexing columns on collections
        let v1_path = dir.path().join(db_file_name(1));
        {
            let conn = Connection::open(&v1_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE chunks(document_id INTEGER, chunk_id INTEGER PRIMARY KEY, \
                 chunk_text TEXT);
                 CREATE TABLE folders(id INTEGER PRIMARY KEY, folder_path TEXT UNIQUE);
                 CREATE TABLE collections(collection_name TEXT, folder_id INTEGER);",
            )
            .unwrap();
            conn.execute("INSERT INTO folders(folder_path) VALUES ('/old/a')", [])
                .unwrap();
            conn.execute("INSERT INTO folders(folder_path) VALUES ('/old/b')", [])
                .unwrap();
            conn.execute(
                "INSERT INTO collections(collection_name, folder_id) VALUES ('legacy', 1)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO collections(collection_name, folder_id) VALUES ('research', 2)",
                [],
            )
            .unwrap();
        }

        let outcome = MetadataStore::open(dir.path()).unwrap();
        assert_eq!(outcome.carried.len(), 2);
        assert!(outcome
            .carried
            .iter()
            .any(|c| c.name == "legacy" && c.folder_path == Path::new("/old/a")));

        // the fresh database starts empty: no documents were migrated
        assert!(outcome.store.db_path().ends_with(db_file_name(DB_VERSION)));
        assert!(outcome.store.collections().unwrap().is_empty());
        assert!(outcome.store.all_documents().unwrap().is_empty());
    }

    #[test]
    fn current_version_database_wins_over_older_one() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path());
            store.add_folder(Path::new("/current")).unwrap();
        }
        // a stale v1 file sitting next to it must be ignored
        let conn = Connection::open(dir.path().join(db_file_name(1))).unwrap();
        conn.execute_batch("CREATE TABLE chunks(chunk_id INTEGER PRIMARY KEY);")
            .unwrap();
        drop(conn);

        let outcome = MetadataStore::open(dir.path()).unwrap();
        assert!(outcome.carried.is_empty());
        assert!(outcome
            .store
            .folder_id(Path::new("/current"))
            .unwrap()
            .is_some());
    }
}
