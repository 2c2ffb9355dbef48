//! Schema and versioning for the metadata database.
//!
//! The database lives in a file named `localdocs_v<N>.db`. On open, the
//! store probes for existing files descending from [`DB_VERSION`] to
//! [`DB_MIN_VERSION`]; an older database contributes only its collection
//! set, which the coordinator re-inserts into a fresh current-version
//! database with `force_indexing` set.

/// Current database schema version.
pub const DB_VERSION: i32 = 2;

/// Oldest schema version the upgrade path understands.
pub const DB_MIN_VERSION: i32 = 1;

/// File name of the database at a given schema version.
pub fn db_file_name(version: i32) -> String {
    format!("localdocs_v{version}.db")
}

/// Idempotent schema for the current version.
///
/// `chunks_fts` is an independent trigram-tokenized FTS5 mirror of the
/// indexable chunk columns; it is maintained explicitly on every chunk
/// insert and delete rather than through triggers, so the two tables move
/// together inside the caller's transaction.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chunks(
    document_id INTEGER,
    chunk_id INTEGER PRIMARY KEY AUTOINCREMENT,
    chunk_text TEXT,
    file TEXT,
    title TEXT,
    author TEXT,
    subject TEXT,
    keywords TEXT,
    page INTEGER,
    line_from INTEGER,
    line_to INTEGER,
    words INTEGER DEFAULT 0,
    tokens INTEGER DEFAULT 0,
    has_embedding INTEGER DEFAULT 0
);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    document_id UNINDEXED,
    chunk_id UNINDEXED,
    chunk_text,
    file,
    title,
    author,
    subject,
    keywords,
    page,
    line_from,
    line_to,
    tokenize = "trigram"
);

CREATE TABLE IF NOT EXISTS collections(
    collection_name TEXT,
    folder_id INTEGER,
    last_update_time INTEGER,
    embedding_model TEXT,
    force_indexing INTEGER,
    UNIQUE(collection_name, folder_id)
);

CREATE TABLE IF NOT EXISTS folders(
    id INTEGER PRIMARY KEY,
    folder_path TEXT UNIQUE
);

CREATE TABLE IF NOT EXISTS documents(
    id INTEGER PRIMARY KEY,
    folder_id INTEGER,
    document_time INTEGER,
    document_path TEXT UNIQUE
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_carry_version() {
        assert_eq!(db_file_name(2), "localdocs_v2.db");
        assert_eq!(db_file_name(1), "localdocs_v1.db");
    }

    #[test]
    fn version_range_is_sane() {
        assert!(DB_MIN_VERSION <= DB_VERSION);
    }
}
