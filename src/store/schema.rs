//! `SQLite` schema for the concrete `ChunkStore`/`VectorIndex`/`LexicalIndex`/
//! `DefinitionsStore` implementation.
//!
//! Mirrors the reference corpus's chunk-plus-FTS5 layout: chunks live in a
//! normal table, a `chunks_fts` virtual table provides BM25 lexical search
//! via triggers that keep it synchronized, and embeddings are stored as
//! little-endian `f32` byte blobs for brute-force cosine scans.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for initial database setup.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Chunks: read-only corpus produced by ingestion (out of scope for this crate).
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    document_path TEXT NOT NULL,
    section TEXT,
    page_start INTEGER NOT NULL,
    page_end INTEGER NOT NULL,
    text TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    is_definitions INTEGER NOT NULL DEFAULT 0,
    relative_path TEXT,
    word_count INTEGER,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(source, document_path);

-- Dense embeddings, one row per chunk.
CREATE TABLE IF NOT EXISTS chunk_embeddings (
    chunk_id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id) ON DELETE CASCADE
);

-- FTS5 virtual table for BM25 lexical search.
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    text,
    content='chunks',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES('delete', old.rowid, old.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES('delete', old.rowid, old.text);
    INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
END;

-- Definitions: precomputed per-source term -> definition map.
CREATE TABLE IF NOT EXISTS definitions (
    source TEXT NOT NULL,
    term TEXT NOT NULL,
    text TEXT NOT NULL,
    source_chunk_id TEXT NOT NULL,
    PRIMARY KEY (source, term)
);
";

/// SQL to check if the schema has been initialized.
pub const CHECK_SCHEMA_SQL: &str = r"
SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_info';
";

/// SQL to read the stored schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to persist the schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_sql_creates_expected_objects() {
        assert!(SCHEMA_SQL.contains("CREATE TABLE"));
        assert!(SCHEMA_SQL.contains("chunks_fts"));
        assert!(SCHEMA_SQL.contains("tokenize='porter unicode61'"));
        assert!(SCHEMA_SQL.contains("definitions"));
    }

    #[test]
    fn schema_version_is_positive() {
        const _: () = assert!(CURRENT_SCHEMA_VERSION >= 1);
    }
}
