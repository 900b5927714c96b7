//! `SQLite`-backed implementation of `ChunkStore`, `VectorIndex`,
//! `LexicalIndex`, and `DefinitionsStore`.
//!
//! Chunk and index reads are sub-millisecond and never the pipeline's
//! dominant latency source (the LLM calls are), so a single connection
//! behind a mutex is adequate for concurrent request handling -- a
//! deliberate, documented departure from the reference corpus's
//! single-threaded-CLI `unsafe impl Send`/`Sync` shortcut, which does not
//! hold once multiple HTTP requests can be in flight at once.

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result, StorageError};
use crate::model::Chunk;
use crate::store::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use crate::store::traits::{ChunkStore, DefinitionsStore, IndexHit, LexicalIndex, VectorIndex};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// A pre-chunked, already-embedded record as produced by the (out-of-scope)
/// ingestion pipeline, consumed by `licentia ingest`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IngestRecord {
    /// See [`Chunk`].
    pub chunk_id: String,
    /// See [`Chunk`].
    pub source: String,
    /// See [`Chunk`].
    pub document_path: String,
    /// See [`Chunk`].
    pub section: Option<String>,
    /// See [`Chunk`].
    pub page_start: u32,
    /// See [`Chunk`].
    pub page_end: u32,
    /// See [`Chunk`].
    pub text: String,
    /// See [`Chunk`].
    pub token_count: u32,
    /// See [`Chunk`].
    #[serde(default)]
    pub is_definitions: bool,
    /// See [`Chunk`].
    pub relative_path: Option<String>,
    /// See [`Chunk`].
    pub word_count: Option<u32>,
    /// Precomputed embedding vector, in the same space the `VectorIndex` will
    /// be queried in.
    pub embedding: Vec<f32>,
}

/// A definitions-map entry as loaded from an ingest manifest.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IngestDefinition {
    /// Source tag this definition belongs to.
    pub source: String,
    /// Defined term (will be lowercased on store).
    pub term: String,
    /// Verbatim definition text.
    pub text: String,
    /// Chunk the definition was drawn from.
    pub source_chunk_id: String,
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        chunk_id: row.get("chunk_id")?,
        source: row.get("source")?,
        document_path: row.get("document_path")?,
        section: row.get("section")?,
        page_start: row.get("page_start")?,
        page_end: row.get("page_end")?,
        text: row.get("text")?,
        token_count: row.get("token_count")?,
        is_definitions: row.get::<_, i64>("is_definitions")? != 0,
        relative_path: row.get("relative_path")?,
        word_count: row.get("word_count")?,
    })
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// `SQLite`-backed store serving as the concrete implementation of every
/// index/store collaborator named in §6.1.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if necessary) a database file at `path` and ensures
    /// the schema is current.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Opens an in-memory database; used in tests and for ephemeral
    /// demo/ingest round-trips.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let already_initialized: i64 = conn.query_row(CHECK_SCHEMA_SQL, [], |r| r.get(0))?;
        conn.execute_batch(SCHEMA_SQL)?;
        if already_initialized == 0 {
            conn.execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])?;
        }
        Ok(())
    }

    /// Reports the persisted schema version, mainly for `/ready` diagnostics.
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let raw: String = conn.query_row(GET_VERSION_SQL, [], |r| r.get(0))?;
        raw.parse()
            .map_err(|_| Error::Storage(StorageError::Migration(format!("bad version: {raw}"))))
    }

    /// Loads a batch of pre-chunked, pre-embedded records, replacing any
    /// existing rows with the same `chunk_id`. Ingestion itself (chunking,
    /// extraction, embedding computation) remains out of scope; this only
    /// persists records already produced by it.
    pub fn ingest_chunks(&self, records: &[IngestRecord]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(lock_poisoned)?;
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT OR REPLACE INTO chunks
                 (chunk_id, source, document_path, section, page_start, page_end, text,
                  token_count, is_definitions, relative_path, word_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, strftime('%s','now'))",
                params![
                    record.chunk_id,
                    record.source,
                    record.document_path,
                    record.section,
                    record.page_start,
                    record.page_end,
                    record.text,
                    record.token_count,
                    i64::from(record.is_definitions),
                    record.relative_path,
                    record.word_count,
                ],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding, dimensions)
                 VALUES (?1, ?2, ?3)",
                params![
                    record.chunk_id,
                    embedding_to_blob(&record.embedding),
                    i64::try_from(record.embedding.len()).unwrap_or(0),
                ],
            )?;
        }
        let count = records.len();
        tx.commit()?;
        Ok(count)
    }

    /// Loads a batch of definitions, replacing any existing `(source, term)` row.
    pub fn ingest_definitions(&self, defs: &[IngestDefinition]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(lock_poisoned)?;
        let tx = conn.transaction()?;
        for def in defs {
            tx.execute(
                "INSERT OR REPLACE INTO definitions (source, term, text, source_chunk_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![def.source, def.term.to_lowercase(), def.text, def.source_chunk_id],
            )?;
        }
        let count = defs.len();
        tx.commit()?;
        Ok(count)
    }
}

fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::InternalInvariant("store mutex poisoned by a prior panic".to_string())
}

impl ChunkStore for SqliteStore {
    fn get(&self, chunk_id: &str) -> Result<Chunk> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        conn.query_row(
            "SELECT chunk_id, source, document_path, section, page_start, page_end, text,
                    token_count, is_definitions, relative_path, word_count
             FROM chunks WHERE chunk_id = ?1",
            params![chunk_id],
            row_to_chunk,
        )
        .optional()?
        .ok_or_else(|| {
            Error::Storage(StorageError::ChunkNotFound {
                id: chunk_id.to_string(),
            })
        })
    }

    fn list_documents(&self, source: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT document_path FROM chunks WHERE source = ?1 ORDER BY document_path",
        )?;
        let rows = stmt.query_map(params![source], |r| r.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn list_sources(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let mut stmt = conn.prepare("SELECT DISTINCT source FROM chunks ORDER BY source")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn document_count(&self, source: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT document_path) FROM chunks WHERE source = ?1",
            params![source],
            |r| r.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl VectorIndex for SqliteStore {
    fn query_vector(&self, source: &str, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT c.chunk_id, e.embedding
             FROM chunks c JOIN chunk_embeddings e ON e.chunk_id = c.chunk_id
             WHERE c.source = ?1",
        )?;
        let rows = stmt.query_map(params![source], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Vec<u8>>(1)?))
        })?;

        let mut scored: Vec<IndexHit> = rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(chunk_id, blob)| {
                let embedding = blob_to_embedding(&blob);
                let score = f64::from(cosine_similarity(vector, &embedding));
                IndexHit { chunk_id, score }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn is_available(&self, source: &str) -> bool {
        let Ok(conn) = self.conn.lock() else {
            return false;
        };
        conn.query_row(
            "SELECT COUNT(*) FROM chunks c JOIN chunk_embeddings e ON e.chunk_id = c.chunk_id
             WHERE c.source = ?1",
            params![source],
            |r| r.get::<_, i64>(0),
        )
        .is_ok_and(|count| count > 0)
    }
}

impl LexicalIndex for SqliteStore {
    fn query_lexical(&self, source: &str, tokens: &[String], k: usize) -> Result<Vec<IndexHit>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().map_err(lock_poisoned)?;

        // Quote each term and OR them together so any matching term surfaces
        // the chunk; bm25() returns lower-is-better, so negate for ordinal
        // "higher is more relevant" consistency with the vector index.
        let match_query = tokens
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut stmt = conn.prepare(
            "SELECT c.chunk_id, -bm25(chunks_fts) AS score
             FROM chunks_fts
             JOIN chunks c ON c.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ?1 AND c.source = ?2
             ORDER BY score DESC
             LIMIT ?3",
        )?;
        let limit = i64::try_from(k).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![match_query, source, limit], |r| {
            Ok(IndexHit {
                chunk_id: r.get(0)?,
                score: r.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn is_available(&self, source: &str) -> bool {
        let Ok(conn) = self.conn.lock() else {
            return false;
        };
        conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE source = ?1",
            params![source],
            |r| r.get::<_, i64>(0),
        )
        .is_ok_and(|count| count > 0)
    }
}

impl DefinitionsStore for SqliteStore {
    fn definitions(&self, source: &str) -> Result<HashMap<String, crate::model::Definition>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT term, text, source_chunk_id FROM definitions WHERE source = ?1",
        )?;
        let rows = stmt.query_map(params![source], |r| {
            Ok(crate::model::Definition {
                term: r.get(0)?,
                text: r.get(1)?,
                source_chunk_id: r.get(2)?,
            })
        })?;
        let mut map = HashMap::new();
        for def in rows {
            let def = def?;
            map.insert(def.term.clone(), def);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(id: &str, source: &str, text: &str, embedding: Vec<f32>) -> IngestRecord {
        IngestRecord {
            chunk_id: id.to_string(),
            source: source.to_string(),
            document_path: "agreement.pdf".to_string(),
            section: Some("Definitions".to_string()),
            page_start: 1,
            page_end: 1,
            text: text.to_string(),
            token_count: u32::try_from(text.split_whitespace().count()).unwrap_or(0),
            is_definitions: true,
            relative_path: None,
            word_count: None,
            embedding,
        }
    }

    #[test]
    fn ingest_then_get_round_trips() {
        let store = SqliteStore::in_memory().unwrap();
        let record = sample_record("c1", "cme", "A Subscriber means a licensed user.", vec![1.0, 0.0, 0.0]);
        store.ingest_chunks(&[record]).unwrap();

        let chunk = store.get("c1").unwrap();
        assert_eq!(chunk.source, "cme");
        assert!(chunk.text.contains("Subscriber"));
    }

    #[test]
    fn get_missing_chunk_errors() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.get("missing").unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::ChunkNotFound { .. })));
    }

    #[test]
    fn vector_query_ranks_by_cosine_similarity() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ingest_chunks(&[
                sample_record("near", "cme", "close match", vec![1.0, 0.0, 0.0]),
                sample_record("far", "cme", "far match", vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let hits = store.query_vector("cme", &[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits[0].chunk_id, "near");
    }

    #[test]
    fn lexical_query_matches_fts5() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ingest_chunks(&[sample_record(
                "c1",
                "cme",
                "termination of this agreement requires written notice",
                vec![0.0; 3],
            )])
            .unwrap();

        let hits = store
            .query_lexical("cme", &["termination".to_string()], 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "c1");
    }

    #[test]
    fn list_sources_and_documents() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ingest_chunks(&[sample_record("c1", "cme", "text", vec![0.0; 3])])
            .unwrap();
        assert_eq!(store.list_sources().unwrap(), vec!["cme".to_string()]);
        assert_eq!(store.document_count("cme").unwrap(), 1);
    }

    #[test]
    fn definitions_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ingest_definitions(&[IngestDefinition {
                source: "cme".to_string(),
                term: "Subscriber".to_string(),
                text: "A person granted access under this license.".to_string(),
                source_chunk_id: "c1".to_string(),
            }])
            .unwrap();

        let defs = store.definitions("cme").unwrap();
        assert!(defs.contains_key("subscriber"));
    }

    #[test]
    fn availability_reflects_presence_of_data() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!VectorIndex::is_available(&store, "cme"));
        store
            .ingest_chunks(&[sample_record("c1", "cme", "text", vec![0.0; 3])])
            .unwrap();
        assert!(VectorIndex::is_available(&store, "cme"));
        assert!(LexicalIndex::is_available(&store, "cme"));
    }
}
