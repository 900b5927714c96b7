//! Narrow collaborator interfaces the core consumes (§6.1): `ChunkStore`,
//! `DefinitionsStore`, `VectorIndex`, `LexicalIndex`. The core treats all
//! four as read-only observers; it never mutates chunks or definitions.

use crate::error::Result;
use crate::model::{Chunk, Definition};
use std::collections::HashMap;

/// A single scored hit from the vector or lexical index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Identity of the matched chunk.
    pub chunk_id: String,
    /// Cosine similarity (vector) or raw BM25 score (lexical).
    pub score: f64,
}

/// `get(chunkID) -> Chunk` and `listDocuments(source) -> [documentPath]`.
/// Implementations must support concurrent reads.
pub trait ChunkStore: Send + Sync {
    /// Fetches a single chunk by ID.
    fn get(&self, chunk_id: &str) -> Result<Chunk>;

    /// Lists the distinct document paths known for a source.
    fn list_documents(&self, source: &str) -> Result<Vec<String>>;

    /// Lists every source tag this store has chunks for.
    fn list_sources(&self) -> Result<Vec<String>>;

    /// Counts chunks for a source, for the `/sources` API surface.
    fn document_count(&self, source: &str) -> Result<usize>;
}

/// `definitions(source) -> map[term -> Definition]`, loaded once per
/// process and cached immutably by the caller.
pub trait DefinitionsStore: Send + Sync {
    /// Returns the full definitions map for a source, keyed by normalized
    /// (lowercased) term.
    fn definitions(&self, source: &str) -> Result<HashMap<String, Definition>>;
}

/// `queryVector(source, vector, k) -> [{chunkID, score}]`; higher score is
/// more similar. Scores are cosine similarities in `[-1, 1]` but the core
/// treats them only ordinally.
pub trait VectorIndex: Send + Sync {
    /// Returns the top-`k` chunks by cosine similarity to `vector` within `source`.
    fn query_vector(&self, source: &str, vector: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Whether this index is currently usable for `source` (used to decide
    /// whether a hybrid request must degrade to lexical-only).
    fn is_available(&self, source: &str) -> bool;
}

/// `queryLexical(source, tokens, k) -> [{chunkID, bm25Score}]`; scores are
/// unbounded positives.
pub trait LexicalIndex: Send + Sync {
    /// Returns the top-`k` chunks by BM25 score against `tokens` within `source`.
    fn query_lexical(&self, source: &str, tokens: &[String], k: usize) -> Result<Vec<IndexHit>>;

    /// Whether this index is currently usable for `source`.
    fn is_available(&self, source: &str) -> bool;
}
