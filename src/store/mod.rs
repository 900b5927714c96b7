//! Storage layer: narrow collaborator traits (§6.1) plus a concrete
//! `SQLite`-backed implementation used by both the CLI and the API front.

pub mod schema;
pub mod sqlite;
pub mod traits;

pub use sqlite::{IngestDefinition, IngestRecord, SqliteStore};
pub use traits::{ChunkStore, DefinitionsStore, IndexHit, LexicalIndex, VectorIndex};
