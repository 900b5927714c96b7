//! # licentia
//!
//! Deterministic retrieval-and-refusal query engine for answering questions
//! over a fixed corpus of legal and licensing documents.
//!
//! A single question flows through a linear pipeline: normalization, hybrid
//! vector+lexical retrieval fused with Reciprocal Rank Fusion, optional LLM
//! reranking, a two-tier confidence gate, definitions linking, token-budget
//! packing, grounded answer generation, and output validation. Every
//! invocation -- answered or refused -- is recorded to an append-only
//! compliance audit log.
//!
//! ## Features
//!
//! - **Hybrid retrieval**: `SQLite` FTS5 BM25 plus brute-force cosine vector
//!   search, fused by RRF.
//! - **Grounded answers**: the answer LLM is given only retrieved chunks and
//!   linked definitions, never free rein.
//! - **Deterministic refusal**: a two-tier confidence gate refuses rather
//!   than guesses when retrieval is weak.
//! - **Audit trail**: rotating, append-only NDJSON compliance and debug logs.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod answer;
pub mod api;
pub mod audit;
pub mod budget;
pub mod cli;
pub mod config;
pub mod definitions;
pub mod embedding;
pub mod error;
pub mod gate;
pub mod llm;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod rerank;
pub mod retrieval;
pub mod store;
pub mod tokenizer;
pub mod validate;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export the domain model
pub use model::{
    canonical_refusal, Chunk, Citation, Definition, QueryResult, RANK_ABSENT, RefusalReason,
    RetrievalCandidate, ScoreKind, ScoredChunk, SearchMode,
};

// Re-export configuration
pub use config::{ApiConfig, AuditConfig, BudgetConfig, GateConfig, RerankConfig, RetrievalConfig, Settings};

// Re-export the orchestrator, the crate's primary entry point
pub use orchestrator::{QueryOrchestrator, QueryRequest};

// Re-export storage types
pub use store::{ChunkStore, DefinitionsStore, IngestDefinition, IngestRecord, LexicalIndex, SqliteStore, VectorIndex};

// Re-export embedding types
#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{create_embedder, Embedder, FallbackEmbedder, DEFAULT_DIMENSIONS};

// Re-export the LLM collaborator contract and its OpenAI-backed client
pub use llm::openai::{OpenAiClient, OpenAiConfig};
pub use llm::{CompletionOptions, LlmClient, LlmResponse};

// Re-export audit types
pub use audit::{AuditCounters, AuditSink, ComplianceRecord, DebugRecord};

// Re-export CLI types
pub use cli::{Cli, Commands};
