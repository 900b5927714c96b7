//! Data model shared across the query pipeline.
//!
//! Chunks are produced by ingestion (out of scope for this crate) and are
//! treated as read-only by every stage below. The other types here are
//! request-scoped and never outlive a single `QueryOrchestrator` invocation.

use serde::{Deserialize, Serialize};

/// A contiguous, section-aware text fragment of a source document.
///
/// `chunkID` is assumed globally unique across all sources; `tokenCount` is
/// expected to have been measured with the same tokenizer the [`crate::budget::Budgeter`]
/// uses, so the core never needs to recompute it except as a defensive
/// slow path (see §6.2 of the design notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable, globally unique identifier.
    pub chunk_id: String,
    /// Short tag naming the document provider, e.g. `"cme"`.
    pub source: String,
    /// Path to the source document, relative to the source's root.
    pub document_path: String,
    /// Optional heading under which this chunk falls.
    pub section: Option<String>,
    /// First page this chunk spans (1-indexed).
    pub page_start: u32,
    /// Last page this chunk spans (1-indexed).
    pub page_end: u32,
    /// Verbatim chunk text.
    pub text: String,
    /// Precomputed token count, measured at ingest time.
    pub token_count: u32,
    /// Whether this chunk originates from a definitions section.
    pub is_definitions: bool,
    /// Path relative to an arbitrary corpus root, used for display purposes.
    pub relative_path: Option<String>,
    /// Precomputed word count, used only for audit/debug reporting.
    pub word_count: Option<u32>,
}

impl Chunk {
    /// Computes the word count on demand when ingestion did not precompute one.
    #[must_use]
    pub fn effective_word_count(&self) -> u32 {
        self.word_count
            .unwrap_or_else(|| u32::try_from(self.text.split_whitespace().count()).unwrap_or(u32::MAX))
    }
}

/// What kind of score a [`ScoredChunk`] carries.
///
/// Within a single pipeline invocation all scores outside the reranker are
/// `Rrf`; after a *successful* rerank pass every surviving score is `Rerank`.
/// The two never mix within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    /// Score came from Reciprocal Rank Fusion over retrieval indexes.
    Rrf,
    /// Score came from the LLM reranker (0-3 relevance scale).
    Rerank,
}

/// A chunk annotated with a pipeline-stage score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The scored chunk.
    pub chunk: Chunk,
    /// The score itself; interpretation depends on `score_kind`.
    pub score: f64,
    /// Which scoring regime produced `score`.
    pub score_kind: ScoreKind,
    /// Set when the reranker could not score this chunk (timeout, transport,
    /// or parse failure). Always `false` for RRF-kind scores.
    pub rerank_failed: bool,
    /// Optional one-line explanation from the reranker, when requested.
    pub explanation: Option<String>,
}

/// A rank position, or "absent from this index".
pub const RANK_ABSENT: u32 = u32::MAX;

/// A deduplicated, RRF-fused retrieval result prior to reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    /// Identity of the retrieved chunk.
    pub chunk_id: String,
    /// Rank (0-indexed) in the vector index's results, or [`RANK_ABSENT`].
    pub vector_rank: u32,
    /// Rank (0-indexed) in the lexical index's results, or [`RANK_ABSENT`].
    pub lexical_rank: u32,
    /// Fused Reciprocal Rank Fusion score.
    pub rrf_score: f64,
}

/// A defined term and its verbatim definition text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// Normalized (lowercased) lookup key for the term.
    pub term: String,
    /// Verbatim definition text.
    pub text: String,
    /// Chunk this definition was drawn from, for citation purposes.
    pub source_chunk_id: String,
}

/// The search mode requested by a caller, or actually executed by the
/// retriever after any per-source degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Dense vector search only.
    Vector,
    /// BM25 lexical search only.
    Lexical,
    /// Both, fused via RRF.
    Hybrid,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Vector => "vector",
            Self::Lexical => "lexical",
            Self::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// Enumerates every reason the pipeline can refuse to answer. Matches the
/// reasons named throughout the component design (§4.4, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    /// Retrieval returned zero candidates.
    NoChunksRetrieved,
    /// Reranked-tier: top score below `RELEVANCE_THRESHOLD`.
    TopBelowThreshold,
    /// Reranked-tier: fewer than `MIN_CHUNKS_REQUIRED` chunks cleared the threshold.
    InsufficientChunks,
    /// Raw-tier: top retrieval score at or below `RETRIEVAL_MIN_SCORE`.
    TopScoreTooLow,
    /// Raw-tier: no clear winner between the top two retrieval scores.
    NoClearWinner,
    /// Every surviving chunk was too large to fit the token budget.
    EmptyContextAfterBudget,
}

impl RefusalReason {
    /// Wire-format name used in audit records and API responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoChunksRetrieved => "no_chunks_retrieved",
            Self::TopBelowThreshold => "top_below_threshold",
            Self::InsufficientChunks => "insufficient_chunks",
            Self::TopScoreTooLow => "top_score_too_low",
            Self::NoClearWinner => "no_clear_winner",
            Self::EmptyContextAfterBudget => "empty_context_after_budget",
        }
    }
}

/// Builds the canonical refusal string (§6.4), naming the upper-cased,
/// first-listed requested source.
#[must_use]
pub fn canonical_refusal(first_source: &str) -> String {
    format!(
        "This is not addressed in the provided {} documents.",
        first_source.to_uppercase()
    )
}

/// A single citation pointing at a supporting chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Document display name.
    pub document: String,
    /// Section heading, if any.
    pub section: Option<String>,
    /// First page.
    pub page_start: u32,
    /// Last page.
    pub page_end: u32,
    /// Source tag.
    pub source: String,
}

/// The fully populated result of a single orchestrator invocation, emitted
/// regardless of success or refusal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Unique identifier for this query.
    pub query_id: String,
    /// The question exactly as submitted.
    pub original_question: String,
    /// The normalized form used for retrieval.
    pub normalized_question: String,
    /// Sources that were requested.
    pub sources: Vec<String>,
    /// Rendered answer, or the canonical refusal string.
    pub answer: String,
    /// Whether the pipeline refused to answer.
    pub refused: bool,
    /// Why the pipeline refused, when `refused` is true.
    pub refusal_reason: Option<RefusalReason>,
    /// Citations supporting the answer; empty for refusals.
    pub citations: Vec<Citation>,
    /// Terms for which a definition was linked into the answer context.
    pub definitions_linked: Vec<String>,
    /// Total candidates returned by retrieval before gating/budgeting.
    pub chunks_retrieved: usize,
    /// Chunks actually supplied to the answer generator.
    pub chunks_used: usize,
    /// Prompt tokens consumed by the answer-generation call (0 for refusals).
    pub input_tokens: u32,
    /// Completion tokens produced by the answer-generation call (0 for refusals).
    pub output_tokens: u32,
    /// Wall-clock duration of the whole request, in milliseconds.
    pub latency_ms: u64,
    /// The search mode the caller asked for.
    pub search_mode: SearchMode,
    /// The search mode actually executed, after any per-source degradation.
    pub effective_search_mode: SearchMode,
    /// Whether the chunks used for gating carry reranked (vs. raw RRF) scores.
    pub scores_are_reranked: bool,
}
