//! LLM-based reranking with bounded concurrency, strict score parsing, and a
//! fallback to raw retrieval scores when too many calls fail.

use crate::config::RerankConfig;
use crate::error::Result;
use crate::llm::prompts::{build_rerank_prompt, PromptSet};
use crate::llm::{CompletionOptions, LlmClient};
use crate::model::{Chunk, ScoreKind, ScoredChunk};
use crate::store::traits::ChunkStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Outcome of a single per-chunk scoring call.
struct RawScore {
    chunk: Chunk,
    score: f64,
    failed: bool,
    explanation: Option<String>,
}

/// Aborts every handle it holds when dropped. Rerank tasks are spawned
/// independently of the caller's future, so if the request deadline fires
/// and `rerank` is cancelled mid-flight, dropping this guard is what stops
/// the in-flight LLM calls instead of leaving them to run to completion.
struct AbortOnDrop(Vec<tokio::task::AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Reranks retrieval candidates with a bounded pool of concurrent LLM calls.
pub struct Reranker<S> {
    llm: Arc<dyn LlmClient>,
    chunk_store: Arc<S>,
    prompts: Arc<PromptSet>,
    config: RerankConfig,
}

impl<S: ChunkStore + 'static> Reranker<S> {
    /// Builds a reranker over the given collaborators.
    pub const fn new(llm: Arc<dyn LlmClient>, chunk_store: Arc<S>, prompts: Arc<PromptSet>, config: RerankConfig) -> Self {
        Self {
            llm,
            chunk_store,
            prompts,
            config,
        }
    }

    /// Reranks `candidate_ids`, returning `(scored_chunks, scores_are_reranked)`.
    /// Returns an empty list and `scores_are_reranked = true` iff the input was empty.
    pub async fn rerank(
        &self,
        question: &str,
        candidates: &[(String, f64)],
    ) -> Result<(Vec<ScoredChunk>, bool)> {
        if candidates.is_empty() {
            return Ok((Vec::new(), true));
        }

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let mut tasks = Vec::with_capacity(candidates.len());
        let mut abort_handles = Vec::with_capacity(candidates.len());
        for (chunk_id, rrf_score) in candidates {
            let chunk = self.chunk_store.get(chunk_id)?;
            let llm = Arc::clone(&self.llm);
            let prompts = Arc::clone(&self.prompts);
            let semaphore = Arc::clone(&semaphore);
            let question = question.to_string();
            let max_chars = self.config.max_chars;
            let include_explanations = self.config.include_explanations;
            let max_output_tokens = if include_explanations { 60 } else { 5 };
            let rrf_fallback = *rrf_score;

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok();
                let truncated: String = chunk.text.chars().take(max_chars).collect();
                let user_prompt = build_rerank_prompt(&question, &truncated);
                let options = CompletionOptions::rerank(max_output_tokens, timeout);

                let raw = match llm.complete(&prompts.rerank_system, &user_prompt, options).await {
                    Ok(response) => match parse_score(&response.text) {
                        Some(score) => RawScore {
                            chunk,
                            score: f64::from(score),
                            failed: false,
                            explanation: include_explanations.then(|| extract_explanation(&response.text)).flatten(),
                        },
                        None => RawScore {
                            chunk,
                            score: 0.0,
                            failed: true,
                            explanation: None,
                        },
                    },
                    Err(_) => RawScore {
                        chunk,
                        score: 0.0,
                        failed: true,
                        explanation: None,
                    },
                };
                (raw, rrf_fallback)
            });
            abort_handles.push(handle.abort_handle());
            tasks.push(handle);
        }

        let _abort_guard = AbortOnDrop(abort_handles);

        let mut raw_scores = Vec::with_capacity(tasks.len());
        let mut rrf_fallbacks = Vec::with_capacity(tasks.len());
        for task in tasks {
            let (raw, rrf_fallback) = task.await.map_err(|e| {
                crate::error::Error::InternalInvariant(format!("rerank task panicked: {e}"))
            })?;
            rrf_fallbacks.push((raw.chunk.chunk_id.clone(), rrf_fallback));
            raw_scores.push(raw);
        }

        let failed_count = raw_scores.iter().filter(|r| r.failed).count();
        let majority_failed = failed_count * 2 > raw_scores.len();

        if majority_failed {
            let mut fallback: Vec<ScoredChunk> = raw_scores
                .into_iter()
                .zip(rrf_fallbacks)
                .map(|(raw, (_, rrf_score))| ScoredChunk {
                    chunk: raw.chunk,
                    score: rrf_score,
                    score_kind: ScoreKind::Rrf,
                    rerank_failed: false,
                    explanation: None,
                })
                .collect();
            fallback.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.chunk.token_count.cmp(&b.chunk.token_count))
                    .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
            });
            return Ok((fallback, false));
        }

        let min_score = f64::from(self.config.min_score);
        let mut scored: Vec<ScoredChunk> = raw_scores
            .into_iter()
            .filter(|r| r.score >= min_score)
            .map(|r| ScoredChunk {
                chunk: r.chunk,
                score: r.score,
                score_kind: ScoreKind::Rerank,
                rerank_failed: r.failed,
                explanation: r.explanation,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.token_count.cmp(&b.chunk.token_count))
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        scored.truncate(self.config.max_kept);

        Ok((scored, true))
    }
}

/// Extracts the first integer 0-3 appearing in the response. Any other
/// content (no integer, an integer out of range as the first one found, or
/// an empty response) is a parse failure.
fn parse_score(text: &str) -> Option<u8> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_ascii_digit() {
            let digit = c.to_digit(10)?;
            if (0..=3).contains(&digit) {
                let preceded_by_digit = text[..i].chars().next_back().is_some_and(|p| p.is_ascii_digit());
                let followed_by_digit = text[i + 1..].chars().next().is_some_and(|n| n.is_ascii_digit());
                if !preceded_by_digit && !followed_by_digit {
                    return u8::try_from(digit).ok();
                }
            }
        }
    }
    None
}

fn extract_explanation(text: &str) -> Option<String> {
    text.lines().nth(1).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
