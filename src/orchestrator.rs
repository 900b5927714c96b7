//! Wires every pipeline stage into the linear state machine described in the
//! component design: `INIT → NORMALIZE → RETRIEVE → RERANK → GATE →
//! LINK_DEFS → BUDGET → ANSWER → VALIDATE → AUDIT`.

use crate::answer::AnswerGenerator;
use crate::audit::{AuditSink, ComplianceRecord};
use crate::budget::Budgeter;
use crate::definitions::link_definitions;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::gate::ConfidenceGate;
use crate::model::{Citation, Definition, QueryResult, RefusalReason, SearchMode};
use crate::normalize::normalize;
use crate::rerank::Reranker;
use crate::retrieval::HybridRetriever;
use crate::store::traits::{ChunkStore, DefinitionsStore, LexicalIndex, VectorIndex};
use crate::tokenizer::Tokenizer;
use crate::validate::validate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single query request accepted by the orchestrator.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Natural-language question as submitted by the caller.
    pub question: String,
    /// Source tags to search.
    pub sources: Vec<String>,
    /// Requested search mode.
    pub mode: SearchMode,
    /// Wall-clock deadline for the whole request.
    pub deadline: Duration,
}

/// Drives a single query through every pipeline stage, wiring together the
/// retrieval, reranking, gating, budgeting, and answer-generation
/// collaborators plus the audit sink.
pub struct QueryOrchestrator<V, L, E: ?Sized, S> {
    retriever: Arc<HybridRetriever<V, L, E>>,
    reranker: Arc<Reranker<S>>,
    gate: ConfidenceGate,
    budgeter: Budgeter,
    answer_generator: Arc<AnswerGenerator>,
    tokenizer: Arc<dyn Tokenizer>,
    definitions_store: Arc<S>,
    audit: Arc<AuditSink>,
    rerank_enabled: bool,
}

impl<V, L, E, S> QueryOrchestrator<V, L, E, S>
where
    V: VectorIndex,
    L: LexicalIndex,
    E: Embedder + ?Sized,
    S: ChunkStore + DefinitionsStore + 'static,
{
    /// Builds an orchestrator over its collaborators.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        retriever: Arc<HybridRetriever<V, L, E>>,
        reranker: Arc<Reranker<S>>,
        gate: ConfidenceGate,
        budgeter: Budgeter,
        answer_generator: Arc<AnswerGenerator>,
        tokenizer: Arc<dyn Tokenizer>,
        definitions_store: Arc<S>,
        audit: Arc<AuditSink>,
        rerank_enabled: bool,
    ) -> Self {
        Self {
            retriever,
            reranker,
            gate,
            budgeter,
            answer_generator,
            tokenizer,
            definitions_store,
            audit,
            rerank_enabled,
        }
    }

    /// Runs the full pipeline for a single request.
    ///
    /// # Errors
    /// Returns [`Error::TimedOut`] if the deadline is exceeded before the
    /// confidence gate, [`Error::RetrievalUnavailable`] if no index can
    /// serve any requested source, and propagates storage/LLM errors
    /// otherwise. A deterministic refusal is never an `Err` -- it is a
    /// successful [`QueryResult`] with `refused = true`.
    #[tracing::instrument(skip(self, request), fields(query_id, sources = ?request.sources))]
    pub async fn execute(&self, request: QueryRequest) -> Result<QueryResult> {
        let query_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("query_id", query_id.as_str());
        let started = Instant::now();

        if request.deadline.is_zero() {
            tracing::debug!("rejected: zero deadline");
            self.write_compliance_for_timeout(&query_id, &request, started.elapsed());
            return Err(Error::TimedOut);
        }

        let pre_gate = tokio::time::timeout(request.deadline, self.run_until_gate(&request));

        let (normalized, mut candidates_retrieved, scored, scores_are_reranked, effective_mode, refusal, retrieval) = match pre_gate
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => return Err(err),
            Err(_elapsed) => {
                self.write_compliance_for_timeout(&query_id, &request, started.elapsed());
                return Err(Error::TimedOut);
            }
        };

        if let Some(reason) = refusal {
            return Ok(self.finish_refusal(
                query_id,
                request,
                normalized,
                effective_mode,
                candidates_retrieved,
                reason,
                started.elapsed(),
            ));
        }

        let definitions_map = self.merge_definitions(&request.sources)?;
        let kept_chunks_before_budget: Vec<_> = scored.iter().map(|s| s.chunk.clone()).collect();
        let linked = link_definitions(&request.question, &kept_chunks_before_budget, &definitions_map);

        let (kept_chunks, budget_info) = self.budgeter.enforce_budget(&scored, self.tokenizer.as_ref(), &request.question);
        tracing::debug!(kept = kept_chunks.len(), target_tokens = budget_info.total_tokens, "budget enforced");

        if kept_chunks.is_empty() {
            candidates_retrieved = candidates_retrieved.max(scored.len());
            return Ok(self.finish_refusal(
                query_id,
                request,
                normalized,
                effective_mode,
                candidates_retrieved,
                RefusalReason::EmptyContextAfterBudget,
                started.elapsed(),
            ));
        }

        let refusal_string = crate::model::canonical_refusal(
            request.sources.first().map_or("", String::as_str),
        );
        let answer_output = self
            .answer_generator
            .generate(&request.question, &kept_chunks, &linked, &refusal_string)
            .await?;

        let validation_errors = validate(&answer_output.answer_text, false);
        if !validation_errors.is_empty() {
            tracing::warn!(errors = ?validation_errors, "answer failed contract validation");
        }

        let citations: Vec<Citation> = kept_chunks
            .iter()
            .map(|c| Citation {
                document: c.document_path.clone(),
                section: c.section.clone(),
                page_start: c.page_start,
                page_end: c.page_end,
                source: c.source.clone(),
            })
            .collect();

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let definitions_linked: Vec<String> = linked.iter().map(|d| d.term.clone()).collect();

        let result = QueryResult {
            query_id: query_id.clone(),
            original_question: request.question.clone(),
            normalized_question: normalized.clone(),
            sources: request.sources.clone(),
            answer: answer_output.answer_text.clone(),
            refused: false,
            refusal_reason: None,
            citations,
            definitions_linked,
            chunks_retrieved: candidates_retrieved,
            chunks_used: kept_chunks.len(),
            input_tokens: answer_output.input_tokens,
            output_tokens: answer_output.output_tokens,
            latency_ms,
            search_mode: request.mode,
            effective_search_mode: effective_mode,
            scores_are_reranked,
        };

        let vector_hits: Vec<crate::audit::IndexHitRecord> = retrieval
            .vector_hits
            .iter()
            .enumerate()
            .map(|(rank, hit)| crate::audit::IndexHitRecord {
                chunk_id: hit.chunk_id.clone(),
                rank: u32::try_from(rank).unwrap_or(crate::model::RANK_ABSENT),
                score: hit.score,
            })
            .collect();
        let lexical_hits: Vec<crate::audit::IndexHitRecord> = retrieval
            .lexical_hits
            .iter()
            .enumerate()
            .map(|(rank, hit)| crate::audit::IndexHitRecord {
                chunk_id: hit.chunk_id.clone(),
                rank: u32::try_from(rank).unwrap_or(crate::model::RANK_ABSENT),
                score: hit.score,
            })
            .collect();
        let rrf_fused: Vec<crate::audit::IndexHitRecord> = retrieval
            .candidates
            .iter()
            .enumerate()
            .map(|(rank, candidate)| crate::audit::IndexHitRecord {
                chunk_id: candidate.chunk_id.clone(),
                rank: u32::try_from(rank).unwrap_or(crate::model::RANK_ABSENT),
                score: candidate.rrf_score,
            })
            .collect();

        self.audit.write_debug(&crate::audit::DebugRecord {
            query_id: query_id.clone(),
            vector_hits,
            lexical_hits,
            rrf_fused,
            rerank: scored
                .iter()
                .map(|s| crate::audit::RerankRecord {
                    chunk_id: s.chunk.chunk_id.clone(),
                    score: s.score,
                    explanation: s.explanation.clone(),
                    failed: s.rerank_failed,
                })
                .collect(),
            gate_refusal_reason: None,
            gate_top_scores: scored.iter().map(|s| s.score).take(2).collect(),
            budget: crate::audit::BudgetMetrics {
                target_tokens: budget_info.total_tokens,
                final_tokens: budget_info.total_tokens,
                chunks_before: scored.len(),
                chunks_after: budget_info.kept_count,
            },
            answer_model: None,
            total_duration_ms: latency_ms,
        });

        self.audit.write_compliance(&ComplianceRecord {
            timestamp: rfc3339_now(),
            query_id,
            question: result.original_question.clone(),
            normalized_query: normalized,
            sources: result.sources.clone(),
            search_mode: result.search_mode,
            effective_search_mode: effective_mode,
            chunks_retrieved: result.chunks_retrieved,
            chunks_used: result.chunks_used,
            definitions_linked: result.definitions_linked.clone(),
            tokens_input: result.input_tokens,
            tokens_output: result.output_tokens,
            latency_ms,
            refused: false,
            refusal_reason: None,
            answer_word_count: result.answer.split_whitespace().count(),
            citation_count: result.citations.len(),
            validation_errors: validation_errors.iter().map(|e| e.as_str().to_string()).collect(),
        });

        Ok(result)
    }

    /// Runs `NORMALIZE` through `GATE`, returning everything the post-gate
    /// stages need. The `Option<RefusalReason>` signals a gate refusal.
    async fn run_until_gate(
        &self,
        request: &QueryRequest,
    ) -> Result<(
        String,
        usize,
        Vec<crate::model::ScoredChunk>,
        bool,
        SearchMode,
        Option<RefusalReason>,
        crate::retrieval::RetrievalResult,
    )> {
        let normalized = normalize(&request.question);
        tracing::debug!(normalized = %normalized, "normalized question");

        let retrieval = self.retriever.retrieve(&normalized, &request.sources, request.mode)?;
        let effective_mode = retrieval.effective_search_mode();
        tracing::debug!(candidates = retrieval.candidates.len(), mode = ?effective_mode, "retrieval complete");

        if retrieval.candidates.is_empty() {
            return Ok((normalized, 0, Vec::new(), true, effective_mode, Some(RefusalReason::NoChunksRetrieved), retrieval));
        }

        let pairs: Vec<(String, f64)> = retrieval
            .candidates
            .iter()
            .map(|c| (c.chunk_id.clone(), c.rrf_score))
            .collect();

        let (scored, scores_are_reranked) = if self.rerank_enabled {
            self.reranker.rerank(&request.question, &pairs).await?
        } else {
            let mut chunks = Vec::with_capacity(pairs.len());
            for (chunk_id, rrf_score) in &pairs {
                let chunk = self.definitions_store.get(chunk_id)?;
                chunks.push(crate::model::ScoredChunk {
                    chunk,
                    score: *rrf_score,
                    score_kind: crate::model::ScoreKind::Rrf,
                    rerank_failed: false,
                    explanation: None,
                });
            }
            (chunks, false)
        };

        tracing::debug!(kept = scored.len(), reranked = scores_are_reranked, "scoring complete");

        let refusal = self.gate.should_refuse(&scored, scores_are_reranked);
        if let Some(reason) = &refusal {
            tracing::debug!(?reason, "gate refused");
        }

        Ok((
            normalized,
            retrieval.candidates.len(),
            scored,
            scores_are_reranked,
            effective_mode,
            refusal,
            retrieval,
        ))
    }

    fn merge_definitions(&self, sources: &[String]) -> Result<HashMap<String, Definition>> {
        let mut merged = HashMap::new();
        for source in sources {
            for (term, def) in self.definitions_store.definitions(source)? {
                merged.entry(term).or_insert(def);
            }
        }
        Ok(merged)
    }

    fn finish_refusal(
        &self,
        query_id: String,
        request: QueryRequest,
        normalized: String,
        effective_mode: SearchMode,
        chunks_retrieved: usize,
        reason: RefusalReason,
        elapsed: Duration,
    ) -> QueryResult {
        let refusal_string = crate::model::canonical_refusal(request.sources.first().map_or("", String::as_str));
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        self.audit.write_compliance(&ComplianceRecord {
            timestamp: rfc3339_now(),
            query_id: query_id.clone(),
            question: request.question.clone(),
            normalized_query: normalized.clone(),
            sources: request.sources.clone(),
            search_mode: request.mode,
            effective_search_mode: effective_mode,
            chunks_retrieved,
            chunks_used: 0,
            definitions_linked: Vec::new(),
            tokens_input: 0,
            tokens_output: 0,
            latency_ms,
            refused: true,
            refusal_reason: Some(reason),
            answer_word_count: refusal_string.split_whitespace().count(),
            citation_count: 0,
            validation_errors: Vec::new(),
        });

        QueryResult {
            query_id,
            original_question: request.question,
            normalized_question: normalized,
            sources: request.sources,
            answer: refusal_string,
            refused: true,
            refusal_reason: Some(reason),
            citations: Vec::new(),
            definitions_linked: Vec::new(),
            chunks_retrieved,
            chunks_used: 0,
            input_tokens: 0,
            output_tokens: 0,
            latency_ms,
            search_mode: request.mode,
            effective_search_mode: effective_mode,
            scores_are_reranked: true,
        }
    }

    fn write_compliance_for_timeout(&self, query_id: &str, request: &QueryRequest, elapsed: Duration) {
        self.audit.write_compliance(&ComplianceRecord {
            timestamp: rfc3339_now(),
            query_id: query_id.to_string(),
            question: request.question.clone(),
            normalized_query: String::new(),
            sources: request.sources.clone(),
            search_mode: request.mode,
            effective_search_mode: request.mode,
            chunks_retrieved: 0,
            chunks_used: 0,
            definitions_linked: Vec::new(),
            tokens_input: 0,
            tokens_output: 0,
            latency_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            refused: false,
            refusal_reason: None,
            answer_word_count: 0,
            citation_count: 0,
            validation_errors: Vec::new(),
        });
    }
}

fn rfc3339_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BudgetConfig, GateConfig, RerankConfig, RetrievalConfig};
    use crate::embedding::FallbackEmbedder;
    use crate::error::LlmError;
    use crate::llm::{CompletionOptions, LlmClient, LlmResponse};
    use crate::llm::prompts::PromptSet;
    use crate::store::sqlite::{IngestDefinition, IngestRecord, SqliteStore};
    use crate::store::traits::IndexHit;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct StubVectorIndex {
        hits: Vec<IndexHit>,
    }
    impl VectorIndex for StubVectorIndex {
        fn query_vector(&self, _source: &str, _vector: &[f32], _k: usize) -> Result<Vec<IndexHit>> {
            Ok(self.hits.clone())
        }
        fn is_available(&self, _source: &str) -> bool {
            true
        }
    }

    struct StubLexicalIndex {
        hits: Vec<IndexHit>,
    }
    impl LexicalIndex for StubLexicalIndex {
        fn query_lexical(&self, _source: &str, _tokens: &[String], _k: usize) -> Result<Vec<IndexHit>> {
            Ok(self.hits.clone())
        }
        fn is_available(&self, _source: &str) -> bool {
            true
        }
    }

    struct StubLlm {
        response: Mutex<String>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _system: &str, _user: &str, _options: CompletionOptions) -> std::result::Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                text: self.response.lock().unwrap().clone(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    fn make_store() -> Arc<SqliteStore> {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ingest_chunks(&[IngestRecord {
                chunk_id: "c1".to_string(),
                source: "cme".to_string(),
                document_path: "doc.pdf".to_string(),
                section: Some("Termination".to_string()),
                page_start: 1,
                page_end: 1,
                text: "A Subscriber may terminate this agreement upon notice.".to_string(),
                token_count: 12,
                is_definitions: false,
                relative_path: None,
                word_count: None,
                embedding: vec![0.1; 384],
            }])
            .unwrap();
        store
            .ingest_definitions(&[IngestDefinition {
                source: "cme".to_string(),
                term: "subscriber".to_string(),
                text: "A licensed end user.".to_string(),
                source_chunk_id: "c1".to_string(),
            }])
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn full_pipeline_answers_when_gate_passes() {
        let store = make_store();
        let retriever = Arc::new(HybridRetriever::new(
            Arc::new(StubVectorIndex {
                hits: vec![IndexHit { chunk_id: "c1".to_string(), score: 0.9 }],
            }),
            Arc::new(StubLexicalIndex {
                hits: vec![IndexHit { chunk_id: "c1".to_string(), score: 5.0 }],
            }),
            Arc::new(FallbackEmbedder::new(384)),
            RetrievalConfig::default(),
        ));
        let llm = Arc::new(StubLlm {
            response: Mutex::new("3".to_string()),
        });
        let prompts = Arc::new(PromptSet::load(None, false));
        let reranker = Arc::new(Reranker::new(llm.clone(), store.clone(), prompts.clone(), RerankConfig::default()));
        let gate = ConfidenceGate::new(GateConfig::default());
        let budgeter = Budgeter::new(BudgetConfig::default());
        let answer_llm: Arc<dyn LlmClient> = Arc::new(StubLlm {
            response: Mutex::new("## Answer\nYes.\n## Supporting Clauses\n\"quote\"\n## Citations\ndoc.pdf | Termination | 1".to_string()),
        });
        let answer_generator = Arc::new(AnswerGenerator::new(answer_llm, prompts, Duration::from_secs(5)));
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(crate::tokenizer::ApproximateTokenizer);

        let dir = tempdir().unwrap();
        let audit = Arc::new(
            AuditSink::open(dir.path().join("queries.ndjson"), None, crate::config::AuditConfig::default()).unwrap(),
        );

        let orchestrator = QueryOrchestrator::new(
            retriever,
            reranker,
            gate,
            budgeter,
            answer_generator,
            tokenizer,
            store,
            audit,
            true,
        );

        let result = orchestrator
            .execute(QueryRequest {
                question: "Can a \"Subscriber\" terminate?".to_string(),
                sources: vec!["cme".to_string()],
                mode: SearchMode::Hybrid,
                deadline: Duration::from_secs(10),
            })
            .await
            .unwrap();

        assert!(!result.refused);
        assert_eq!(result.definitions_linked, vec!["subscriber".to_string()]);
        assert_eq!(result.chunks_used, 1);
    }

    #[tokio::test]
    async fn zero_deadline_times_out_immediately() {
        let store = make_store();
        let retriever = Arc::new(HybridRetriever::new(
            Arc::new(StubVectorIndex { hits: vec![] }),
            Arc::new(StubLexicalIndex { hits: vec![] }),
            Arc::new(FallbackEmbedder::new(384)),
            RetrievalConfig::default(),
        ));
        let llm: Arc<dyn LlmClient> = Arc::new(StubLlm {
            response: Mutex::new("0".to_string()),
        });
        let prompts = Arc::new(PromptSet::load(None, false));
        let reranker = Arc::new(Reranker::new(llm.clone(), store.clone(), prompts.clone(), RerankConfig::default()));
        let gate = ConfidenceGate::new(GateConfig::default());
        let budgeter = Budgeter::new(BudgetConfig::default());
        let answer_generator = Arc::new(AnswerGenerator::new(llm, prompts, Duration::from_secs(5)));
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(crate::tokenizer::ApproximateTokenizer);
        let dir = tempdir().unwrap();
        let audit = Arc::new(
            AuditSink::open(dir.path().join("queries.ndjson"), None, crate::config::AuditConfig::default()).unwrap(),
        );

        let orchestrator = QueryOrchestrator::new(
            retriever,
            reranker,
            gate,
            budgeter,
            answer_generator,
            tokenizer,
            store,
            audit,
            true,
        );

        let err = orchestrator
            .execute(QueryRequest {
                question: "x".to_string(),
                sources: vec!["cme".to_string()],
                mode: SearchMode::Hybrid,
                deadline: Duration::ZERO,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TimedOut));
    }
}
