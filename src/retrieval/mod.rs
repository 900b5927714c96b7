//! Hybrid vector+lexical retrieval with Reciprocal Rank Fusion.

pub mod rrf;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::model::{RANK_ABSENT, RetrievalCandidate, SearchMode};
use crate::store::traits::{IndexHit, LexicalIndex, VectorIndex};
use rayon::prelude::*;
use rrf::{RrfConfig, reciprocal_rank_fusion};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-source retrieval outcome, tracking whether the request degraded from
/// the caller's requested mode.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    /// Source this outcome describes.
    pub source: String,
    /// Mode actually executed for this source after availability checks.
    pub effective_mode: SearchMode,
}

/// Result of a single `retrieve` call: fused candidates plus per-source
/// degradation bookkeeping used to compute the request-wide `effectiveSearchMode`.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Fused, deduplicated, capped candidates, sorted by RRF score descending.
    pub candidates: Vec<RetrievalCandidate>,
    /// Per-source mode actually used.
    pub source_outcomes: Vec<SourceOutcome>,
    /// Raw vector-index hits across every queried source, in query order.
    pub vector_hits: Vec<IndexHit>,
    /// Raw lexical-index hits across every queried source, in query order.
    pub lexical_hits: Vec<IndexHit>,
}

impl RetrievalResult {
    /// The mode to report to the caller: `hybrid` only if every source stayed
    /// hybrid; otherwise the (single, since degradation only ever narrows)
    /// degraded mode, or `hybrid` when there were no sources at all.
    #[must_use]
    pub fn effective_search_mode(&self) -> SearchMode {
        if self
            .source_outcomes
            .iter()
            .all(|o| o.effective_mode == SearchMode::Hybrid)
        {
            return SearchMode::Hybrid;
        }
        self.source_outcomes
            .iter()
            .map(|o| o.effective_mode)
            .find(|m| *m != SearchMode::Hybrid)
            .unwrap_or(SearchMode::Hybrid)
    }
}

/// Combines a `VectorIndex` and `LexicalIndex` into the fused retrieval
/// contract described in the component design.
pub struct HybridRetriever<V, L, E: ?Sized> {
    vector_index: Arc<V>,
    lexical_index: Arc<L>,
    embedder: Arc<E>,
    config: RetrievalConfig,
}

impl<V, L, E> HybridRetriever<V, L, E>
where
    V: VectorIndex,
    L: LexicalIndex,
    E: Embedder + ?Sized,
{
    /// Builds a retriever over the given collaborators.
    pub const fn new(vector_index: Arc<V>, lexical_index: Arc<L>, embedder: Arc<E>, config: RetrievalConfig) -> Self {
        Self {
            vector_index,
            lexical_index,
            embedder,
            config,
        }
    }

    /// Retrieves and fuses candidates across every source in `sources`.
    ///
    /// # Errors
    /// Returns [`Error::RetrievalUnavailable`] when every index is
    /// unavailable for every requested source.
    pub fn retrieve(
        &self,
        normalized_query: &str,
        sources: &[String],
        mode: SearchMode,
    ) -> Result<RetrievalResult> {
        let query_tokens: Vec<String> = normalized_query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let query_embedding = if mode == SearchMode::Lexical {
            None
        } else {
            Some(self.embedder.embed(normalized_query)?)
        };

        // Per source, the vector and lexical queries are independent reads
        // against read-only indexes; run both pool-bounded (rayon's global
        // pool) and join before fusion, matching the reranker's own
        // bounded-fan-out shape one stage downstream.
        let per_source: Vec<Result<(SourceOutcome, Option<Vec<IndexHit>>, Option<Vec<IndexHit>>)>> = sources
            .par_iter()
            .map(|source| {
                let vector_available = mode != SearchMode::Lexical && self.vector_index.is_available(source);
                let lexical_available = mode != SearchMode::Vector && self.lexical_index.is_available(source);

                let (vector_result, lexical_result) = rayon::join(
                    || -> Result<Option<Vec<IndexHit>>> {
                        if !vector_available {
                            return Ok(None);
                        }
                        let embedding = query_embedding.as_deref().unwrap_or(&[]);
                        Ok(Some(self.vector_index.query_vector(source, embedding, self.config.top_k_vector)?))
                    },
                    || -> Result<Option<Vec<IndexHit>>> {
                        if !lexical_available {
                            return Ok(None);
                        }
                        Ok(Some(self.lexical_index.query_lexical(source, &query_tokens, self.config.top_k_lexical)?))
                    },
                );

                let vector_list = vector_result?;
                let lexical_list = lexical_result?;

                let effective_mode = match (mode, vector_available, lexical_available) {
                    (SearchMode::Vector, _, _) => SearchMode::Vector,
                    (SearchMode::Lexical, _, _) => SearchMode::Lexical,
                    (SearchMode::Hybrid, true, true) => SearchMode::Hybrid,
                    (SearchMode::Hybrid, true, false) => SearchMode::Vector,
                    (SearchMode::Hybrid, false, true) => SearchMode::Lexical,
                    (SearchMode::Hybrid, false, false) => SearchMode::Hybrid,
                };

                Ok((
                    SourceOutcome {
                        source: source.clone(),
                        effective_mode,
                    },
                    vector_list,
                    lexical_list,
                ))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(per_source.len());
        let mut per_source_lists: Vec<(Option<Vec<IndexHit>>, Option<Vec<IndexHit>>)> = Vec::with_capacity(per_source.len());
        let mut any_index_available = false;

        for result in per_source {
            let (outcome, vector_list, lexical_list) = result?;
            if vector_list.is_some() || lexical_list.is_some() {
                any_index_available = true;
            }
            outcomes.push(outcome);
            per_source_lists.push((vector_list, lexical_list));
        }

        if !any_index_available {
            return Err(Error::RetrievalUnavailable(
                "no vector or lexical index is available for any requested source".to_string(),
            ));
        }

        let mut vector_ranks: HashMap<String, u32> = HashMap::new();
        let mut lexical_ranks: HashMap<String, u32> = HashMap::new();
        let mut all_vector_lists: Vec<Vec<String>> = Vec::new();
        let mut all_lexical_lists: Vec<Vec<String>> = Vec::new();
        let mut vector_hits: Vec<IndexHit> = Vec::new();
        let mut lexical_hits: Vec<IndexHit> = Vec::new();

        for (vector_list, lexical_list) in &per_source_lists {
            if let Some(list) = vector_list {
                let ids: Vec<String> = list.iter().map(|h| h.chunk_id.clone()).collect();
                for (rank, id) in ids.iter().enumerate() {
                    let rank_u32 = u32::try_from(rank).unwrap_or(RANK_ABSENT);
                    vector_ranks.entry(id.clone()).or_insert(rank_u32);
                }
                vector_hits.extend(list.iter().cloned());
                all_vector_lists.push(ids);
            }
            if let Some(list) = lexical_list {
                let ids: Vec<String> = list.iter().map(|h| h.chunk_id.clone()).collect();
                for (rank, id) in ids.iter().enumerate() {
                    let rank_u32 = u32::try_from(rank).unwrap_or(RANK_ABSENT);
                    lexical_ranks.entry(id.clone()).or_insert(rank_u32);
                }
                lexical_hits.extend(list.iter().cloned());
                all_lexical_lists.push(ids);
            }
        }

        let rrf_config = RrfConfig { k: self.config.rrf_k };
        let list_refs: Vec<&[String]> = all_vector_lists
            .iter()
            .map(Vec::as_slice)
            .chain(all_lexical_lists.iter().map(Vec::as_slice))
            .collect();
        let fused = reciprocal_rank_fusion(&list_refs, &rrf_config);

        let mut candidates: Vec<RetrievalCandidate> = fused
            .into_iter()
            .map(|(chunk_id, rrf_score)| {
                let vector_rank = vector_ranks.get(&chunk_id).copied().unwrap_or(RANK_ABSENT);
                let lexical_rank = lexical_ranks.get(&chunk_id).copied().unwrap_or(RANK_ABSENT);
                RetrievalCandidate {
                    chunk_id,
                    vector_rank,
                    lexical_rank,
                    rrf_score,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.rrf_score
                .partial_cmp(&a.rrf_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.vector_rank.cmp(&b.vector_rank))
                .then_with(|| a.lexical_rank.cmp(&b.lexical_rank))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(self.config.max_candidates);

        Ok(RetrievalResult {
            candidates,
            source_outcomes: outcomes,
            vector_hits,
            lexical_hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::store::traits::IndexHit;
    use std::sync::Mutex;

    struct StubVectorIndex {
        results: Mutex<HashMap<String, Vec<IndexHit>>>,
        available: HashMap<String, bool>,
    }

    impl VectorIndex for StubVectorIndex {
        fn query_vector(&self, source: &str, _vector: &[f32], _k: usize) -> Result<Vec<IndexHit>> {
            Ok(self.results.lock().unwrap().get(source).cloned().unwrap_or_default())
        }
        fn is_available(&self, source: &str) -> bool {
            self.available.get(source).copied().unwrap_or(false)
        }
    }

    struct StubLexicalIndex {
        results: HashMap<String, Vec<IndexHit>>,
        available: HashMap<String, bool>,
    }

    impl LexicalIndex for StubLexicalIndex {
        fn query_lexical(&self, source: &str, _tokens: &[String], _k: usize) -> Result<Vec<IndexHit>> {
            Ok(self.results.get(source).cloned().unwrap_or_default())
        }
        fn is_available(&self, source: &str) -> bool {
            self.available.get(source).copied().unwrap_or(false)
        }
    }

    fn hit(id: &str, score: f64) -> IndexHit {
        IndexHit {
            chunk_id: id.to_string(),
            score,
        }
    }

    #[test]
    fn hybrid_fuses_both_indexes() {
        let vector = StubVectorIndex {
            results: Mutex::new(HashMap::from([(
                "cme".to_string(),
                vec![hit("a", 0.9), hit("b", 0.8)],
            )])),
            available: HashMap::from([("cme".to_string(), true)]),
        };
        let lexical = StubLexicalIndex {
            results: HashMap::from([("cme".to_string(), vec![hit("b", 5.0), hit("a", 3.0)])]),
            available: HashMap::from([("cme".to_string(), true)]),
        };
        let retriever = HybridRetriever::new(
            Arc::new(vector),
            Arc::new(lexical),
            Arc::new(FallbackEmbedder::new(384)),
            RetrievalConfig::default(),
        );

        let result = retriever
            .retrieve("termination clause", &["cme".to_string()], SearchMode::Hybrid)
            .unwrap();

        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.effective_search_mode(), SearchMode::Hybrid);
    }

    #[test]
    fn degrades_to_lexical_when_vector_unavailable() {
        let vector = StubVectorIndex {
            results: Mutex::new(HashMap::new()),
            available: HashMap::from([("cme".to_string(), false)]),
        };
        let lexical = StubLexicalIndex {
            results: HashMap::from([("cme".to_string(), vec![hit("a", 3.0)])]),
            available: HashMap::from([("cme".to_string(), true)]),
        };
        let retriever = HybridRetriever::new(
            Arc::new(vector),
            Arc::new(lexical),
            Arc::new(FallbackEmbedder::new(384)),
            RetrievalConfig::default(),
        );

        let result = retriever
            .retrieve("termination clause", &["cme".to_string()], SearchMode::Hybrid)
            .unwrap();

        assert_eq!(result.effective_search_mode(), SearchMode::Lexical);
    }

    #[test]
    fn total_unavailability_is_fatal() {
        let vector = StubVectorIndex {
            results: Mutex::new(HashMap::new()),
            available: HashMap::from([("cme".to_string(), false)]),
        };
        let lexical = StubLexicalIndex {
            results: HashMap::new(),
            available: HashMap::from([("cme".to_string(), false)]),
        };
        let retriever = HybridRetriever::new(
            Arc::new(vector),
            Arc::new(lexical),
            Arc::new(FallbackEmbedder::new(384)),
            RetrievalConfig::default(),
        );

        let err = retriever
            .retrieve("x", &["cme".to_string()], SearchMode::Hybrid)
            .unwrap_err();
        assert!(matches!(err, Error::RetrievalUnavailable(_)));
    }

    #[test]
    fn candidate_pool_capped_at_max_candidates() {
        let many: Vec<IndexHit> = (0..20).map(|i| hit(&format!("c{i}"), 1.0 - f64::from(i) * 0.01)).collect();
        let vector = StubVectorIndex {
            results: Mutex::new(HashMap::from([("cme".to_string(), many)])),
            available: HashMap::from([("cme".to_string(), true)]),
        };
        let lexical = StubLexicalIndex {
            results: HashMap::new(),
            available: HashMap::from([("cme".to_string(), false)]),
        };
        let config = RetrievalConfig {
            top_k_vector: 20,
            ..RetrievalConfig::default()
        };
        let retriever = HybridRetriever::new(Arc::new(vector), Arc::new(lexical), Arc::new(FallbackEmbedder::new(384)), config);

        let result = retriever
            .retrieve("x", &["cme".to_string()], SearchMode::Hybrid)
            .unwrap();
        assert_eq!(result.candidates.len(), 12);
    }
}
