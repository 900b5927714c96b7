//! Two-tier confidence gating: decides whether the surviving chunks justify
//! calling the answer LLM at all.

use crate::config::GateConfig;
use crate::model::{RefusalReason, ScoredChunk};

/// Evaluates the two-tier confidence gate described in the component design.
pub struct ConfidenceGate {
    config: GateConfig,
}

impl ConfidenceGate {
    /// Builds a gate from configuration.
    #[must_use]
    pub const fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Returns `Some(reason)` to refuse, or `None` to proceed.
    #[must_use]
    pub fn should_refuse(&self, chunks: &[ScoredChunk], scores_are_reranked: bool) -> Option<RefusalReason> {
        if !self.config.enabled {
            return None;
        }

        if scores_are_reranked {
            self.evaluate_reranked_tier(chunks)
        } else {
            self.evaluate_raw_tier(chunks)
        }
    }

    fn evaluate_reranked_tier(&self, chunks: &[ScoredChunk]) -> Option<RefusalReason> {
        if chunks.is_empty() {
            return Some(RefusalReason::NoChunksRetrieved);
        }

        let top_score = chunks.iter().map(|c| c.score).fold(f64::MIN, f64::max);
        if top_score < self.config.relevance_threshold {
            return Some(RefusalReason::TopBelowThreshold);
        }

        let above_threshold = chunks
            .iter()
            .filter(|c| c.score >= self.config.relevance_threshold)
            .count();
        if above_threshold < self.config.min_chunks_required {
            return Some(RefusalReason::InsufficientChunks);
        }

        None
    }

    fn evaluate_raw_tier(&self, chunks: &[ScoredChunk]) -> Option<RefusalReason> {
        if chunks.is_empty() {
            return Some(RefusalReason::NoChunksRetrieved);
        }

        let mut scores: Vec<f64> = chunks.iter().map(|c| c.score).collect();
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let top1 = scores[0];
        let top2 = scores.get(1).copied().unwrap_or(0.0);

        if top1 <= self.config.retrieval_min_score {
            return Some(RefusalReason::TopScoreTooLow);
        }

        if top2 <= 0.0 {
            // Single effective candidate: top1 > retrieval_min_score already
            // established above, so the ratio is trivially satisfied.
            return None;
        }

        if top1 / top2 < self.config.retrieval_min_ratio {
            return Some(RefusalReason::NoClearWinner);
        }

        None
    }
}
