//! Token-budget-aware greedy packing of reranked chunks into the context
//! window reserved for the answer-generation call.

use crate::config::BudgetConfig;
use crate::llm::prompts::format_chunk_for_context;
use crate::model::{Chunk, ScoredChunk};
use crate::tokenizer::Tokenizer;

/// Packing statistics returned alongside the kept chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetInfo {
    /// Number of chunks kept.
    pub kept_count: usize,
    /// Number of chunks dropped because they didn't fit.
    pub dropped_count: usize,
    /// Total tokens consumed by the kept chunks.
    pub total_tokens: u32,
    /// Whether `total_tokens` is within the available budget (always true by construction).
    pub under_budget: bool,
}

/// Greedily packs chunks into the available context budget.
pub struct Budgeter {
    config: BudgetConfig,
}

impl Budgeter {
    /// Builds a budgeter from configuration.
    #[must_use]
    pub const fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    /// Packs `chunks` into the available budget after reserving space for the
    /// system prompt, QA template, answer buffer, and the question itself.
    pub fn enforce_budget(
        &self,
        chunks: &[ScoredChunk],
        tokenizer: &dyn Tokenizer,
        question: &str,
    ) -> (Vec<Chunk>, BudgetInfo) {
        let question_tokens = u32::try_from(tokenizer.count(question)).unwrap_or(u32::MAX);
        let reserved = self.config.system_prompt_tokens
            + self.config.qa_template_tokens
            + self.config.answer_buffer_tokens
            + question_tokens;
        let available = self.config.max_context_tokens.saturating_sub(reserved);

        let mut sorted: Vec<&ScoredChunk> = chunks.iter().collect();
        sorted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.token_count.cmp(&b.chunk.token_count))
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });

        let mut kept = Vec::new();
        let mut running_total: u32 = 0;
        let mut dropped = 0usize;

        for scored in sorted {
            let formatted = format_chunk_for_context(&scored.chunk);
            let chunk_tokens = u32::try_from(tokenizer.count(&formatted)).unwrap_or(u32::MAX);
            if running_total.saturating_add(chunk_tokens) <= available {
                running_total += chunk_tokens;
                kept.push(scored.chunk.clone());
            } else {
                dropped += 1;
            }
        }

        let info = BudgetInfo {
            kept_count: kept.len(),
            dropped_count: dropped,
            total_tokens: running_total,
            under_budget: running_total <= available,
        };

        (kept, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreKind;
    use crate::tokenizer::ApproximateTokenizer;

    fn chunk(id: &str, tokens: u32, score: f64) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                chunk_id: id.to_string(),
                source: "cme".to_string(),
                document_path: "doc.pdf".to_string(),
                section: None,
                page_start: 1,
                page_end: 1,
                text: "x".repeat(tokens as usize * 4),
                token_count: tokens,
                is_definitions: false,
                relative_path: None,
                word_count: None,
            },
            score,
            score_kind: ScoreKind::Rerank,
            rerank_failed: false,
            explanation: None,
        }
    }

    #[test]
    fn packs_everything_when_under_budget() {
        let budgeter = Budgeter::new(BudgetConfig::default());
        let chunks = vec![chunk("a", 100, 3.0), chunk("b", 200, 2.0)];
        let (kept, info) = budgeter.enforce_budget(&chunks, &ApproximateTokenizer, "question");
        assert_eq!(kept.len(), 2);
        assert_eq!(info.dropped_count, 0);
    }

    #[test]
    fn skips_oversized_chunk_but_continues_packing() {
        let config = BudgetConfig {
            max_context_tokens: 1000,
            system_prompt_tokens: 0,
            qa_template_tokens: 0,
            answer_buffer_tokens: 0,
        };
        let budgeter = Budgeter::new(config);
        // "huge" sorts first by score but doesn't fit; "small" should still pack.
        let chunks = vec![chunk("huge", 2000, 3.0), chunk("small", 100, 2.0)];
        let (kept, info) = budgeter.enforce_budget(&chunks, &ApproximateTokenizer, "");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "small");
        assert_eq!(info.dropped_count, 1);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let budgeter = Budgeter::new(BudgetConfig::default());
        let (kept, info) = budgeter.enforce_budget(&[], &ApproximateTokenizer, "question");
        assert!(kept.is_empty());
        assert_eq!(info.kept_count, 0);
    }
}
