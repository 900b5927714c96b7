//! Grounded answer generation: a single LLM call constrained to a strict
//! output contract and forbidden from using outside knowledge.

use crate::error::LlmError;
use crate::llm::prompts::{build_answer_prompt, PromptSet};
use crate::llm::{CompletionOptions, LlmClient};
use crate::model::{Chunk, Definition};
use std::time::Duration;

/// Result of one answer-generation call.
#[derive(Debug, Clone)]
pub struct AnswerOutput {
    /// Rendered answer text, following the §4.7 output contract.
    pub answer_text: String,
    /// Prompt tokens billed.
    pub input_tokens: u32,
    /// Completion tokens billed.
    pub output_tokens: u32,
}

/// Generates a grounded answer from kept chunks and linked definitions.
pub struct AnswerGenerator {
    llm: std::sync::Arc<dyn LlmClient>,
    prompts: std::sync::Arc<PromptSet>,
    timeout: Duration,
}

impl AnswerGenerator {
    /// Builds a generator over the given LLM client and prompt set.
    #[must_use]
    pub const fn new(llm: std::sync::Arc<dyn LlmClient>, prompts: std::sync::Arc<PromptSet>, timeout: Duration) -> Self {
        Self { llm, prompts, timeout }
    }

    /// Issues the single grounded answer-generation call.
    ///
    /// # Errors
    /// Propagates the LLM collaborator's error verbatim; callers convert it
    /// into `Error::UpstreamLlm`/`Error::TimedOut`.
    pub async fn generate(
        &self,
        question: &str,
        kept_chunks: &[Chunk],
        definitions: &[Definition],
        refusal_string: &str,
    ) -> Result<AnswerOutput, LlmError> {
        let system_prompt = self.prompts.answer_system(refusal_string);
        let user_prompt = build_answer_prompt(question, kept_chunks, definitions);
        let options = CompletionOptions::answer(self.timeout);

        let response = self.llm.complete(&system_prompt, &user_prompt, options).await?;

        Ok(AnswerOutput {
            answer_text: response.text,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;

    struct StubLlm {
        response: String,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _options: CompletionOptions,
        ) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                text: self.response.clone(),
                input_tokens: 42,
                output_tokens: 7,
            })
        }
    }

    #[tokio::test]
    async fn generate_returns_stub_text_and_token_counts() {
        let llm = std::sync::Arc::new(StubLlm {
            response: "## Answer\nYes.".to_string(),
        });
        let prompts = std::sync::Arc::new(PromptSet::load(None, false));
        let generator = AnswerGenerator::new(llm, prompts, Duration::from_secs(1));

        let output = generator
            .generate("Can this be terminated?", &[], &[], "This is not addressed in the provided CME documents.")
            .await
            .unwrap();

        assert_eq!(output.answer_text, "## Answer\nYes.");
        assert_eq!(output.input_tokens, 42);
        assert_eq!(output.output_tokens, 7);
    }
}
