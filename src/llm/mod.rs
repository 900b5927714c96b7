//! LLM collaborator (§6.1): a single `complete(system, user, opts)` call
//! used by both the Reranker and the `AnswerGenerator`.

pub mod openai;
pub mod prompts;

use crate::error::LlmError;
use async_trait::async_trait;
use std::time::Duration;

/// Per-call generation options.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    /// Sampling temperature; the pipeline always uses `0.0`.
    pub temperature: f32,
    /// Hard cap on completion tokens.
    pub max_output_tokens: u32,
    /// Wall-clock timeout for the call.
    pub timeout: Duration,
}

impl CompletionOptions {
    /// Deterministic, short-output options used by the reranker.
    #[must_use]
    pub const fn rerank(max_output_tokens: u32, timeout: Duration) -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens,
            timeout,
        }
    }

    /// Deterministic, long-output options used by the answer generator.
    #[must_use]
    pub const fn answer(timeout: Duration) -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: 2048,
            timeout,
        }
    }
}

/// A completed LLM call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The model's text output.
    pub text: String,
    /// Prompt tokens billed, as reported by the provider.
    pub input_tokens: u32,
    /// Completion tokens billed, as reported by the provider.
    pub output_tokens: u32,
}

/// The single LLM entry point the pipeline depends on. Kept narrow so a
/// deterministic stub can stand in for tests without a network call.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issues one chat completion call and awaits its result or timeout.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: CompletionOptions,
    ) -> Result<LlmResponse, LlmError>;
}
