//! `async-openai`-backed `LlmClient`, used for both the reranker and the
//! answer generator. Also serves any OpenAI-API-compatible endpoint (Azure,
//! local gateways) by overriding the base URL.

use crate::error::LlmError;
use crate::llm::{CompletionOptions, LlmClient, LlmResponse};
use async_openai::Client;
use async_openai::config::OpenAIConfig as AsyncOpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;

/// Connection settings for the OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key (or a placeholder for local gateways that ignore it).
    pub api_key: String,
    /// Overrides the default `api.openai.com` base URL, for Azure/local gateways.
    pub base_url: Option<String>,
    /// Chat model name.
    pub model: String,
}

impl OpenAiConfig {
    /// Builds configuration from `OPENAI_API_KEY`/`OPENAI_BASE_URL`/`OPENAI_MODEL`,
    /// defaulting the model to `gpt-4o-mini`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        }
    }
}

/// Concrete `LlmClient` backed by `async-openai`.
pub struct OpenAiClient {
    client: Client<AsyncOpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    /// Builds a client from the given configuration.
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        let mut openai_config = AsyncOpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
            model: config.model,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: CompletionOptions,
    ) -> Result<LlmResponse, LlmError> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(user_prompt)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(options.temperature)
            .max_tokens(options.max_output_tokens)
            .messages(vec![system_message.into(), user_message.into()])
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let response = tokio::time::timeout(options.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(convert_error)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("no choices in completion response".to_string()))?;

        let text = choice.message.content.unwrap_or_default();
        let usage = response.usage;

        Ok(LlmResponse {
            text,
            input_tokens: usage.as_ref().map_or(0, |u| u.prompt_tokens),
            output_tokens: usage.as_ref().map_or(0, |u| u.completion_tokens),
        })
    }
}

fn convert_error(err: async_openai::error::OpenAIError) -> LlmError {
    match err {
        async_openai::error::OpenAIError::ApiError(api_err) if api_err.message.contains("rate limit") => {
            LlmError::RateLimited
        }
        async_openai::error::OpenAIError::Reqwest(e) if e.is_timeout() => LlmError::Timeout,
        other => LlmError::Transport(other.to_string()),
    }
}
