use crate::api_types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionResponse, ResponseFormat,
};
use crate::llm::{CompletionParams, LlmClient};
use crate::retry::{with_retry, RetryConfig};
use anyhow::{Context, Result};
use miles_core::{LlmConfig, Role};
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client")?,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn from_config(config: &LlmConfig, api_key: String) -> Result<Self> {
        Self::new(
            api_key,
            config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            &config.chat_model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    #[tracing::instrument(skip_all, fields(model = tracing::field::Empty))]
    async fn complete(
        &self,
        system: Option<&str>,
        messages: Vec<ChatMessage>,
        params: CompletionParams,
    ) -> Result<CompletionResponse> {
        let model = params.model.as_deref().unwrap_or(&self.model);
        tracing::Span::current().record("model", model);

        // System prompt travels as the first message.
        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            all_messages.push(ChatMessage {
                role: Role::System,
                content: system.to_string(),
            });
        }
        all_messages.extend(messages);

        let request = ChatCompletionRequest {
            model,
            messages: all_messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            response_format: params.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = with_retry(&self.retry, "OpenAI", || async {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .context("Failed to send request to OpenAI")
        })
        .await?;

        let body: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to decode OpenAI response")?;
        let Some(choice) = body.choices.into_iter().next() else {
            anyhow::bail!("OpenAI response contained no choices");
        };

        Ok(CompletionResponse {
            text: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }
}
