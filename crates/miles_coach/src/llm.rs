use crate::api_types::{ChatMessage, CompletionResponse};
use anyhow::Result;
use async_trait::async_trait;

/// Per-call generation settings.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    /// Overrides the provider's default model when set.
    pub model: Option<String>,
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Ask the provider for a single JSON object.
    pub json_mode: bool,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 500,
            temperature: 0.7,
            json_mode: false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion. `system` is prepended as a system-role message.
    async fn complete(
        &self,
        system: Option<&str>,
        messages: Vec<ChatMessage>,
        params: CompletionParams,
    ) -> Result<CompletionResponse>;
}
