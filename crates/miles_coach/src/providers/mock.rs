//! Mock LLM provider: deterministic responses for running without API keys.

use crate::api_types::{ChatMessage, CompletionResponse};
use crate::llm::{CompletionParams, LlmClient};
use anyhow::Result;

const MOCK_JSON: &str = r#"{"motivations": [], "keyMoments": [], "milestones": ["Define the first small step", "Practice three times this week", "Review progress with Miles"]}"#;

#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockProvider {
    async fn complete(
        &self,
        _system: Option<&str>,
        messages: Vec<ChatMessage>,
        params: CompletionParams,
    ) -> Result<CompletionResponse> {
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        let text = if params.json_mode {
            MOCK_JSON.to_string()
        } else {
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            format!(
                "(Mock {} Response) I hear you: \"{}\". What's one small step you can take today?",
                params.model.as_deref().unwrap_or(&self.model),
                last.chars().take(60).collect::<String>()
            )
        };
        Ok(CompletionResponse {
            text,
            finish_reason: Some("stop".to_string()),
        })
    }
}
