use std::sync::Arc;

use miles_core::{Conversation, Goal, LlmConfig, Message, Motivation};

use crate::api_types::ChatMessage;
use crate::extraction::{parse_insights, parse_milestone_titles, Insights};
use crate::llm::{CompletionParams, LlmClient};
use crate::prompts;

const INSIGHTS_TEMPERATURE: f32 = 0.3;
const UTILITY_MAX_TOKENS: u32 = 250;
const TIP_MAX_TOKENS: u32 = 100;

/// The four generation calls behind the coach persona.
///
/// None of them fail: every error path is logged and replaced by a fixed
/// fallback, so callers never see a generation error.
pub struct Coach {
    client: Option<Arc<dyn LlmClient>>,
    config: LlmConfig,
}

impl Coach {
    pub fn new(client: Arc<dyn LlmClient>, config: LlmConfig) -> Self {
        Self {
            client: Some(client),
            config,
        }
    }

    /// A coach with no generation client. Every call returns its fallback.
    pub fn offline(config: LlmConfig) -> Self {
        Self {
            client: None,
            config,
        }
    }

    pub fn from_parts(client: Option<Arc<dyn LlmClient>>, config: LlmConfig) -> Self {
        Self { client, config }
    }

    /// Whether a generation client is configured.
    pub fn is_online(&self) -> bool {
        self.client.is_some()
    }

    fn chat_params(&self) -> CompletionParams {
        CompletionParams {
            model: Some(self.config.chat_model.clone()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            json_mode: false,
        }
    }

    fn utility_params(&self, max_tokens: u32, temperature: f32, json_mode: bool) -> CompletionParams {
        CompletionParams {
            model: Some(self.config.utility_model.clone()),
            max_tokens,
            temperature,
            json_mode,
        }
    }

    /// Reply to the (already windowed) history with the user's goals and
    /// motivations in the system prompt.
    pub async fn chat_reply(
        &self,
        history: &[Message],
        goals: &[Goal],
        motivations: &[Motivation],
    ) -> String {
        let Some(client) = &self.client else {
            return prompts::FALLBACK_OFFLINE_REPLY.to_string();
        };

        let system = prompts::chat_system_prompt(goals, motivations);
        let messages: Vec<ChatMessage> = history.iter().map(ChatMessage::from).collect();

        match client
            .complete(Some(&system), messages, self.chat_params())
            .await
        {
            Ok(resp) if !resp.text.trim().is_empty() => resp.text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Empty coaching reply");
                prompts::FALLBACK_EMPTY_REPLY.to_string()
            }
            Err(e) => {
                tracing::warn!("Coaching reply failed: {:#}", e);
                prompts::FALLBACK_ERROR_REPLY.to_string()
            }
        }
    }

    pub async fn extract_insights(&self, conversation: &Conversation) -> Insights {
        let Some(client) = &self.client else {
            return Insights::default();
        };

        let prompt = prompts::insights_prompt(conversation);
        let params = self.utility_params(UTILITY_MAX_TOKENS, INSIGHTS_TEMPERATURE, true);
        match client
            .complete(None, vec![ChatMessage::user(prompt)], params)
            .await
        {
            Ok(resp) => {
                let insights = parse_insights(&resp.text);
                tracing::debug!(
                    motivations = insights.motivations.len(),
                    key_moments = insights.key_moments.len(),
                    "Extracted insights"
                );
                insights
            }
            Err(e) => {
                tracing::warn!("Insight extraction failed (non-fatal): {:#}", e);
                Insights::default()
            }
        }
    }

    pub async fn suggest_milestones(&self, title: &str, description: Option<&str>) -> Vec<String> {
        let Some(client) = &self.client else {
            return prompts::fallback_milestones();
        };

        let prompt = prompts::milestones_prompt(title, description);
        let params = self.utility_params(UTILITY_MAX_TOKENS, self.config.temperature, true);
        match client
            .complete(None, vec![ChatMessage::user(prompt)], params)
            .await
        {
            Ok(resp) => {
                let titles = parse_milestone_titles(&resp.text);
                if titles.is_empty() {
                    tracing::warn!("No milestones in suggestion response, using defaults");
                    prompts::fallback_milestones()
                } else {
                    titles
                }
            }
            Err(e) => {
                tracing::warn!("Milestone suggestion failed: {:#}", e);
                prompts::fallback_milestones()
            }
        }
    }

    pub async fn coaching_tip(&self, goals: &[Goal], mood: Option<&str>) -> String {
        let Some(client) = &self.client else {
            return prompts::FALLBACK_TIP.to_string();
        };

        let prompt = prompts::tip_prompt(goals, mood);
        let params = self.utility_params(TIP_MAX_TOKENS, self.config.temperature, false);
        match client
            .complete(None, vec![ChatMessage::user(prompt)], params)
            .await
        {
            Ok(resp) if !resp.text.trim().is_empty() => resp.text.trim().to_string(),
            Ok(_) => prompts::FALLBACK_EMPTY_TIP.to_string(),
            Err(e) => {
                tracing::warn!("Coaching tip failed: {:#}", e);
                prompts::FALLBACK_TIP.to_string()
            }
        }
    }
}
