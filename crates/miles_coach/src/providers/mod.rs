pub mod mock;
pub mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiClient;

use anyhow::Result;
use miles_core::LlmConfig;
use std::sync::Arc;

use crate::llm::LlmClient;

/// Build the configured provider.
///
/// `Ok(None)` means "openai" was requested without an `OPENAI_API_KEY`;
/// callers then run the coach offline on its fallback texts.
pub fn create_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>> {
    match config.provider.as_str() {
        "mock" => Ok(Some(Arc::new(MockProvider::new(&config.chat_model)))),
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                Ok(Some(Arc::new(OpenAiClient::from_config(config, key)?)))
            }
            _ => {
                tracing::warn!("OPENAI_API_KEY not set, coaching replies will use fallback texts");
                Ok(None)
            }
        },
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    }
}
