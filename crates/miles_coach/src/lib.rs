//! Coaching layer: the generation-API seam and the services built on it.
//!
//! Services are plain structs wired with an `Arc<dyn Store>` and an
//! `Arc<Coach>`; swap either for a fake in tests.

pub mod api_types;
pub mod chat;
pub mod coach;
pub mod extraction;
pub mod goals;
pub mod llm;
pub mod profiles;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod rituals;

pub use chat::{ChatService, SendOutcome};
pub use coach::Coach;
pub use extraction::Insights;
pub use goals::GoalService;
pub use llm::{CompletionParams, LlmClient};
pub use profiles::ProfileService;
pub use rituals::{RitualDay, RitualService};

use miles_core::{CoachError, CoachResult};

/// Log a storage failure and collapse it into a fixed service error.
pub(crate) trait OrBackend<T> {
    fn or_backend(self, message: &'static str) -> CoachResult<T>;
}

impl<T> OrBackend<T> for anyhow::Result<T> {
    fn or_backend(self, message: &'static str) -> CoachResult<T> {
        self.map_err(|e| {
            tracing::error!("{}: {:#}", message, e);
            CoachError::Backend(message)
        })
    }
}
