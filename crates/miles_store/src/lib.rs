//! Persistence for users, goals, conversations, motivations and ritual
//! completions.
//!
//! One [`Store`] interface, two backends with different native shapes:
//! [`DocumentStore`] keeps camelCase JSON documents with epoch-millisecond
//! timestamps, [`SqliteStore`] keeps snake_case rows with ISO-8601 text
//! timestamps. Both report a missing entity as `Ok(None)`.

pub mod document;
pub mod sqlite;

pub use document::DocumentStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miles_core::{
    Conversation, ConversationPatch, Goal, GoalPatch, Motivation, MotivationPatch, Page,
    RitualCompletion, UserPatch, UserProfile,
};

/// Collection/table names shared by both backends.
pub mod collections {
    pub const USERS: &str = "users";
    pub const GOALS: &str = "goals";
    pub const CONVERSATIONS: &str = "conversations";
    pub const MOTIVATIONS: &str = "user_motivations";
    pub const RITUALS: &str = "ritual_completions";
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    // --- users ---
    async fn create_user(&self, user: &UserProfile) -> Result<()>;
    async fn get_user(&self, id: &str) -> Result<Option<UserProfile>>;
    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<UserProfile>>;
    async fn delete_user(&self, id: &str) -> Result<()>;

    // --- goals (listed by updated_at, newest first) ---
    async fn create_goal(&self, goal: &Goal) -> Result<()>;
    async fn get_goal(&self, id: &str) -> Result<Option<Goal>>;
    async fn list_goals(&self, owner_id: &str, page: Page) -> Result<Vec<Goal>>;
    async fn update_goal(&self, id: &str, patch: &GoalPatch) -> Result<Option<Goal>>;
    async fn delete_goal(&self, id: &str) -> Result<()>;

    // --- conversations (listed by updated_at, newest first) ---
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;
    async fn list_conversations(&self, owner_id: &str, page: Page) -> Result<Vec<Conversation>>;
    async fn update_conversation(
        &self,
        id: &str,
        patch: &ConversationPatch,
    ) -> Result<Option<Conversation>>;
    async fn delete_conversation(&self, id: &str) -> Result<()>;

    // --- motivations (listed by created_at, newest first) ---
    async fn create_motivation(&self, motivation: &Motivation) -> Result<()>;
    async fn get_motivation(&self, id: &str) -> Result<Option<Motivation>>;
    async fn list_motivations(&self, owner_id: &str, page: Page) -> Result<Vec<Motivation>>;
    async fn update_motivation(
        &self,
        id: &str,
        patch: &MotivationPatch,
    ) -> Result<Option<Motivation>>;
    async fn delete_motivation(&self, id: &str) -> Result<()>;

    // --- ritual completions (append-only, newest first) ---
    async fn record_ritual(&self, completion: &RitualCompletion) -> Result<()>;
    /// Completions with `completed_at >= since`.
    async fn list_rituals_since(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RitualCompletion>>;
}

#[cfg(test)]
mod tests;
