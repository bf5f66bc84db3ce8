use std::sync::Arc;

use chrono::{DateTime, Utc};
use miles_core::validate::require_text;
use miles_core::{
    generate_id, now_millis, recent_messages, CoachError, CoachResult, CoachingConfig,
    Conversation, ConversationPatch, Goal, Message, Motivation, Page, Role,
};
use miles_store::Store;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::coach::Coach;
use crate::prompts::WELCOME_MESSAGE;
use crate::OrBackend;

pub const DEFAULT_CONVERSATION_PAGE: usize = 10;

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub conversation: Conversation,
    pub reply: String,
}

/// Conversations with the coach persona, plus the motivations inferred
/// from them.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn Store>,
    coach: Arc<Coach>,
    config: CoachingConfig,
    /// Insight extraction started by `send_message`, shared by clones.
    background: Arc<Mutex<JoinSet<()>>>,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>, coach: Arc<Coach>) -> Self {
        Self::with_config(store, coach, CoachingConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, coach: Arc<Coach>, config: CoachingConfig) -> Self {
        Self {
            store,
            coach,
            config,
            background: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// A new conversation opened by the coach's welcome message.
    pub async fn create_conversation(&self, owner_id: &str) -> CoachResult<Conversation> {
        let now = now_millis();
        let conversation = Conversation {
            id: generate_id()?,
            owner_id: owner_id.to_string(),
            messages: vec![Message::new(Role::Assistant, WELCOME_MESSAGE, now)],
            created_at: now,
            updated_at: now,
        };
        self.store
            .create_conversation(&conversation)
            .await
            .or_backend("Failed to create conversation")?;
        tracing::info!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: &str) -> CoachResult<Option<Conversation>> {
        self.store
            .get_conversation(id)
            .await
            .or_backend("Failed to fetch conversation")
    }

    pub async fn latest_conversation(&self, owner_id: &str) -> CoachResult<Option<Conversation>> {
        let mut latest = self
            .store
            .list_conversations(owner_id, Page::first(1))
            .await
            .or_backend("Failed to fetch conversations")?;
        Ok(latest.pop())
    }

    /// The most recently active conversation, created on first use.
    pub async fn open_conversation(&self, owner_id: &str) -> CoachResult<Conversation> {
        match self.latest_conversation(owner_id).await? {
            Some(conversation) => Ok(conversation),
            None => self.create_conversation(owner_id).await,
        }
    }

    /// Newest-updated first. Pass the `updated_at` of the last conversation
    /// of a page as `after` to fetch the next one.
    pub async fn list_conversations(
        &self,
        owner_id: &str,
        page_size: Option<usize>,
        after: Option<DateTime<Utc>>,
    ) -> CoachResult<Vec<Conversation>> {
        let page = Page {
            limit: Some(page_size.unwrap_or(DEFAULT_CONVERSATION_PAGE)),
            after,
        };
        self.store
            .list_conversations(owner_id, page)
            .await
            .or_backend("Failed to fetch conversations")
    }

    /// One chat turn.
    ///
    /// The user message is persisted before the coach is asked, so it
    /// survives a failed reply. Insight extraction runs in the background
    /// once the reply is stored; see [`Self::wait_for_insights`].
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        goals: &[Goal],
        motivations: &[Motivation],
    ) -> CoachResult<SendOutcome> {
        require_text("message content", content)?;

        let mut conversation = self
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| CoachError::not_found("conversation", conversation_id))?;

        let now = now_millis();
        conversation
            .messages
            .push(Message::new(Role::User, content, now));
        self.save_messages(&mut conversation, now).await?;

        let history = recent_messages(&conversation.messages, self.config.history_window);
        let reply = self.coach.chat_reply(history, goals, motivations).await;

        let replied_at = now_millis();
        conversation
            .messages
            .push(Message::new(Role::Assistant, reply.clone(), replied_at));
        self.save_messages(&mut conversation, replied_at).await?;

        let svc = self.clone();
        let snapshot = conversation.clone();
        let mut background = self.background.lock().await;
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            if let Err(e) = svc.process_insights(&snapshot).await {
                tracing::warn!(conversation_id = %snapshot.id, "Insight processing failed: {}", e);
            }
        });
        drop(background);

        Ok(SendOutcome {
            conversation,
            reply,
        })
    }

    /// Wait for every background insight task started so far. Call before
    /// shutting down so pending motivations are not lost.
    pub async fn wait_for_insights(&self) {
        let mut background = self.background.lock().await;
        while let Some(result) = background.join_next().await {
            if let Err(e) = result {
                tracing::warn!("Insight task did not finish: {}", e);
            }
        }
    }

    /// Extract motivations from a conversation and store the usable ones.
    ///
    /// Short conversations are skipped. Returns what was stored.
    pub async fn process_insights(&self, conversation: &Conversation) -> CoachResult<Vec<Motivation>> {
        if conversation.messages.len() < self.config.insight_min_messages {
            return Ok(Vec::new());
        }

        let insights = self.coach.extract_insights(conversation).await;
        if insights.is_empty() {
            return Ok(Vec::new());
        }
        if !insights.key_moments.is_empty() {
            tracing::debug!(
                conversation_id = %conversation.id,
                key_moments = ?insights.key_moments,
                "Key moments"
            );
        }

        let now = now_millis();
        let mut stored = Vec::new();
        for text in insights.usable_motivations(self.config.min_motivation_len) {
            let motivation = Motivation {
                id: generate_id()?,
                owner_id: conversation.owner_id.clone(),
                text: text.to_string(),
                category: None,
                created_at: now,
            };
            self.store
                .create_motivation(&motivation)
                .await
                .or_backend("Failed to save motivation")?;
            stored.push(motivation);
        }
        if !stored.is_empty() {
            tracing::info!(owner_id = %conversation.owner_id, count = stored.len(), "Motivations saved");
        }
        Ok(stored)
    }

    /// Newest first.
    pub async fn list_motivations(&self, owner_id: &str) -> CoachResult<Vec<Motivation>> {
        self.store
            .list_motivations(owner_id, Page::all())
            .await
            .or_backend("Failed to fetch motivations")
    }

    pub async fn coaching_tip(&self, goals: &[Goal], mood: Option<&str>) -> String {
        self.coach.coaching_tip(goals, mood).await
    }

    async fn save_messages(
        &self,
        conversation: &mut Conversation,
        now: DateTime<Utc>,
    ) -> CoachResult<()> {
        let patch = ConversationPatch {
            messages: Some(conversation.messages.clone()),
            updated_at: Some(now),
        };
        let updated = self
            .store
            .update_conversation(&conversation.id, &patch)
            .await
            .or_backend("Failed to send message")?;
        if updated.is_none() {
            return Err(CoachError::not_found("conversation", conversation.id.clone()));
        }
        conversation.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miles_core::LlmConfig;
    use miles_store::DocumentStore;

    fn offline() -> ChatService {
        ChatService::new(
            Arc::new(DocumentStore::new()),
            Arc::new(Coach::offline(LlmConfig::default())),
        )
    }

    #[tokio::test]
    async fn test_new_conversation_has_welcome() {
        let svc = offline();
        let conversation = svc.create_conversation("alice").await.unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::Assistant);
        assert_eq!(conversation.messages[0].content, WELCOME_MESSAGE);
    }

    #[tokio::test]
    async fn test_open_conversation_is_lazy_and_stable() {
        let svc = offline();
        assert!(svc.latest_conversation("alice").await.unwrap().is_none());
        let first = svc.open_conversation("alice").await.unwrap();
        let second = svc.open_conversation("alice").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_blank_message_rejected_and_nothing_stored() {
        let svc = offline();
        let conversation = svc.create_conversation("alice").await.unwrap();
        let err = svc
            .send_message(&conversation.id, "   ", &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Validation(_)));
        let stored = svc.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_send_stores_both_turns() {
        let svc = offline();
        let conversation = svc.create_conversation("alice").await.unwrap();
        let outcome = svc
            .send_message(&conversation.id, "I want to sleep better", &[], &[])
            .await
            .unwrap();
        assert_eq!(outcome.reply, crate::prompts::FALLBACK_OFFLINE_REPLY);
        assert_eq!(outcome.conversation.messages.len(), 3);

        let stored = svc.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(stored, outcome.conversation);
    }

    #[tokio::test]
    async fn test_send_to_missing_conversation() {
        let svc = offline();
        let err = svc.send_message("nope", "hello", &[], &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_insights_skipped_for_short_conversations() {
        let svc = offline();
        let conversation = svc.create_conversation("alice").await.unwrap();
        assert!(svc.process_insights(&conversation).await.unwrap().is_empty());
    }
}
