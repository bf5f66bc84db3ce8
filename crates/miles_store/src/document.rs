//! Document-shaped backend.
//!
//! Each collection is a map of id -> JSON document. Documents use camelCase
//! keys, a `userId` owner field and epoch-millisecond integer timestamps.
//! Updates merge top-level keys into the stored document, the way a
//! document database's partial update does.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use miles_core::validate::{parse_millis, parse_progress, parse_role};
use miles_core::{
    Conversation, ConversationPatch, Goal, GoalPatch, Message, Milestone, Motivation,
    MotivationPatch, Page, RitualCompletion, RitualKind, UserPatch, UserProfile,
};

use crate::collections::{CONVERSATIONS, GOALS, MOTIVATIONS, RITUALS, USERS};
use crate::Store;

// ============================================================================
// Document shapes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDoc {
    user_id: String,
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    created_at: i64,
    last_login: i64,
    #[serde(default)]
    is_onboarded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MilestoneDoc {
    id: String,
    title: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    progress: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoalDoc {
    id: String,
    user_id: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    milestones: Vec<MilestoneDoc>,
    #[serde(default)]
    progress: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDoc {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationDoc {
    id: String,
    user_id: String,
    messages: Vec<MessageDoc>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MotivationDoc {
    id: String,
    user_id: String,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RitualDoc {
    id: String,
    user_id: String,
    ritual_type: String,
    completed_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reflection: Option<String>,
}

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn opt_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(millis)
}

fn parse_opt_millis(raw: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    raw.map(parse_millis).transpose()
}

// --- domain -> document ---

impl From<&UserProfile> for UserDoc {
    fn from(u: &UserProfile) -> Self {
        Self {
            user_id: u.id.clone(),
            email: u.email.clone(),
            display_name: u.display_name.clone(),
            created_at: millis(u.created_at),
            last_login: millis(u.last_login),
            is_onboarded: u.is_onboarded,
        }
    }
}

impl From<&Milestone> for MilestoneDoc {
    fn from(m: &Milestone) -> Self {
        Self {
            id: m.id.clone(),
            title: m.title.clone(),
            completed: m.completed,
            progress: m.progress as i64,
            created_at: opt_millis(m.created_at),
            updated_at: opt_millis(m.updated_at),
        }
    }
}

impl From<&Goal> for GoalDoc {
    fn from(g: &Goal) -> Self {
        Self {
            id: g.id.clone(),
            user_id: g.owner_id.clone(),
            title: g.title.clone(),
            description: g.description.clone(),
            milestones: g.milestones.iter().map(MilestoneDoc::from).collect(),
            progress: g.progress as i64,
            created_at: millis(g.created_at),
            updated_at: millis(g.updated_at),
        }
    }
}

impl From<&Message> for MessageDoc {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            timestamp: opt_millis(m.timestamp),
        }
    }
}

impl From<&Conversation> for ConversationDoc {
    fn from(c: &Conversation) -> Self {
        Self {
            id: c.id.clone(),
            user_id: c.owner_id.clone(),
            messages: c.messages.iter().map(MessageDoc::from).collect(),
            created_at: millis(c.created_at),
            updated_at: millis(c.updated_at),
        }
    }
}

impl From<&Motivation> for MotivationDoc {
    fn from(m: &Motivation) -> Self {
        Self {
            id: m.id.clone(),
            user_id: m.owner_id.clone(),
            text: m.text.clone(),
            category: m.category.clone(),
            created_at: millis(m.created_at),
        }
    }
}

impl From<&RitualCompletion> for RitualDoc {
    fn from(r: &RitualCompletion) -> Self {
        Self {
            id: r.id.clone(),
            user_id: r.owner_id.clone(),
            ritual_type: r.kind.as_str().to_string(),
            completed_at: millis(r.completed_at),
            reflection: r.reflection.clone(),
        }
    }
}

// --- document -> domain (validated) ---

impl TryFrom<UserDoc> for UserProfile {
    type Error = anyhow::Error;
    fn try_from(d: UserDoc) -> Result<Self> {
        Ok(Self {
            id: d.user_id,
            email: d.email,
            display_name: d.display_name,
            created_at: parse_millis(d.created_at)?,
            last_login: parse_millis(d.last_login)?,
            is_onboarded: d.is_onboarded,
        })
    }
}

impl TryFrom<MilestoneDoc> for Milestone {
    type Error = anyhow::Error;
    fn try_from(d: MilestoneDoc) -> Result<Self> {
        Ok(Self {
            progress: parse_progress(d.progress)
                .with_context(|| format!("milestone {}", d.id))?,
            created_at: parse_opt_millis(d.created_at)?,
            updated_at: parse_opt_millis(d.updated_at)?,
            id: d.id,
            title: d.title,
            completed: d.completed,
        })
    }
}

impl TryFrom<GoalDoc> for Goal {
    type Error = anyhow::Error;
    fn try_from(d: GoalDoc) -> Result<Self> {
        Ok(Self {
            milestones: d
                .milestones
                .into_iter()
                .map(Milestone::try_from)
                .collect::<Result<_>>()?,
            progress: parse_progress(d.progress)?,
            created_at: parse_millis(d.created_at)?,
            updated_at: parse_millis(d.updated_at)?,
            id: d.id,
            owner_id: d.user_id,
            title: d.title,
            description: d.description,
        })
    }
}

impl TryFrom<MessageDoc> for Message {
    type Error = anyhow::Error;
    fn try_from(d: MessageDoc) -> Result<Self> {
        Ok(Self {
            role: parse_role(&d.role)?,
            content: d.content,
            timestamp: parse_opt_millis(d.timestamp)?,
        })
    }
}

impl TryFrom<ConversationDoc> for Conversation {
    type Error = anyhow::Error;
    fn try_from(d: ConversationDoc) -> Result<Self> {
        Ok(Self {
            messages: d
                .messages
                .into_iter()
                .map(Message::try_from)
                .collect::<Result<_>>()?,
            created_at: parse_millis(d.created_at)?,
            updated_at: parse_millis(d.updated_at)?,
            id: d.id,
            owner_id: d.user_id,
        })
    }
}

impl TryFrom<MotivationDoc> for Motivation {
    type Error = anyhow::Error;
    fn try_from(d: MotivationDoc) -> Result<Self> {
        Ok(Self {
            created_at: parse_millis(d.created_at)?,
            id: d.id,
            owner_id: d.user_id,
            text: d.text,
            category: d.category,
        })
    }
}

impl TryFrom<RitualDoc> for RitualCompletion {
    type Error = anyhow::Error;
    fn try_from(d: RitualDoc) -> Result<Self> {
        let kind = RitualKind::parse_str(&d.ritual_type)
            .with_context(|| format!("Unknown ritual type: {}", d.ritual_type))?;
        Ok(Self {
            completed_at: parse_millis(d.completed_at)?,
            id: d.id,
            owner_id: d.user_id,
            kind,
            reflection: d.reflection,
        })
    }
}

// --- patches -> partial documents ---

fn user_patch_fields(p: &UserPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(v) = &p.email {
        fields.insert("email".into(), Value::from(v.clone()));
    }
    if let Some(v) = &p.display_name {
        fields.insert("displayName".into(), Value::from(v.clone()));
    }
    if let Some(v) = p.last_login {
        fields.insert("lastLogin".into(), Value::from(millis(v)));
    }
    if let Some(v) = p.is_onboarded {
        fields.insert("isOnboarded".into(), Value::from(v));
    }
    fields
}

fn goal_patch_fields(p: &GoalPatch) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    if let Some(v) = &p.title {
        fields.insert("title".into(), Value::from(v.clone()));
    }
    if let Some(v) = &p.description {
        fields.insert("description".into(), Value::from(v.clone()));
    }
    if let Some(v) = &p.milestones {
        let docs: Vec<MilestoneDoc> = v.iter().map(MilestoneDoc::from).collect();
        fields.insert("milestones".into(), serde_json::to_value(docs)?);
    }
    if let Some(v) = p.progress {
        fields.insert("progress".into(), Value::from(v as i64));
    }
    if let Some(v) = p.updated_at {
        fields.insert("updatedAt".into(), Value::from(millis(v)));
    }
    Ok(fields)
}

fn conversation_patch_fields(p: &ConversationPatch) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    if let Some(v) = &p.messages {
        let docs: Vec<MessageDoc> = v.iter().map(MessageDoc::from).collect();
        fields.insert("messages".into(), serde_json::to_value(docs)?);
    }
    if let Some(v) = p.updated_at {
        fields.insert("updatedAt".into(), Value::from(millis(v)));
    }
    Ok(fields)
}

fn motivation_patch_fields(p: &MotivationPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(v) = &p.text {
        fields.insert("text".into(), Value::from(v.clone()));
    }
    if let Some(v) = &p.category {
        fields.insert("category".into(), Value::from(v.clone()));
    }
    fields
}

// ============================================================================
// Store
// ============================================================================

type Collection = BTreeMap<String, Value>;

/// In-process document database.
#[derive(Default)]
pub struct DocumentStore {
    collections: RwLock<HashMap<&'static str, Collection>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn put<T: Serialize>(&self, collection: &'static str, id: &str, doc: &T) -> Result<()> {
        let value = serde_json::to_value(doc)
            .with_context(|| format!("Failed to encode {} document {}", collection, id))?;
        let mut collections = self.collections.write().await;
        collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), value);
        tracing::debug!("Stored {}/{}", collection, id);
        Ok(())
    }

    async fn fetch<D, T>(&self, collection: &'static str, id: &str) -> Result<Option<T>>
    where
        D: DeserializeOwned,
        T: TryFrom<D, Error = anyhow::Error>,
    {
        let raw = {
            let collections = self.collections.read().await;
            collections.get(collection).and_then(|c| c.get(id)).cloned()
        };
        match raw {
            Some(value) => Ok(Some(decode::<D, T>(collection, id, value)?)),
            None => Ok(None),
        }
    }

    /// Owner query ordered by `order_key` descending. Documents that fail to
    /// decode are logged and skipped so one bad record does not hide the rest.
    async fn query_owner<D, T>(
        &self,
        collection: &'static str,
        owner_id: &str,
        order_key: &str,
        page: Page,
    ) -> Result<Vec<T>>
    where
        D: DeserializeOwned,
        T: TryFrom<D, Error = anyhow::Error>,
    {
        let mut matching: Vec<(i64, String, Value)> = {
            let collections = self.collections.read().await;
            collections
                .get(collection)
                .map(|c| {
                    c.iter()
                        .filter(|(_, doc)| doc.get("userId").and_then(Value::as_str) == Some(owner_id))
                        .map(|(id, doc)| {
                            let key = doc.get(order_key).and_then(Value::as_i64).unwrap_or(0);
                            (key, id.clone(), doc.clone())
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        matching.sort_by(|a, b| b.0.cmp(&a.0));

        let cursor = page.after.map(millis);
        let limit = page.limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for (key, id, doc) in matching {
            if out.len() >= limit {
                break;
            }
            if cursor.is_some_and(|c| key >= c) {
                continue;
            }
            match decode::<D, T>(collection, &id, doc) {
                Ok(item) => out.push(item),
                Err(e) => tracing::warn!("Skipping invalid {} document {}: {:#}", collection, id, e),
            }
        }
        Ok(out)
    }

    /// Merge `fields` into an existing document. `Ok(None)` if it is absent.
    /// The merged document must still decode; otherwise the stored one is
    /// left as it was.
    async fn merge<D, T>(
        &self,
        collection: &'static str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Option<T>>
    where
        D: DeserializeOwned,
        T: TryFrom<D, Error = anyhow::Error>,
    {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections.get_mut(collection).and_then(|c| c.get_mut(id)) else {
            return Ok(None);
        };
        let mut merged = doc.clone();
        let Some(obj) = merged.as_object_mut() else {
            anyhow::bail!("{} document {} is not an object", collection, id);
        };
        for (k, v) in fields {
            obj.insert(k, v);
        }
        let item = decode::<D, T>(collection, id, merged.clone())?;
        *doc = merged;
        tracing::debug!("Merged update into {}/{}", collection, id);
        Ok(Some(item))
    }

    async fn remove(&self, collection: &'static str, id: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(c) = collections.get_mut(collection) {
            c.remove(id);
        }
        Ok(())
    }

    /// Insert a raw document, bypassing the typed encoders. Lets callers
    /// load exported data or stage malformed records in tests.
    pub async fn insert_raw(&self, collection: &'static str, id: &str, doc: Value) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), doc);
    }

    /// Raw stored document, as the backend sees it.
    pub async fn raw(&self, collection: &'static str, id: &str) -> Option<Value> {
        let collections = self.collections.read().await;
        collections.get(collection).and_then(|c| c.get(id)).cloned()
    }
}

fn decode<D, T>(collection: &str, id: &str, value: Value) -> Result<T>
where
    D: DeserializeOwned,
    T: TryFrom<D, Error = anyhow::Error>,
{
    let doc: D = serde_json::from_value(value)
        .with_context(|| format!("Malformed {} document {}", collection, id))?;
    T::try_from(doc).with_context(|| format!("Invalid {} document {}", collection, id))
}

#[async_trait]
impl Store for DocumentStore {
    fn backend(&self) -> &'static str {
        "document"
    }

    async fn create_user(&self, user: &UserProfile) -> Result<()> {
        self.put(USERS, &user.id, &UserDoc::from(user)).await
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserProfile>> {
        self.fetch::<UserDoc, _>(USERS, id).await
    }

    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<UserProfile>> {
        self.merge::<UserDoc, _>(USERS, id, user_patch_fields(patch)).await
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        self.remove(USERS, id).await
    }

    async fn create_goal(&self, goal: &Goal) -> Result<()> {
        self.put(GOALS, &goal.id, &GoalDoc::from(goal)).await
    }

    async fn get_goal(&self, id: &str) -> Result<Option<Goal>> {
        self.fetch::<GoalDoc, _>(GOALS, id).await
    }

    async fn list_goals(&self, owner_id: &str, page: Page) -> Result<Vec<Goal>> {
        self.query_owner::<GoalDoc, _>(GOALS, owner_id, "updatedAt", page).await
    }

    async fn update_goal(&self, id: &str, patch: &GoalPatch) -> Result<Option<Goal>> {
        self.merge::<GoalDoc, _>(GOALS, id, goal_patch_fields(patch)?).await
    }

    async fn delete_goal(&self, id: &str) -> Result<()> {
        self.remove(GOALS, id).await
    }

    async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.put(CONVERSATIONS, &conversation.id, &ConversationDoc::from(conversation))
            .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.fetch::<ConversationDoc, _>(CONVERSATIONS, id).await
    }

    async fn list_conversations(&self, owner_id: &str, page: Page) -> Result<Vec<Conversation>> {
        self.query_owner::<ConversationDoc, _>(CONVERSATIONS, owner_id, "updatedAt", page)
            .await
    }

    async fn update_conversation(
        &self,
        id: &str,
        patch: &ConversationPatch,
    ) -> Result<Option<Conversation>> {
        self.merge::<ConversationDoc, _>(CONVERSATIONS, id, conversation_patch_fields(patch)?)
            .await
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.remove(CONVERSATIONS, id).await
    }

    async fn create_motivation(&self, motivation: &Motivation) -> Result<()> {
        self.put(MOTIVATIONS, &motivation.id, &MotivationDoc::from(motivation))
            .await
    }

    async fn get_motivation(&self, id: &str) -> Result<Option<Motivation>> {
        self.fetch::<MotivationDoc, _>(MOTIVATIONS, id).await
    }

    async fn list_motivations(&self, owner_id: &str, page: Page) -> Result<Vec<Motivation>> {
        self.query_owner::<MotivationDoc, _>(MOTIVATIONS, owner_id, "createdAt", page)
            .await
    }

    async fn update_motivation(
        &self,
        id: &str,
        patch: &MotivationPatch,
    ) -> Result<Option<Motivation>> {
        self.merge::<MotivationDoc, _>(MOTIVATIONS, id, motivation_patch_fields(patch))
            .await
    }

    async fn delete_motivation(&self, id: &str) -> Result<()> {
        self.remove(MOTIVATIONS, id).await
    }

    async fn record_ritual(&self, completion: &RitualCompletion) -> Result<()> {
        self.put(RITUALS, &completion.id, &RitualDoc::from(completion))
            .await
    }

    async fn list_rituals_since(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RitualCompletion>> {
        let all = self
            .query_owner::<RitualDoc, RitualCompletion>(RITUALS, owner_id, "completedAt", Page::all())
            .await?;
        Ok(all.into_iter().filter(|r| r.completed_at >= since).collect())
    }
}
