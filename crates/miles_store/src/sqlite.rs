//! Relational backend on SQLite.
//!
//! Rows use snake_case columns, a `user_id` owner column and ISO-8601
//! (RFC 3339, millisecond, `Z`) text timestamps. That format sorts
//! lexicographically, so `ORDER BY updated_at DESC` works on the text.
//! Embedded milestones and messages live in JSON text columns.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

use miles_core::validate::{parse_iso8601, parse_progress, parse_role};
use miles_core::{
    Conversation, ConversationPatch, Goal, GoalPatch, Message, Milestone, Motivation,
    MotivationPatch, Page, RitualCompletion, RitualKind, UserPatch, UserProfile,
};

use crate::Store;

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_opt_iso(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_iso8601).transpose()
}

// ============================================================================
// JSON column shapes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct MilestoneRow {
    id: String,
    title: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    progress: i64,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl From<&Milestone> for MilestoneRow {
    fn from(m: &Milestone) -> Self {
        Self {
            id: m.id.clone(),
            title: m.title.clone(),
            completed: m.completed,
            progress: m.progress as i64,
            created_at: m.created_at.map(iso),
            updated_at: m.updated_at.map(iso),
        }
    }
}

impl TryFrom<MilestoneRow> for Milestone {
    type Error = anyhow::Error;
    fn try_from(r: MilestoneRow) -> Result<Self> {
        Ok(Self {
            progress: parse_progress(r.progress).with_context(|| format!("milestone {}", r.id))?,
            created_at: parse_opt_iso(r.created_at)?,
            updated_at: parse_opt_iso(r.updated_at)?,
            id: r.id,
            title: r.title,
            completed: r.completed,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageRow {
    role: String,
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
}

impl From<&Message> for MessageRow {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            timestamp: m.timestamp.map(iso),
        }
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;
    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Self {
            role: parse_role(&r.role)?,
            content: r.content,
            timestamp: parse_opt_iso(r.timestamp)?,
        })
    }
}

fn milestones_json(milestones: &[Milestone]) -> Result<String> {
    let rows: Vec<MilestoneRow> = milestones.iter().map(MilestoneRow::from).collect();
    serde_json::to_string(&rows).context("Failed to serialize milestones")
}

fn messages_json(messages: &[Message]) -> Result<String> {
    let rows: Vec<MessageRow> = messages.iter().map(MessageRow::from).collect();
    serde_json::to_string(&rows).context("Failed to serialize messages")
}

// ============================================================================
// Row decoding
// ============================================================================

fn row_to_user(row: &SqliteRow) -> Result<UserProfile> {
    Ok(UserProfile {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        created_at: parse_iso8601(&row.try_get::<String, _>("created_at")?)?,
        last_login: parse_iso8601(&row.try_get::<String, _>("last_login")?)?,
        is_onboarded: row.try_get("is_onboarded")?,
    })
}

fn row_to_goal(row: &SqliteRow) -> Result<Goal> {
    let milestones_raw: String = row.try_get("milestones")?;
    let milestone_rows: Vec<MilestoneRow> =
        serde_json::from_str(&milestones_raw).context("Malformed milestones column")?;
    Ok(Goal {
        id: row.try_get("id")?,
        owner_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        milestones: milestone_rows
            .into_iter()
            .map(Milestone::try_from)
            .collect::<Result<_>>()?,
        progress: parse_progress(row.try_get("progress")?)?,
        created_at: parse_iso8601(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_iso8601(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn row_to_conversation(row: &SqliteRow) -> Result<Conversation> {
    let messages_raw: String = row.try_get("messages")?;
    let message_rows: Vec<MessageRow> =
        serde_json::from_str(&messages_raw).context("Malformed messages column")?;
    Ok(Conversation {
        id: row.try_get("id")?,
        owner_id: row.try_get("user_id")?,
        messages: message_rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<_>>()?,
        created_at: parse_iso8601(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_iso8601(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn row_to_motivation(row: &SqliteRow) -> Result<Motivation> {
    Ok(Motivation {
        id: row.try_get("id")?,
        owner_id: row.try_get("user_id")?,
        text: row.try_get("text")?,
        category: row.try_get("category")?,
        created_at: parse_iso8601(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_ritual(row: &SqliteRow) -> Result<RitualCompletion> {
    let kind: String = row.try_get("ritual_type")?;
    Ok(RitualCompletion {
        id: row.try_get("id")?,
        owner_id: row.try_get("user_id")?,
        kind: RitualKind::parse_str(&kind)
            .with_context(|| format!("Unknown ritual type: {}", kind))?,
        completed_at: parse_iso8601(&row.try_get::<String, _>("completed_at")?)?,
        reflection: row.try_get("reflection")?,
    })
}

/// Decode rows, skipping (and logging) the ones that fail validation.
/// The page limit counts decoded items, so it is applied here rather
/// than in SQL.
fn decode_rows<T>(
    table: &str,
    rows: &[SqliteRow],
    limit: Option<usize>,
    f: fn(&SqliteRow) -> Result<T>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match f(row) {
            Ok(item) => Some(item),
            Err(e) => {
                let id: String = row.try_get("id").unwrap_or_default();
                tracing::warn!("Skipping invalid {} row {}: {:#}", table, id, e);
                None
            }
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`. `":memory:"`
    /// gives a private in-memory database held on a single connection.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let in_memory = path.as_os_str() == ":memory:";

        let pool = if in_memory {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            SqlitePoolOptions::new().connect_with(options).await
        }
        .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!("SQLite store ready at {}", path.display());
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                display_name TEXT,
                created_at TEXT NOT NULL,
                last_login TEXT NOT NULL,
                is_onboarded INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goals (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                milestones TEXT NOT NULL DEFAULT '[]',
                progress INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create goals table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_goals_user_updated ON goals(user_id, updated_at)")
            .execute(&self.pool)
            .await
            .context("Failed to create goals index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                messages TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create conversations table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user_updated ON conversations(user_id, updated_at)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create conversations index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_motivations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                text TEXT NOT NULL,
                category TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create user_motivations table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_motivations_user_created ON user_motivations(user_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create user_motivations index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ritual_completions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                ritual_type TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                reflection TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create ritual_completions table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rituals_user_completed ON ritual_completions(user_id, completed_at)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create ritual_completions index")?;

        Ok(())
    }

    /// Direct pool access for maintenance and tests.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    // =========================================================================
    // Users
    // =========================================================================

    async fn create_user(&self, user: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, display_name, created_at, last_login, is_onboarded) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(iso(user.created_at))
        .bind(iso(user.last_login))
        .bind(user.is_onboarded)
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;
        tracing::debug!("Inserted user {}", user.id);
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query user")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<UserProfile>> {
        let result = sqlx::query(
            "UPDATE users SET \
                email = COALESCE(?, email), \
                display_name = COALESCE(?, display_name), \
                last_login = COALESCE(?, last_login), \
                is_onboarded = COALESCE(?, is_onboarded) \
             WHERE id = ?",
        )
        .bind(&patch.email)
        .bind(&patch.display_name)
        .bind(patch.last_login.map(iso))
        .bind(patch.is_onboarded)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(id).await
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;
        Ok(())
    }

    // =========================================================================
    // Goals
    // =========================================================================

    async fn create_goal(&self, goal: &Goal) -> Result<()> {
        sqlx::query(
            "INSERT INTO goals (id, user_id, title, description, milestones, progress, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&goal.id)
        .bind(&goal.owner_id)
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(milestones_json(&goal.milestones)?)
        .bind(goal.progress as i64)
        .bind(iso(goal.created_at))
        .bind(iso(goal.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to insert goal")?;
        tracing::debug!("Inserted goal {} for {}", goal.id, goal.owner_id);
        Ok(())
    }

    async fn get_goal(&self, id: &str) -> Result<Option<Goal>> {
        let row = sqlx::query("SELECT * FROM goals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query goal")?;
        row.as_ref()
            .map(row_to_goal)
            .transpose()
            .with_context(|| format!("Invalid goal row {}", id))
    }

    async fn list_goals(&self, owner_id: &str, page: Page) -> Result<Vec<Goal>> {
        let rows = sqlx::query(
            "SELECT * FROM goals WHERE user_id = ? AND (? IS NULL OR updated_at < ?) \
             ORDER BY updated_at DESC",
        )
        .bind(owner_id)
        .bind(page.after.map(iso))
        .bind(page.after.map(iso))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list goals")?;
        Ok(decode_rows("goals", &rows, page.limit, row_to_goal))
    }

    async fn update_goal(&self, id: &str, patch: &GoalPatch) -> Result<Option<Goal>> {
        let milestones = patch
            .milestones
            .as_deref()
            .map(milestones_json)
            .transpose()?;
        let result = sqlx::query(
            "UPDATE goals SET \
                title = COALESCE(?, title), \
                description = COALESCE(?, description), \
                milestones = COALESCE(?, milestones), \
                progress = COALESCE(?, progress), \
                updated_at = COALESCE(?, updated_at) \
             WHERE id = ?",
        )
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(milestones)
        .bind(patch.progress.map(|p| p as i64))
        .bind(patch.updated_at.map(iso))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update goal")?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_goal(id).await
    }

    async fn delete_goal(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM goals WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete goal")?;
        Ok(())
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversations (id, user_id, messages, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.owner_id)
        .bind(messages_json(&conversation.messages)?)
        .bind(iso(conversation.created_at))
        .bind(iso(conversation.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to insert conversation")?;
        tracing::debug!("Inserted conversation {}", conversation.id);
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query conversation")?;
        row.as_ref()
            .map(row_to_conversation)
            .transpose()
            .with_context(|| format!("Invalid conversation row {}", id))
    }

    async fn list_conversations(&self, owner_id: &str, page: Page) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE user_id = ? AND (? IS NULL OR updated_at < ?) \
             ORDER BY updated_at DESC",
        )
        .bind(owner_id)
        .bind(page.after.map(iso))
        .bind(page.after.map(iso))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list conversations")?;
        Ok(decode_rows("conversations", &rows, page.limit, row_to_conversation))
    }

    async fn update_conversation(
        &self,
        id: &str,
        patch: &ConversationPatch,
    ) -> Result<Option<Conversation>> {
        let messages = patch.messages.as_deref().map(messages_json).transpose()?;
        let result = sqlx::query(
            "UPDATE conversations SET \
                messages = COALESCE(?, messages), \
                updated_at = COALESCE(?, updated_at) \
             WHERE id = ?",
        )
        .bind(messages)
        .bind(patch.updated_at.map(iso))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update conversation")?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_conversation(id).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete conversation")?;
        Ok(())
    }

    // =========================================================================
    // Motivations
    // =========================================================================

    async fn create_motivation(&self, motivation: &Motivation) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_motivations (id, user_id, text, category, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&motivation.id)
        .bind(&motivation.owner_id)
        .bind(&motivation.text)
        .bind(&motivation.category)
        .bind(iso(motivation.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to insert motivation")?;
        Ok(())
    }

    async fn get_motivation(&self, id: &str) -> Result<Option<Motivation>> {
        let row = sqlx::query("SELECT * FROM user_motivations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query motivation")?;
        row.as_ref().map(row_to_motivation).transpose()
    }

    async fn list_motivations(&self, owner_id: &str, page: Page) -> Result<Vec<Motivation>> {
        let rows = sqlx::query(
            "SELECT * FROM user_motivations WHERE user_id = ? AND (? IS NULL OR created_at < ?) \
             ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .bind(page.after.map(iso))
        .bind(page.after.map(iso))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list motivations")?;
        Ok(decode_rows("user_motivations", &rows, page.limit, row_to_motivation))
    }

    async fn update_motivation(
        &self,
        id: &str,
        patch: &MotivationPatch,
    ) -> Result<Option<Motivation>> {
        let result = sqlx::query(
            "UPDATE user_motivations SET \
                text = COALESCE(?, text), \
                category = COALESCE(?, category) \
             WHERE id = ?",
        )
        .bind(&patch.text)
        .bind(&patch.category)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update motivation")?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_motivation(id).await
    }

    async fn delete_motivation(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_motivations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete motivation")?;
        Ok(())
    }

    // =========================================================================
    // Rituals
    // =========================================================================

    async fn record_ritual(&self, completion: &RitualCompletion) -> Result<()> {
        sqlx::query(
            "INSERT INTO ritual_completions (id, user_id, ritual_type, completed_at, reflection) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&completion.id)
        .bind(&completion.owner_id)
        .bind(completion.kind.as_str())
        .bind(iso(completion.completed_at))
        .bind(&completion.reflection)
        .execute(&self.pool)
        .await
        .context("Failed to insert ritual completion")?;
        tracing::debug!("Recorded {} ritual for {}", completion.kind.as_str(), completion.owner_id);
        Ok(())
    }

    async fn list_rituals_since(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RitualCompletion>> {
        let rows = sqlx::query(
            "SELECT * FROM ritual_completions WHERE user_id = ? AND completed_at >= ? \
             ORDER BY completed_at DESC",
        )
        .bind(owner_id)
        .bind(iso(since))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ritual completions")?;
        Ok(decode_rows("ritual_completions", &rows, None, row_to_ritual))
    }
}
