//! Domain entities.
//!
//! These are the trusted, already-validated shapes. Storage adapters parse
//! their own row/document representations into these types at the I/O edge
//! (see [`crate::validate`]), so nothing downstream re-checks ranges.

use chrono::{DateTime, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current time at the millisecond precision both stores keep.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// ============================================================================
// Goals
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub milestones: Vec<Milestone>,
    /// Cached aggregate, 0-100. Recomputed by [`crate::apply_progress`]
    /// after every milestone mutation.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sub-step embedded in a [`Goal`]. Never referenced on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub progress: u8,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Milestone {
    /// Completed milestones are stored at 100.
    pub fn normalize(&mut self) {
        if self.completed {
            self.progress = 100;
        }
    }
}

/// Input for a new goal, before IDs and timestamps exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewGoal {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub milestones: Vec<NewMilestone>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMilestone {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub progress: u8,
}

impl NewMilestone {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn into_milestone(self, id: String, now: DateTime<Utc>) -> Milestone {
        let mut milestone = Milestone {
            id,
            title: self.title.trim().to_string(),
            completed: self.completed,
            progress: self.progress,
            created_at: Some(now),
            updated_at: Some(now),
        };
        milestone.normalize();
        milestone
    }
}

/// Merge-style update: `None` leaves the stored field untouched.
/// Identity, owner and creation time are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub milestones: Option<Vec<Milestone>>,
    pub progress: Option<u8>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GoalPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.milestones.is_none()
            && self.progress.is_none()
            && self.updated_at.is_none()
    }

    /// Apply this patch onto an in-memory goal.
    pub fn apply_to(&self, goal: &mut Goal) {
        if let Some(title) = &self.title {
            goal.title = title.clone();
        }
        if let Some(description) = &self.description {
            goal.description = Some(description.clone());
        }
        if let Some(milestones) = &self.milestones {
            goal.milestones = milestones.clone();
        }
        if let Some(progress) = self.progress {
            goal.progress = progress;
        }
        if let Some(updated_at) = self.updated_at {
            goal.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilestonePatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub progress: Option<u8>,
}

impl MilestonePatch {
    pub fn apply_to(&self, milestone: &mut Milestone, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            milestone.title = title.trim().to_string();
        }
        if let Some(completed) = self.completed {
            milestone.completed = completed;
        }
        if let Some(progress) = self.progress {
            milestone.progress = progress;
        }
        milestone.updated_at = Some(now);
        milestone.normalize();
    }
}

// ============================================================================
// Conversations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// Immutable once appended to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(timestamp),
        }
    }
}

/// Append-only message log between one user and the coach persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub owner_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPatch {
    pub messages: Option<Vec<Message>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationPatch {
    pub fn apply_to(&self, conversation: &mut Conversation) {
        if let Some(messages) = &self.messages {
            conversation.messages = messages.clone();
        }
        if let Some(updated_at) = self.updated_at {
            conversation.updated_at = updated_at;
        }
    }
}

// ============================================================================
// Motivations
// ============================================================================

/// A driver behind the user's goals, inferred from conversation analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motivation {
    pub id: String,
    pub owner_id: String,
    pub text: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotivationPatch {
    pub text: Option<String>,
    pub category: Option<String>,
}

impl MotivationPatch {
    pub fn apply_to(&self, motivation: &mut Motivation) {
        if let Some(text) = &self.text {
            motivation.text = text.clone();
        }
        if let Some(category) = &self.category {
            motivation.category = Some(category.clone());
        }
    }
}

// ============================================================================
// Rituals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RitualKind {
    Morning,
    Evening,
}

impl RitualKind {
    pub const ALL: [RitualKind; 2] = [RitualKind::Morning, RitualKind::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            RitualKind::Morning => "morning",
            RitualKind::Evening => "evening",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "morning" => Some(RitualKind::Morning),
            "evening" => Some(RitualKind::Evening),
            _ => None,
        }
    }
}

/// One morning intention or evening reflection, checked off for the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RitualCompletion {
    pub id: String,
    pub owner_id: String,
    pub kind: RitualKind,
    pub completed_at: DateTime<Utc>,
    pub reflection: Option<String>,
}

/// Midnight UTC of the day containing `ts`. Ritual days are UTC days.
pub fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub is_onboarded: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_onboarded: Option<bool>,
}

impl UserPatch {
    pub fn apply_to(&self, user: &mut UserProfile) {
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(display_name) = &self.display_name {
            user.display_name = Some(display_name.clone());
        }
        if let Some(last_login) = self.last_login {
            user.last_login = last_login;
        }
        if let Some(is_onboarded) = self.is_onboarded {
            user.is_onboarded = is_onboarded;
        }
    }
}

/// What the authentication provider hands us after sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
}

// ============================================================================
// Paging
// ============================================================================

/// Owner listings are ordered newest-first. `after` is an exclusive cursor
/// on the ordering timestamp of the last item of the previous page.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Page {
    pub limit: Option<usize>,
    pub after: Option<DateTime<Utc>>,
}

impl Page {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn first(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            after: None,
        }
    }

    pub fn after(limit: usize, cursor: DateTime<Utc>) -> Self {
        Self {
            limit: Some(limit),
            after: Some(cursor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone(progress: u8, completed: bool) -> Milestone {
        Milestone {
            id: "m1".into(),
            title: "Run 5k".into(),
            completed,
            progress,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_completed_milestone_normalizes_to_full() {
        let mut m = milestone(40, true);
        m.normalize();
        assert_eq!(m.progress, 100);
    }

    #[test]
    fn test_uncompleting_keeps_progress() {
        let now = Utc::now();
        let mut m = milestone(100, true);
        MilestonePatch {
            completed: Some(false),
            ..Default::default()
        }
        .apply_to(&mut m, now);
        assert!(!m.completed);
        assert_eq!(m.progress, 100);
        assert_eq!(m.updated_at, Some(now));
    }

    #[test]
    fn test_new_milestone_title_is_trimmed() {
        let m = NewMilestone::titled("  Run 5k \n").into_milestone("m1".into(), Utc::now());
        assert_eq!(m.title, "Run 5k");
    }

    #[test]
    fn test_start_of_day_is_utc_midnight() {
        use chrono::TimeZone;
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();
        assert_eq!(start_of_day(ts), Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(RitualKind::parse_str("evening"), Some(RitualKind::Evening));
        assert_eq!(RitualKind::parse_str("noon"), None);
    }

    #[test]
    fn test_role_roundtrip_str() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::parse_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse_str("tool"), None);
    }

    #[test]
    fn test_goal_patch_leaves_unset_fields() {
        let now = Utc::now();
        let mut goal = Goal {
            id: "g".into(),
            owner_id: "u".into(),
            title: "Old".into(),
            description: Some("keep me".into()),
            milestones: vec![],
            progress: 0,
            created_at: now,
            updated_at: now,
        };
        GoalPatch {
            title: Some("New".into()),
            ..Default::default()
        }
        .apply_to(&mut goal);
        assert_eq!(goal.title, "New");
        assert_eq!(goal.description.as_deref(), Some("keep me"));
    }
}
