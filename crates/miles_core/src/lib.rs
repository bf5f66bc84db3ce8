//! Domain model and the small amount of pure logic behind Miles:
//! identifiers, goal progress, stalled-milestone splitting, history windowing
//! and the progress summary.

pub mod adjust;
pub mod config;
pub mod error;
pub mod id;
pub mod model;
pub mod progress;
pub mod summary;
pub mod validate;
pub mod window;

pub use adjust::{find_stalled, split_milestone, StallPolicy};
pub use config::{CoachingConfig, LlmConfig, MilesConfig, StoreBackend, StoreConfig};
pub use error::{CoachError, CoachResult};
pub use id::{generate_id, generate_id_with_len, IdError, ID_ALPHABET, DEFAULT_ID_LEN};
pub use model::{
    AuthSession, Conversation, ConversationPatch, Goal, GoalPatch, Message, Milestone,
    MilestonePatch, Motivation, MotivationPatch, NewGoal, NewMilestone, Page, RitualCompletion,
    RitualKind, Role, UserPatch, UserProfile, now_millis, start_of_day,
};
pub use progress::{apply_progress, calculate_progress};
pub use summary::{summarize, ProgressSummary, Timeframe};
pub use window::{recent_messages, DEFAULT_HISTORY_WINDOW};
