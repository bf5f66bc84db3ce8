//! Goal progress roll-up for the dashboard view.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::Goal;

/// Which goals a summary covers, by how recently they were touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Week,
    Month,
    #[default]
    All,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::All => "all",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "week" => Some(Timeframe::Week),
            "month" => Some(Timeframe::Month),
            "all" => Some(Timeframe::All),
            _ => None,
        }
    }

    /// Goals must have been updated strictly after this instant.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::Week => Some(now - Duration::days(7)),
            Timeframe::Month => Some(now - Duration::days(30)),
            Timeframe::All => None,
        }
    }

    pub fn includes(&self, goal: &Goal, now: DateTime<Utc>) -> bool {
        self.cutoff(now).map_or(true, |cutoff| goal.updated_at > cutoff)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub total: usize,
    /// Progress at 100.
    pub completed: usize,
    pub in_progress: usize,
    /// Progress at 0.
    pub not_started: usize,
    /// Mean goal progress, rounded half-up. 0 with no goals.
    pub average: u8,
    #[serde(skip)]
    progress_sum: u64,
}

impl ProgressSummary {
    /// One-line encouragement matching the counts.
    pub fn headline(&self) -> String {
        if self.total == 0 {
            "No goals set yet. Create your first goal to start tracking progress!".to_string()
        } else if self.completed == self.total {
            "Amazing! You've completed all your goals!".to_string()
        } else if self.completed > 0 {
            format!(
                "You've completed {} of {} goals ({}% average progress)",
                self.completed, self.total, self.average
            )
        } else if self.progress_sum > 0 {
            format!("You're making progress! Average completion: {}%", self.average)
        } else {
            "Time to get started on your goals!".to_string()
        }
    }
}

pub fn summarize(goals: &[Goal], timeframe: Timeframe, now: DateTime<Utc>) -> ProgressSummary {
    let mut summary = ProgressSummary::default();
    for goal in goals.iter().filter(|g| timeframe.includes(g, now)) {
        let progress = goal.progress.min(100);
        summary.total += 1;
        summary.progress_sum += u64::from(progress);
        match progress {
            100 => summary.completed += 1,
            0 => summary.not_started += 1,
            _ => summary.in_progress += 1,
        }
    }
    if summary.total > 0 {
        let n = summary.total as u64;
        summary.average = ((2 * summary.progress_sum + n) / (2 * n)) as u8;
    }
    summary
}
