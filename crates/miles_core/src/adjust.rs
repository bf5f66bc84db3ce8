//! Stalled-milestone splitting.
//!
//! When a milestone sits incomplete at low progress for too long, it is
//! broken into "Step 1: X" and "Step 2: Continue X". One split per pass.

use chrono::{DateTime, Duration, Utc};

use crate::model::Milestone;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallPolicy {
    /// Milestones strictly below this progress may be stalled.
    pub progress_threshold: u8,
    /// Idle time (since `updated_at`) that must be exceeded.
    pub max_idle: Duration,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            progress_threshold: 30,
            max_idle: Duration::days(7),
        }
    }
}

impl StallPolicy {
    pub fn is_stalled(&self, milestone: &Milestone, now: DateTime<Utc>) -> bool {
        if milestone.completed || milestone.progress >= self.progress_threshold {
            return false;
        }
        // Never-touched milestones carry no idle signal.
        match milestone.updated_at {
            Some(last) => now - last > self.max_idle,
            None => false,
        }
    }
}

/// Index of the first stalled milestone in list order.
pub fn find_stalled(
    milestones: &[Milestone],
    now: DateTime<Utc>,
    policy: &StallPolicy,
) -> Option<usize> {
    milestones.iter().position(|m| policy.is_stalled(m, now))
}

/// Split the milestone at `index` in place.
///
/// The original keeps its id, progress and completion; its title gains the
/// "Step 1: " prefix and `updated_at` is set to `now`. A fresh step is
/// inserted right after it.
pub fn split_milestone(
    milestones: &mut Vec<Milestone>,
    index: usize,
    new_id: String,
    now: DateTime<Utc>,
) {
    let Some(current) = milestones.get_mut(index) else {
        return;
    };
    let original_title = std::mem::take(&mut current.title);
    current.title = format!("Step 1: {}", original_title);
    current.updated_at = Some(now);

    milestones.insert(
        index + 1,
        Milestone {
            id: new_id,
            title: format!("Step 2: Continue {}", original_title),
            completed: false,
            progress: 0,
            created_at: Some(now),
            updated_at: Some(now),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stale(title: &str, progress: u8, completed: bool, days_idle: i64, now: DateTime<Utc>) -> Milestone {
        Milestone {
            id: title.to_lowercase(),
            title: title.into(),
            completed,
            progress,
            created_at: Some(now - Duration::days(days_idle)),
            updated_at: Some(now - Duration::days(days_idle)),
        }
    }

    #[test]
    fn test_split_eight_day_idle_milestone() {
        let now = Utc::now();
        let mut list = vec![stale("Read", 10, false, 8, now)];
        let idx = find_stalled(&list, now, &StallPolicy::default()).unwrap();
        split_milestone(&mut list, idx, "new".into(), now);

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title, "Step 1: Read");
        assert_eq!(list[0].progress, 10);
        assert!(!list[0].completed);
        assert_eq!(list[1].title, "Step 2: Continue Read");
        assert_eq!(list[1].id, "new");
        assert_eq!(list[1].progress, 0);
    }

    #[test]
    fn test_not_stalled_cases() {
        let now = Utc::now();
        let policy = StallPolicy::default();
        assert!(!policy.is_stalled(&stale("a", 10, true, 30, now), now));
        assert!(!policy.is_stalled(&stale("b", 30, false, 30, now), now));
        assert!(!policy.is_stalled(&stale("c", 0, false, 7, now), now));
        let mut untouched = stale("d", 0, false, 30, now);
        untouched.updated_at = None;
        assert!(!policy.is_stalled(&untouched, now));
    }

    #[test]
    fn test_first_match_wins() {
        let now = Utc::now();
        let list = vec![
            stale("Fresh", 0, false, 1, now),
            stale("First", 5, false, 9, now),
            stale("Second", 5, false, 20, now),
        ];
        assert_eq!(find_stalled(&list, now, &StallPolicy::default()), Some(1));
    }

    #[test]
    fn test_rerun_after_split_is_noop() {
        let now = Utc::now();
        let policy = StallPolicy::default();
        let mut list = vec![stale("Only", 10, false, 8, now)];
        let idx = find_stalled(&list, now, &policy).unwrap();
        split_milestone(&mut list, idx, "n".into(), now);
        assert_eq!(find_stalled(&list, now, &policy), None);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let now = Utc::now();
        let mut list = vec![stale("Only", 10, false, 8, now)];
        split_milestone(&mut list, 5, "n".into(), now);
        assert_eq!(list.len(), 1);
    }
}
