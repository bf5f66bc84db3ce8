use crate::model::{Goal, Milestone};

/// Aggregate completion of a goal, 0-100.
///
/// Completed milestones count as 100, the rest contribute their own
/// progress. The mean is rounded half-up; no milestones means 0.
pub fn calculate_progress(milestones: &[Milestone]) -> u8 {
    if milestones.is_empty() {
        return 0;
    }
    let n = milestones.len() as u64;
    let sum: u64 = milestones
        .iter()
        .map(|m| if m.completed { 100 } else { m.progress.min(100) as u64 })
        .sum();
    // round(sum / n) with halves going up, in integers
    ((2 * sum + n) / (2 * n)) as u8
}

/// Recompute and store the cached progress. Returns the new value.
///
/// Callers own this: nothing observes milestone lists, so every mutation
/// path must call it.
pub fn apply_progress(goal: &mut Goal) -> u8 {
    goal.progress = calculate_progress(&goal.milestones);
    goal.progress
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(specs: &[(bool, u8)]) -> Vec<Milestone> {
        specs
            .iter()
            .enumerate()
            .map(|(i, (completed, progress))| Milestone {
                id: format!("m{i}"),
                title: format!("step {i}"),
                completed: *completed,
                progress: *progress,
                created_at: None,
                updated_at: None,
            })
            .collect()
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(calculate_progress(&[]), 0);
    }

    #[test]
    fn test_completed_and_partial() {
        assert_eq!(calculate_progress(&ms(&[(true, 100), (false, 40)])), 70);
    }

    #[test]
    fn test_three_way_mean() {
        assert_eq!(calculate_progress(&ms(&[(true, 100), (false, 50), (false, 0)])), 50);
    }

    #[test]
    fn test_completed_ignores_stored_progress() {
        assert_eq!(calculate_progress(&ms(&[(true, 10)])), 100);
    }

    #[test]
    fn test_rounds_half_up() {
        // (1 + 0) / 2 = 0.5 -> 1
        assert_eq!(calculate_progress(&ms(&[(false, 1), (false, 0)])), 1);
        // (10 + 0 + 0) / 3 = 3.33 -> 3
        assert_eq!(calculate_progress(&ms(&[(false, 10), (false, 0), (false, 0)])), 3);
        // (20 + 0 + 0) / 3 = 6.67 -> 7
        assert_eq!(calculate_progress(&ms(&[(false, 20), (false, 0), (false, 0)])), 7);
    }

    #[test]
    fn test_apply_progress_forces_zero_without_milestones() {
        let now = chrono::Utc::now();
        let mut goal = Goal {
            id: "g".into(),
            owner_id: "u".into(),
            title: "t".into(),
            description: None,
            milestones: vec![],
            progress: 55,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(apply_progress(&mut goal), 0);
        assert_eq!(goal.progress, 0);
    }
}
