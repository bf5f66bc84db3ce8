use std::sync::Arc;

use chrono::{DateTime, Utc};
use miles_core::validate::{require_text, validate_milestone_patch, validate_new_goal, validate_new_milestone};
use miles_core::{
    apply_progress, calculate_progress, find_stalled, generate_id, split_milestone, CoachError,
    now_millis, summarize, CoachResult, Goal, GoalPatch, Milestone, MilestonePatch, NewGoal,
    NewMilestone, Page, ProgressSummary, StallPolicy, Timeframe,
};
use miles_store::Store;

use crate::coach::Coach;
use crate::OrBackend;

/// Goal and milestone operations for the app's goal screens.
///
/// The stored `progress` of a goal is always derived from its milestones;
/// every path that touches milestones recomputes it before persisting.
pub struct GoalService {
    store: Arc<dyn Store>,
    coach: Arc<Coach>,
    stall_policy: StallPolicy,
}

impl GoalService {
    pub fn new(store: Arc<dyn Store>, coach: Arc<Coach>) -> Self {
        Self {
            store,
            coach,
            stall_policy: StallPolicy::default(),
        }
    }

    pub fn with_stall_policy(mut self, policy: StallPolicy) -> Self {
        self.stall_policy = policy;
        self
    }

    pub async fn create_goal(&self, owner_id: &str, input: NewGoal) -> CoachResult<Goal> {
        validate_new_goal(&input)?;
        let now = now_millis();

        let milestones = input
            .milestones
            .into_iter()
            .map(|m| -> CoachResult<Milestone> { Ok(m.into_milestone(generate_id()?, now)) })
            .collect::<CoachResult<Vec<Milestone>>>()?;

        let mut goal = Goal {
            id: generate_id()?,
            owner_id: owner_id.to_string(),
            title: input.title.trim().to_string(),
            description: input.description.filter(|d| !d.trim().is_empty()),
            milestones,
            progress: 0,
            created_at: now,
            updated_at: now,
        };
        apply_progress(&mut goal);

        self.store
            .create_goal(&goal)
            .await
            .or_backend("Failed to create goal")?;
        tracing::info!(goal_id = %goal.id, milestones = goal.milestones.len(), "Goal created");
        Ok(goal)
    }

    pub async fn get_goal(&self, id: &str) -> CoachResult<Option<Goal>> {
        self.store.get_goal(id).await.or_backend("Failed to fetch goal")
    }

    /// Newest-updated first.
    pub async fn list_goals(&self, owner_id: &str) -> CoachResult<Vec<Goal>> {
        self.store
            .list_goals(owner_id, Page::all())
            .await
            .or_backend("Failed to fetch goals")
    }

    /// Counts and average progress over the owner's goals touched within
    /// `timeframe`.
    pub async fn summary(&self, owner_id: &str, timeframe: Timeframe) -> CoachResult<ProgressSummary> {
        let goals = self.list_goals(owner_id).await?;
        Ok(summarize(&goals, timeframe, now_millis()))
    }

    /// Merge `patch` into the stored goal.
    ///
    /// A supplied `progress` is ignored: when milestones are replaced the
    /// aggregate is recomputed from them, otherwise the stored value stands.
    /// A patch with nothing else to change returns the stored goal untouched.
    pub async fn update_goal(&self, id: &str, mut patch: GoalPatch) -> CoachResult<Goal> {
        if let Some(title) = patch.title.take() {
            require_text("goal title", &title)?;
            patch.title = Some(title.trim().to_string());
        }
        patch.progress = None;
        if patch.is_empty() {
            return self.require_goal(id).await;
        }
        self.persist(id, patch, now_millis()).await
    }

    pub async fn delete_goal(&self, id: &str) -> CoachResult<()> {
        self.store
            .delete_goal(id)
            .await
            .or_backend("Failed to delete goal")?;
        tracing::info!(goal_id = %id, "Goal deleted");
        Ok(())
    }

    pub async fn add_milestone(&self, goal_id: &str, input: NewMilestone) -> CoachResult<Goal> {
        validate_new_milestone(&input)?;
        let mut goal = self.require_goal(goal_id).await?;
        let now = now_millis();
        goal.milestones.push(input.into_milestone(generate_id()?, now));
        self.save_milestones(goal, now).await
    }

    pub async fn update_milestone(
        &self,
        goal_id: &str,
        milestone_id: &str,
        patch: MilestonePatch,
    ) -> CoachResult<Goal> {
        validate_milestone_patch(&patch)?;
        let mut goal = self.require_goal(goal_id).await?;
        let now = now_millis();
        let milestone = goal
            .milestones
            .iter_mut()
            .find(|m| m.id == milestone_id)
            .ok_or_else(|| CoachError::not_found("milestone", milestone_id))?;
        patch.apply_to(milestone, now);
        self.save_milestones(goal, now).await
    }

    pub async fn delete_milestone(&self, goal_id: &str, milestone_id: &str) -> CoachResult<Goal> {
        let mut goal = self.require_goal(goal_id).await?;
        let before = goal.milestones.len();
        goal.milestones.retain(|m| m.id != milestone_id);
        if goal.milestones.len() == before {
            return Err(CoachError::not_found("milestone", milestone_id));
        }
        self.save_milestones(goal, now_millis()).await
    }

    /// Append one milestone per non-blank suggested title.
    pub async fn accept_suggestions(&self, goal_id: &str, titles: &[String]) -> CoachResult<Goal> {
        let mut goal = self.require_goal(goal_id).await?;
        let now = now_millis();
        let mut added = 0;
        for title in titles.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            goal.milestones
                .push(NewMilestone::titled(title).into_milestone(generate_id()?, now));
            added += 1;
        }
        if added == 0 {
            return Ok(goal);
        }
        tracing::debug!(goal_id = %goal_id, added, "Accepted milestone suggestions");
        self.save_milestones(goal, now).await
    }

    pub async fn suggest_milestones(&self, title: &str, description: Option<&str>) -> Vec<String> {
        self.coach.suggest_milestones(title, description).await
    }

    /// Split the first stalled milestone of a goal, if any.
    ///
    /// `Ok(None)` when the goal does not exist; the stored goal unchanged
    /// when nothing qualifies.
    pub async fn adjust_milestones(&self, goal_id: &str) -> CoachResult<Option<Goal>> {
        self.adjust_milestones_at(goal_id, now_millis()).await
    }

    pub async fn adjust_milestones_at(
        &self,
        goal_id: &str,
        now: DateTime<Utc>,
    ) -> CoachResult<Option<Goal>> {
        let Some(mut goal) = self.get_goal(goal_id).await? else {
            return Ok(None);
        };
        let Some(index) = find_stalled(&goal.milestones, now, &self.stall_policy) else {
            return Ok(Some(goal));
        };

        tracing::info!(
            goal_id = %goal_id,
            milestone = %goal.milestones[index].title,
            "Splitting stalled milestone"
        );
        split_milestone(&mut goal.milestones, index, generate_id()?, now);
        self.save_milestones(goal, now).await.map(Some)
    }

    // ------------------------------------------------------------------------

    async fn require_goal(&self, id: &str) -> CoachResult<Goal> {
        self.get_goal(id)
            .await?
            .ok_or_else(|| CoachError::not_found("goal", id))
    }

    async fn save_milestones(&self, goal: Goal, now: DateTime<Utc>) -> CoachResult<Goal> {
        let patch = GoalPatch {
            milestones: Some(goal.milestones),
            ..Default::default()
        };
        self.persist(&goal.id, patch, now).await
    }

    async fn persist(&self, id: &str, mut patch: GoalPatch, now: DateTime<Utc>) -> CoachResult<Goal> {
        patch.progress = None;
        if let Some(milestones) = patch.milestones.as_mut() {
            milestones.iter_mut().for_each(Milestone::normalize);
            patch.progress = Some(calculate_progress(milestones));
        }
        patch.updated_at = Some(now);

        let updated = self
            .store
            .update_goal(id, &patch)
            .await
            .or_backend("Failed to update goal")?;
        match updated {
            Some(goal) => {
                tracing::debug!(goal_id = %id, progress = goal.progress, "Goal updated");
                Ok(goal)
            }
            None => Err(CoachError::not_found("goal", id)),
        }
    }
}
