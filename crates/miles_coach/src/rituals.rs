use std::sync::Arc;

use chrono::{DateTime, Utc};
use miles_core::{
    generate_id, now_millis, start_of_day, CoachError, CoachResult, RitualCompletion, RitualKind,
};
use miles_store::Store;

use crate::OrBackend;

/// Which of today's rituals are done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RitualDay {
    pub morning: Option<RitualCompletion>,
    pub evening: Option<RitualCompletion>,
}

impl RitualDay {
    pub fn get(&self, kind: RitualKind) -> Option<&RitualCompletion> {
        match kind {
            RitualKind::Morning => self.morning.as_ref(),
            RitualKind::Evening => self.evening.as_ref(),
        }
    }
}

/// Morning intentions and evening reflections, at most one of each per
/// UTC day.
pub struct RitualService {
    store: Arc<dyn Store>,
}

impl RitualService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn complete_ritual(
        &self,
        owner_id: &str,
        kind: RitualKind,
        reflection: Option<&str>,
    ) -> CoachResult<RitualCompletion> {
        self.complete_ritual_at(owner_id, kind, reflection, now_millis())
            .await
    }

    /// [`Self::complete_ritual`] with an explicit clock.
    pub async fn complete_ritual_at(
        &self,
        owner_id: &str,
        kind: RitualKind,
        reflection: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoachResult<RitualCompletion> {
        if self.day_at(owner_id, now).await?.get(kind).is_some() {
            return Err(CoachError::conflict(format!(
                "{} ritual already completed today",
                kind.as_str()
            )));
        }

        let completion = RitualCompletion {
            id: generate_id()?,
            owner_id: owner_id.to_string(),
            kind,
            completed_at: now,
            reflection: reflection
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        };
        self.store
            .record_ritual(&completion)
            .await
            .or_backend("Failed to save ritual completion")?;
        tracing::info!(owner_id, kind = kind.as_str(), "Ritual completed");
        Ok(completion)
    }

    pub async fn today(&self, owner_id: &str) -> CoachResult<RitualDay> {
        self.day_at(owner_id, now_millis()).await
    }

    pub async fn day_at(&self, owner_id: &str, now: DateTime<Utc>) -> CoachResult<RitualDay> {
        let since = start_of_day(now);
        let completions = self
            .store
            .list_rituals_since(owner_id, since)
            .await
            .or_backend("Failed to load ritual completions")?;

        let mut day = RitualDay::default();
        // Newest first; keep the earliest of the day if duplicates slipped in.
        for c in completions.into_iter().filter(|c| start_of_day(c.completed_at) == since) {
            match c.kind {
                RitualKind::Morning => day.morning = Some(c),
                RitualKind::Evening => day.evening = Some(c),
            }
        }
        Ok(day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use miles_store::{DocumentStore, SqliteStore};

    fn morning_of(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 7, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_second_completion_same_day_is_conflict() {
        let svc = RitualService::new(Arc::new(DocumentStore::new()));
        svc.complete_ritual_at("alice", RitualKind::Morning, Some(" Focus "), morning_of(1))
            .await
            .unwrap();

        let err = svc
            .complete_ritual_at("alice", RitualKind::Morning, None, morning_of(1) + Duration::hours(10))
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Conflict(_)));
        assert_eq!(err.to_string(), "morning ritual already completed today");

        // The other ritual and the next day are unaffected.
        svc.complete_ritual_at("alice", RitualKind::Evening, None, morning_of(1) + Duration::hours(14))
            .await
            .unwrap();
        svc.complete_ritual_at("alice", RitualKind::Morning, None, morning_of(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_day_view_on_sqlite() {
        let store = Arc::new(SqliteStore::new(":memory:").await.unwrap());
        let svc = RitualService::new(store);
        let done = svc
            .complete_ritual_at("alice", RitualKind::Morning, Some("Ship it"), morning_of(3))
            .await
            .unwrap();
        assert_eq!(done.reflection.as_deref(), Some("Ship it"));

        let day = svc.day_at("alice", morning_of(3) + Duration::hours(5)).await.unwrap();
        assert_eq!(day.morning, Some(done));
        assert!(day.evening.is_none());

        let next = svc.day_at("alice", morning_of(4)).await.unwrap();
        assert_eq!(next, RitualDay::default());
        assert_eq!(svc.day_at("bob", morning_of(3)).await.unwrap(), RitualDay::default());
    }

    #[tokio::test]
    async fn test_blank_reflection_is_dropped() {
        let svc = RitualService::new(Arc::new(DocumentStore::new()));
        let done = svc
            .complete_ritual_at("alice", RitualKind::Evening, Some("   "), morning_of(5))
            .await
            .unwrap();
        assert!(done.reflection.is_none());
    }
}
