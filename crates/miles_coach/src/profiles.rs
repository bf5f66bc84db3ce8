use std::sync::Arc;

use miles_core::validate::require_text;
use miles_core::{now_millis, AuthSession, CoachError, CoachResult, UserPatch, UserProfile};
use miles_store::Store;

use crate::OrBackend;

/// User profiles keyed by the auth provider's user id.
pub struct ProfileService {
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create the profile on first sign-in, otherwise refresh `last_login`.
    pub async fn record_sign_in(
        &self,
        session: &AuthSession,
        display_name: Option<&str>,
    ) -> CoachResult<UserProfile> {
        require_text("user id", &session.user_id)?;
        let now = now_millis();

        if self.get_profile(&session.user_id).await?.is_some() {
            let patch = UserPatch {
                last_login: Some(now),
                ..Default::default()
            };
            return self.update_profile(&session.user_id, patch).await;
        }

        let profile = UserProfile {
            id: session.user_id.clone(),
            email: session.email.clone(),
            display_name: display_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            created_at: now,
            last_login: now,
            is_onboarded: false,
        };
        self.store
            .create_user(&profile)
            .await
            .or_backend("Failed to create user profile")?;
        tracing::info!(user_id = %profile.id, "User profile created");
        Ok(profile)
    }

    pub async fn get_profile(&self, id: &str) -> CoachResult<Option<UserProfile>> {
        self.store
            .get_user(id)
            .await
            .or_backend("Failed to fetch user profile")
    }

    pub async fn update_profile(&self, id: &str, patch: UserPatch) -> CoachResult<UserProfile> {
        if let Some(email) = &patch.email {
            require_text("email", email)?;
        }
        self.store
            .update_user(id, &patch)
            .await
            .or_backend("Failed to update user profile")?
            .ok_or_else(|| CoachError::not_found("user", id))
    }

    pub async fn complete_onboarding(&self, id: &str) -> CoachResult<UserProfile> {
        let patch = UserPatch {
            is_onboarded: Some(true),
            ..Default::default()
        };
        self.update_profile(id, patch).await
    }

    pub async fn delete_profile(&self, id: &str) -> CoachResult<()> {
        self.store
            .delete_user(id)
            .await
            .or_backend("Failed to delete user profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miles_store::DocumentStore;

    fn session() -> AuthSession {
        AuthSession {
            user_id: "uid-1".into(),
            email: "sam@example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_profile() {
        let svc = ProfileService::new(Arc::new(DocumentStore::new()));
        let profile = svc.record_sign_in(&session(), Some(" Sam ")).await.unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Sam"));
        assert!(!profile.is_onboarded);
        assert_eq!(profile.created_at, profile.last_login);
    }

    #[tokio::test]
    async fn test_repeat_sign_in_keeps_profile() {
        let svc = ProfileService::new(Arc::new(DocumentStore::new()));
        let first = svc.record_sign_in(&session(), Some("Sam")).await.unwrap();
        svc.complete_onboarding("uid-1").await.unwrap();

        let again = svc.record_sign_in(&session(), Some("Other")).await.unwrap();
        assert_eq!(again.display_name.as_deref(), Some("Sam"));
        assert!(again.is_onboarded);
        assert_eq!(again.created_at, first.created_at);
        assert!(again.last_login >= first.last_login);
    }

    #[tokio::test]
    async fn test_update_missing_profile_is_not_found() {
        let svc = ProfileService::new(Arc::new(DocumentStore::new()));
        assert!(svc.complete_onboarding("ghost").await.unwrap_err().is_not_found());
        svc.delete_profile("ghost").await.unwrap();
    }
}
