//! Consent cache.
//!
//! Grants are durable per (user, client) and expire after a year by
//! default; checking consent is a subset test of the requested scope
//! tokens against the granted set.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::AppState;
use crate::error::OAuthError;
use crate::models::UserConsent;
use crate::repositories::ConsentRepository;
use crate::services::scope::ScopeRegistry;

/// Default lifetime of a consent grant.
pub const CONSENT_TTL_DAYS: i64 = 365;

#[derive(Clone)]
pub struct ConsentService {
    consents: Arc<dyn ConsentRepository>,
}

impl ConsentService {
    pub fn new(state: &AppState) -> Self {
        Self {
            consents: state.repos.consents.clone(),
        }
    }

    pub fn with_repository(consents: Arc<dyn ConsentRepository>) -> Self {
        Self { consents }
    }

    /// True iff a non-expired consent exists for (user, client) and the
    /// requested scope is a subset of the granted scopes.
    pub async fn has_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
        scope: &str,
    ) -> Result<bool, OAuthError> {
        let requested = ScopeRegistry::split(scope);
        match self.consents.find(user_id, client_id).await? {
            Some(consent) => Ok(consent.covers_scopes(&requested)),
            None => Ok(false),
        }
    }

    /// Record a grant. A second grant for the same (user, client) replaces
    /// the previous scope set and restarts the expiry clock.
    pub async fn grant(
        &self,
        user_id: Uuid,
        client_id: &str,
        scope: &str,
    ) -> Result<UserConsent, OAuthError> {
        let now = Utc::now();
        let consent = UserConsent {
            user_id,
            client_id: client_id.to_string(),
            scopes: ScopeRegistry::split(scope),
            granted_at: now,
            expires_at: Some(now + Duration::days(CONSENT_TTL_DAYS)),
        };
        self.consents.upsert(consent).await
    }

    /// Revoke the consent a user holds for a client. Returns false when no
    /// consent existed.
    pub async fn revoke(&self, user_id: Uuid, client_id: &str) -> Result<bool, OAuthError> {
        self.consents.delete(user_id, client_id).await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<UserConsent>, OAuthError> {
        self.consents.list_by_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::InMemoryConsentRepository;

    fn service() -> ConsentService {
        ConsentService::with_repository(Arc::new(InMemoryConsentRepository::new()))
    }

    #[tokio::test]
    async fn test_has_consent_requires_scope_subset() {
        let svc = service();
        let user_id = Uuid::new_v4();

        svc.grant(user_id, "c1", "openid email").await.unwrap();

        assert!(svc.has_consent(user_id, "c1", "openid").await.unwrap());
        assert!(svc.has_consent(user_id, "c1", "openid email").await.unwrap());
        assert!(!svc
            .has_consent(user_id, "c1", "openid email profile")
            .await
            .unwrap());
        assert!(!svc.has_consent(user_id, "c2", "openid").await.unwrap());
    }

    #[tokio::test]
    async fn test_second_grant_replaces_scopes() {
        let svc = service();
        let user_id = Uuid::new_v4();

        svc.grant(user_id, "c1", "openid email").await.unwrap();
        svc.grant(user_id, "c1", "openid profile").await.unwrap();

        assert!(svc.has_consent(user_id, "c1", "openid profile").await.unwrap());
        assert!(!svc.has_consent(user_id, "c1", "email").await.unwrap());
        assert_eq!(svc.list(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_removes_grant() {
        let svc = service();
        let user_id = Uuid::new_v4();

        svc.grant(user_id, "c1", "openid").await.unwrap();
        assert!(svc.revoke(user_id, "c1").await.unwrap());
        assert!(!svc.has_consent(user_id, "c1", "openid").await.unwrap());
        assert!(!svc.revoke(user_id, "c1").await.unwrap());
    }
}
