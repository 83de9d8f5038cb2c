//! SSO session lifecycle.
//!
//! Sessions are created at login, bound to a client fingerprint, and
//! resolved on every request that carries the session cookie. A cookie
//! presented from a different fingerprint kills the session outright.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::AppState;
use crate::error::OAuthError;
use crate::models::{ClientFingerprint, SsoSession};
use crate::repositories::SsoSessionRepository;
use crate::utils::secret::generate_session_id;

/// SSO sessions live for at most seven days.
pub const SSO_SESSION_TTL_DAYS: i64 = 7;

/// Outcome of resolving a presented session cookie.
#[derive(Debug)]
pub enum SessionResolution {
    /// Valid session; attach it to the request.
    Authenticated(SsoSession),
    /// Fingerprint mismatch: the session was deleted, clear the cookie.
    Hijacked,
    /// Unknown, expired or unauthenticated session; ignore the cookie.
    Anonymous,
}

#[derive(Clone)]
pub struct SsoService {
    sessions: Arc<dyn SsoSessionRepository>,
}

impl SsoService {
    pub fn new(state: &AppState) -> Self {
        Self {
            sessions: state.repos.sso_sessions.clone(),
        }
    }

    pub fn with_repository(sessions: Arc<dyn SsoSessionRepository>) -> Self {
        Self { sessions }
    }

    /// Open a new authenticated session for a user, recording the browser
    /// fingerprint seen at login.
    pub async fn create(
        &self,
        user_id: Uuid,
        fingerprint: ClientFingerprint,
    ) -> Result<SsoSession, OAuthError> {
        let now = Utc::now();
        let session = SsoSession {
            session_id: generate_session_id(),
            user_id,
            authenticated: true,
            fingerprint,
            created_at: now,
            expires_at: now + Duration::days(SSO_SESSION_TTL_DAYS),
            last_activity: now,
        };
        self.sessions.insert(session.clone()).await?;
        Ok(session)
    }

    /// Resolve a presented session id against the fingerprint of the
    /// current request: expired or unauthenticated sessions are ignored, a
    /// fingerprint mismatch deletes the session, otherwise the activity
    /// timestamp is touched and the session returned.
    pub async fn resolve(
        &self,
        session_id: &str,
        fingerprint: &ClientFingerprint,
    ) -> Result<SessionResolution, OAuthError> {
        let session = match self.sessions.find(session_id).await? {
            Some(session) => session,
            None => return Ok(SessionResolution::Anonymous),
        };

        if !session.authenticated {
            return Ok(SessionResolution::Anonymous);
        }

        if !session.matches_fingerprint(fingerprint) {
            tracing::warn!(
                session_id,
                "session fingerprint mismatch, deleting session"
            );
            self.sessions.delete(session_id).await?;
            return Ok(SessionResolution::Hijacked);
        }

        self.sessions.touch(session_id, Utc::now()).await?;
        Ok(SessionResolution::Authenticated(session))
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), OAuthError> {
        self.sessions.delete(session_id).await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<SsoSession>, OAuthError> {
        self.sessions.list_by_user(user_id).await
    }

    /// Revoke a single session; the session must belong to the caller.
    pub async fn revoke_owned(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<(), OAuthError> {
        let session = self
            .sessions
            .find(session_id)
            .await?
            .ok_or_else(|| OAuthError::NotFound("Session not found".to_string()))?;

        if session.user_id != user_id {
            return Err(OAuthError::Forbidden(
                "Session belongs to another user".to_string(),
            ));
        }

        self.sessions.delete(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::InMemorySsoSessionRepository;

    fn service() -> SsoService {
        SsoService::with_repository(Arc::new(InMemorySsoSessionRepository::new()))
    }

    fn fp(ip: &str, ua: &str) -> ClientFingerprint {
        ClientFingerprint {
            ip_address: ip.to_string(),
            user_agent: ua.to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolve_matching_fingerprint() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let session = svc.create(user_id, fp("10.0.0.1", "UA-A")).await.unwrap();

        match svc
            .resolve(&session.session_id, &fp("10.0.0.1", "UA-A"))
            .await
            .unwrap()
        {
            SessionResolution::Authenticated(resolved) => {
                assert_eq!(resolved.user_id, user_id);
            }
            other => panic!("expected authenticated session, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_deletes_session() {
        let svc = service();
        let session = svc
            .create(Uuid::new_v4(), fp("10.0.0.1", "UA-A"))
            .await
            .unwrap();

        // Same user agent, different IP: treated as hijack.
        match svc
            .resolve(&session.session_id, &fp("10.0.0.2", "UA-A"))
            .await
            .unwrap()
        {
            SessionResolution::Hijacked => {}
            other => panic!("expected hijack resolution, got {:?}", other),
        }

        // The session is gone even for the original fingerprint.
        match svc
            .resolve(&session.session_id, &fp("10.0.0.1", "UA-A"))
            .await
            .unwrap()
        {
            SessionResolution::Anonymous => {}
            other => panic!("expected anonymous resolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_session_is_anonymous() {
        let svc = service();
        match svc.resolve("missing", &fp("1.1.1.1", "UA")).await.unwrap() {
            SessionResolution::Anonymous => {}
            other => panic!("expected anonymous resolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_revoke_owned_enforces_ownership() {
        let svc = service();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let session = svc.create(owner, fp("10.0.0.1", "UA")).await.unwrap();

        let err = svc
            .revoke_owned(stranger, &session.session_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        svc.revoke_owned(owner, &session.session_id).await.unwrap();
        assert!(svc.list(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_touch_moves_last_activity() {
        let svc = service();
        let session = svc
            .create(Uuid::new_v4(), fp("10.0.0.1", "UA"))
            .await
            .unwrap();
        let before = session.last_activity;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        svc.resolve(&session.session_id, &fp("10.0.0.1", "UA"))
            .await
            .unwrap();

        let sessions = svc.list(session.user_id).await.unwrap();
        assert!(sessions[0].last_activity > before);
    }
}
