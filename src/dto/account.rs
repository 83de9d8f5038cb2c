//! DTOs for the user-facing session and authorization manager.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{SsoSession, UserConsent};

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<SsoSession> for SessionInfo {
    fn from(session: SsoSession) -> Self {
        Self {
            session_id: session.session_id,
            ip_address: session.fingerprint.ip_address,
            user_agent: session.fingerprint.user_agent,
            created_at: session.created_at,
            expires_at: session.expires_at,
            last_activity: session.last_activity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationInfo {
    pub client_id: String,
    pub client_name: Option<String>,
    pub scopes: Vec<String>,
    pub granted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthorizationInfo {
    pub fn from_consent(consent: UserConsent, client_name: Option<String>) -> Self {
        Self {
            client_id: consent.client_id,
            client_name,
            scopes: consent.scopes,
            granted_at: consent.granted_at,
            expires_at: consent.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationsResponse {
    pub authorizations: Vec<AuthorizationInfo>,
}
