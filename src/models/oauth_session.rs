use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transient pre-authentication state for the authorize flow.
///
/// Created when an anonymous browser hits /oauth/authorize, carried through
/// the login page by id, and redeemed for an authorization code once the
/// user has authenticated. Never outlives its ten-minute window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSession {
    pub session_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub response_type: String,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OAuthSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
