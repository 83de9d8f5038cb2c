use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single-use credential bridging the authorize and token endpoints.
///
/// Stored keyed by the SHA-256 hash of the code; the plaintext code is
/// handed to the client exactly once in the redirect. Redemption removes
/// the record atomically, so a second presentation of the same code finds
/// nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code_hash: String,
    pub client_id: String,
    pub user_id: Uuid,
    pub redirect_uri: String,
    /// Space-delimited, already normalized at authorize time.
    pub scope: String,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
