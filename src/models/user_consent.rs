use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable record that a user has authorized a client for a set of scopes.
///
/// Unique per (user_id, client_id); a second grant replaces the scope set
/// and refreshes the timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConsent {
    pub user_id: Uuid,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserConsent {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }

    /// True when every requested scope token is in the granted set.
    /// Comparison is case-sensitive.
    pub fn covers_scopes(&self, requested: &[String]) -> bool {
        requested.iter().all(|scope| self.scopes.contains(scope))
    }
}
