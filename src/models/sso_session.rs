use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Browser characteristics bound to an SSO session at creation time.
///
/// A later request presenting the session cookie from a different IP or
/// user agent is treated as a potential hijack and kills the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFingerprint {
    pub ip_address: String,
    pub user_agent: String,
}

/// Post-authentication bearer of identity across relying clients.
///
/// The session id doubles as the cookie value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub authenticated: bool,
    pub fingerprint: ClientFingerprint,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SsoSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn matches_fingerprint(&self, other: &ClientFingerprint) -> bool {
        self.fingerprint == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_mismatch_on_ip_change() {
        let a = ClientFingerprint {
            ip_address: "10.0.0.1".to_string(),
            user_agent: "UA-A".to_string(),
        };
        let b = ClientFingerprint {
            ip_address: "10.0.0.2".to_string(),
            user_agent: "UA-A".to_string(),
        };
        let session = SsoSession {
            session_id: "s".to_string(),
            user_id: Uuid::new_v4(),
            authenticated: true,
            fingerprint: a.clone(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(7),
            last_activity: Utc::now(),
        };
        assert!(session.matches_fingerprint(&a));
        assert!(!session.matches_fingerprint(&b));
    }
}
