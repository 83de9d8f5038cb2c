use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relying party registered with the server.
///
/// A stored secret hash marks the client as confidential; public clients
/// have no secret and authenticate their code redemptions with PKCE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
    pub name: String,
    /// Registered redirect URIs, matched exactly (no prefix or wildcard).
    pub redirect_uris: Vec<String>,
    /// Scopes this client may request. Empty means every registered scope.
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Confidential clients carry a secret and must present it at the
    /// token endpoint.
    pub fn is_confidential(&self) -> bool {
        self.client_secret_hash.is_some()
    }

    /// Check an exact match against the registered redirect URIs.
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.is_empty() || self.grant_types.iter().any(|g| g == grant_type)
    }
}
