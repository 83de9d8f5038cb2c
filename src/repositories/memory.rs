//! In-process repository implementations.
//!
//! Each store is a `tokio::sync::RwLock` map. Holding the write lock across
//! a whole operation is what realizes the atomicity contracts: code
//! redemption is a single `remove`, consent upsert is a single keyed insert.
//! Expired records are treated as absent wherever they are read and removed
//! on the spot.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::{AuthorizationCode, Client, OAuthSession, SsoSession, User, UserConsent};
use crate::repositories::{
    AuthorizationCodeRepository, ClientRepository, ConsentRepository, OAuthSessionRepository,
    RevokedTokenRepository, SsoSessionRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    by_id: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, OAuthError> {
        let mut map = self.by_id.write().await;
        if map.values().any(|u| u.email == user.email) {
            return Err(OAuthError::InvalidRequest(
                "Email already registered".to_string(),
            ));
        }
        map.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, OAuthError> {
        Ok(self.by_id.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, OAuthError> {
        Ok(self
            .by_id
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update(&self, user: User) -> Result<(), OAuthError> {
        let mut map = self.by_id.write().await;
        match map.get_mut(&user.id) {
            Some(slot) => {
                *slot = user;
                Ok(())
            }
            None => Err(OAuthError::NotFound("User not found".to_string())),
        }
    }
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    by_client_id: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn create(&self, client: Client) -> Result<Client, OAuthError> {
        let mut map = self.by_client_id.write().await;
        if map.contains_key(&client.client_id) {
            return Err(OAuthError::InvalidRequest(
                "client_id already registered".to_string(),
            ));
        }
        map.insert(client.client_id.clone(), client.clone());
        Ok(client)
    }

    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, OAuthError> {
        Ok(self.by_client_id.read().await.get(client_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAuthorizationCodeRepository {
    by_hash: RwLock<HashMap<String, AuthorizationCode>>,
}

impl InMemoryAuthorizationCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationCodeRepository for InMemoryAuthorizationCodeRepository {
    async fn insert(&self, code: AuthorizationCode) -> Result<(), OAuthError> {
        let mut map = self.by_hash.write().await;
        if map.contains_key(&code.code_hash) {
            return Err(OAuthError::ServerError(
                "Authorization code collision".to_string(),
            ));
        }
        map.insert(code.code_hash.clone(), code);
        Ok(())
    }

    async fn take_by_code_hash(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, OAuthError> {
        // Single remove under the write lock: the second of two concurrent
        // redemptions observes None.
        let removed = self.by_hash.write().await.remove(code_hash);
        Ok(removed.filter(|code| !code.is_expired()))
    }
}

#[derive(Default)]
pub struct InMemoryOAuthSessionRepository {
    by_id: RwLock<HashMap<String, OAuthSession>>,
}

impl InMemoryOAuthSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OAuthSessionRepository for InMemoryOAuthSessionRepository {
    async fn insert(&self, session: OAuthSession) -> Result<(), OAuthError> {
        self.by_id
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<OAuthSession>, OAuthError> {
        let mut map = self.by_id.write().await;
        match map.get(session_id) {
            Some(session) if session.is_expired() => {
                map.remove(session_id);
                Ok(None)
            }
            Some(session) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    async fn update(&self, session: OAuthSession) -> Result<(), OAuthError> {
        let mut map = self.by_id.write().await;
        match map.get_mut(&session.session_id) {
            Some(slot) => {
                *slot = session;
                Ok(())
            }
            None => Err(OAuthError::NotFound("Login session not found".to_string())),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), OAuthError> {
        self.by_id.write().await.remove(session_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySsoSessionRepository {
    by_id: RwLock<HashMap<String, SsoSession>>,
}

impl InMemorySsoSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SsoSessionRepository for InMemorySsoSessionRepository {
    async fn insert(&self, session: SsoSession) -> Result<(), OAuthError> {
        self.by_id
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<SsoSession>, OAuthError> {
        let mut map = self.by_id.write().await;
        match map.get(session_id) {
            Some(session) if session.is_expired() => {
                map.remove(session_id);
                Ok(None)
            }
            Some(session) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    async fn touch(&self, session_id: &str, at: DateTime<Utc>) -> Result<(), OAuthError> {
        if let Some(session) = self.by_id.write().await.get_mut(session_id) {
            session.last_activity = at;
        }
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), OAuthError> {
        self.by_id.write().await.remove(session_id);
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<SsoSession>, OAuthError> {
        let map = self.by_id.read().await;
        let mut sessions: Vec<SsoSession> = map
            .values()
            .filter(|s| s.user_id == user_id && !s.is_expired())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

#[derive(Default)]
pub struct InMemoryConsentRepository {
    by_key: RwLock<HashMap<(Uuid, String), UserConsent>>,
}

impl InMemoryConsentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentRepository for InMemoryConsentRepository {
    async fn upsert(&self, consent: UserConsent) -> Result<UserConsent, OAuthError> {
        // Keyed insert under the write lock: the composite uniqueness on
        // (user_id, client_id) holds under concurrent approvals.
        self.by_key.write().await.insert(
            (consent.user_id, consent.client_id.clone()),
            consent.clone(),
        );
        Ok(consent)
    }

    async fn find(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Option<UserConsent>, OAuthError> {
        let key = (user_id, client_id.to_string());
        let mut map = self.by_key.write().await;
        match map.get(&key) {
            Some(consent) if consent.is_expired() => {
                map.remove(&key);
                Ok(None)
            }
            Some(consent) => Ok(Some(consent.clone())),
            None => Ok(None),
        }
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<UserConsent>, OAuthError> {
        let map = self.by_key.read().await;
        let mut consents: Vec<UserConsent> = map
            .values()
            .filter(|c| c.user_id == user_id && !c.is_expired())
            .cloned()
            .collect();
        consents.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(consents)
    }

    async fn delete(&self, user_id: Uuid, client_id: &str) -> Result<bool, OAuthError> {
        Ok(self
            .by_key
            .write()
            .await
            .remove(&(user_id, client_id.to_string()))
            .is_some())
    }
}

#[derive(Default)]
pub struct InMemoryRevokedTokenRepository {
    by_hash: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryRevokedTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevokedTokenRepository for InMemoryRevokedTokenRepository {
    async fn revoke(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), OAuthError> {
        let mut map = self.by_hash.write().await;
        // Entries for tokens that have expired on their own can go; the
        // token is unusable either way.
        map.retain(|_, exp| *exp > Utc::now());
        map.insert(token_hash.to_string(), expires_at);
        Ok(())
    }

    async fn is_revoked(&self, token_hash: &str) -> Result<bool, OAuthError> {
        Ok(self.by_hash.read().await.contains_key(token_hash))
    }
}
