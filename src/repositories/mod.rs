//! Storage contracts for the authorization server.
//!
//! Persistence is defined only by the semantic operations the core invokes.
//! Any backing store may implement these traits as long as it honors the
//! atomicity contracts called out per method: authorization-code redemption
//! is compare-and-delete, consent writes are composite-key upserts, and a
//! read that returns an expired record must be treated (and reported) as
//! absent.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::{AuthorizationCode, Client, OAuthSession, SsoSession, User, UserConsent};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Fails when the email is already taken.
    async fn create(&self, user: User) -> Result<User, OAuthError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, OAuthError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, OAuthError>;
    async fn update(&self, user: User) -> Result<(), OAuthError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, client: Client) -> Result<Client, OAuthError>;
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, OAuthError>;
}

#[async_trait]
pub trait AuthorizationCodeRepository: Send + Sync {
    async fn insert(&self, code: AuthorizationCode) -> Result<(), OAuthError>;

    /// Atomically remove and return the code record. When two requests
    /// present the same code concurrently, at most one receives `Some`.
    /// Expired records count as absent.
    async fn take_by_code_hash(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, OAuthError>;
}

#[async_trait]
pub trait OAuthSessionRepository: Send + Sync {
    async fn insert(&self, session: OAuthSession) -> Result<(), OAuthError>;
    /// Expired sessions read as absent and are deleted opportunistically.
    async fn find(&self, session_id: &str) -> Result<Option<OAuthSession>, OAuthError>;
    async fn update(&self, session: OAuthSession) -> Result<(), OAuthError>;
    async fn delete(&self, session_id: &str) -> Result<(), OAuthError>;
}

#[async_trait]
pub trait SsoSessionRepository: Send + Sync {
    async fn insert(&self, session: SsoSession) -> Result<(), OAuthError>;
    /// Expired sessions read as absent and are deleted opportunistically.
    async fn find(&self, session_id: &str) -> Result<Option<SsoSession>, OAuthError>;
    /// Best-effort activity touch; lost updates are acceptable.
    async fn touch(&self, session_id: &str, at: DateTime<Utc>) -> Result<(), OAuthError>;
    async fn delete(&self, session_id: &str) -> Result<(), OAuthError>;
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<SsoSession>, OAuthError>;
}

#[async_trait]
pub trait ConsentRepository: Send + Sync {
    /// Create or replace the consent for (user_id, client_id). Two
    /// concurrent upserts converge on a single stored record.
    async fn upsert(&self, consent: UserConsent) -> Result<UserConsent, OAuthError>;
    /// Expired consents read as absent.
    async fn find(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Option<UserConsent>, OAuthError>;
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<UserConsent>, OAuthError>;
    /// Returns true when a record was removed.
    async fn delete(&self, user_id: Uuid, client_id: &str) -> Result<bool, OAuthError>;
}

/// Replay protection for rotated refresh tokens. Entries live exactly as
/// long as the token they shadow.
#[async_trait]
pub trait RevokedTokenRepository: Send + Sync {
    async fn revoke(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), OAuthError>;
    async fn is_revoked(&self, token_hash: &str) -> Result<bool, OAuthError>;
}

/// The full set of stores the server runs against, shared through
/// `AppState`.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub codes: Arc<dyn AuthorizationCodeRepository>,
    pub oauth_sessions: Arc<dyn OAuthSessionRepository>,
    pub sso_sessions: Arc<dyn SsoSessionRepository>,
    pub consents: Arc<dyn ConsentRepository>,
    pub revoked_tokens: Arc<dyn RevokedTokenRepository>,
}

impl Repositories {
    /// Bundle the in-process implementations.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(memory::InMemoryUserRepository::new()),
            clients: Arc::new(memory::InMemoryClientRepository::new()),
            codes: Arc::new(memory::InMemoryAuthorizationCodeRepository::new()),
            oauth_sessions: Arc::new(memory::InMemoryOAuthSessionRepository::new()),
            sso_sessions: Arc::new(memory::InMemorySsoSessionRepository::new()),
            consents: Arc::new(memory::InMemoryConsentRepository::new()),
            revoked_tokens: Arc::new(memory::InMemoryRevokedTokenRepository::new()),
        }
    }
}
