//! Shared fixtures for service and handler tests.

use uuid::Uuid;

use crate::config::{AppState, Config};
use crate::models::{Client, ClientFingerprint, SsoSession, User};
use crate::repositories::Repositories;
use crate::services::session::SsoService;
use crate::services::token::tests::{test_keys, TEST_ISSUER};
use crate::utils::password::hash_password;
use crate::utils::secret::{generate_client_secret, hash_client_secret};

pub(crate) fn test_config() -> Config {
    Config {
        mongodb_uri: "mongodb://localhost:27017".to_string(),
        database_name: "oidc_server_test".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        issuer_url: TEST_ISSUER.to_string(),
        keys_dir: "keys".into(),
        access_token_expiry_secs: 900,
        refresh_token_expiry_secs: 604800,
        session_secret: "test-secret".to_string(),
        secure_cookies: false,
    }
}

pub(crate) fn test_state() -> AppState {
    AppState::new(Repositories::in_memory(), test_keys().clone(), test_config()).unwrap()
}

pub(crate) async fn seed_user(state: &AppState) -> User {
    let mut user = User::new(
        format!("user-{}@example.com", Uuid::new_v4()),
        "Alice Example".to_string(),
        hash_password("password123").unwrap(),
    );
    user.email_verified = true;
    state.repos.users.create(user).await.unwrap()
}

/// A public (PKCE) client with one registered redirect URI.
pub(crate) async fn seed_public_client(state: &AppState) -> Client {
    let client = Client {
        client_id: format!("client-{}", Uuid::new_v4()),
        client_secret_hash: None,
        name: "Test App".to_string(),
        redirect_uris: vec!["https://client.example/cb".to_string()],
        allowed_scopes: vec![],
        grant_types: vec![],
        created_at: chrono::Utc::now(),
    };
    state.repos.clients.create(client).await.unwrap()
}

/// A confidential client; returns the plaintext secret alongside.
pub(crate) async fn seed_confidential_client(
    state: &AppState,
    allowed_scopes: &[&str],
) -> (Client, String) {
    let secret = generate_client_secret();
    let client = Client {
        client_id: format!("client-{}", Uuid::new_v4()),
        client_secret_hash: Some(hash_client_secret(&secret).unwrap()),
        name: "Confidential App".to_string(),
        redirect_uris: vec!["https://confidential.example/cb".to_string()],
        allowed_scopes: allowed_scopes.iter().map(|s| s.to_string()).collect(),
        grant_types: vec![],
        created_at: chrono::Utc::now(),
    };
    let client = state.repos.clients.create(client).await.unwrap();
    (client, secret)
}

pub(crate) async fn seed_consent(state: &AppState, user: &User, client: &Client, scope: &str) {
    crate::services::consent::ConsentService::new(state)
        .grant(user.id, &client.client_id, scope)
        .await
        .unwrap();
}

pub(crate) fn test_fingerprint() -> ClientFingerprint {
    ClientFingerprint {
        ip_address: "10.0.0.1".to_string(),
        user_agent: "UA-Test".to_string(),
    }
}

pub(crate) async fn seed_sso_session(state: &AppState, user: &User) -> SsoSession {
    SsoService::new(state)
        .create(user.id, test_fingerprint())
        .await
        .unwrap()
}
