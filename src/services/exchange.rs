//! RFC 8693 token exchange.
//!
//! A validated subject token (JWT or JWE, access/refresh/ID) is converted
//! into a freshly issued access + refresh + ID token set for the
//! authenticated client, optionally in encrypted (JWE) form. Scope may only
//! ever narrow relative to the subject token.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::TokenExchangeRequest;
use crate::error::OAuthError;
use crate::models::Client;
use crate::repositories::{ClientRepository, RevokedTokenRepository, UserRepository};
use crate::services::oauth::GRANT_TOKEN_EXCHANGE;
use crate::services::scope::{ScopeRegistry, DEFAULT_SCOPE};
use crate::services::token::{TokenClaims, TokenService};
use crate::utils::secret::{hash_token, verify_client_secret};

pub const TOKEN_TYPE_URN_ACCESS: &str = "urn:ietf:params:oauth:token-type:access_token";
pub const TOKEN_TYPE_URN_REFRESH: &str = "urn:ietf:params:oauth:token-type:refresh_token";
pub const TOKEN_TYPE_URN_ID: &str = "urn:ietf:params:oauth:token-type:id_token";

/// The kinds of subject token the exchange accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectTokenKind {
    AccessToken,
    RefreshToken,
    IdToken,
}

impl SubjectTokenKind {
    /// Both the RFC 8693 URN forms and the bare shorthand are accepted.
    pub fn parse(token_type: &str) -> Result<Self, OAuthError> {
        match token_type {
            "access_token" | TOKEN_TYPE_URN_ACCESS => Ok(SubjectTokenKind::AccessToken),
            "refresh_token" | TOKEN_TYPE_URN_REFRESH => Ok(SubjectTokenKind::RefreshToken),
            "id_token" | TOKEN_TYPE_URN_ID => Ok(SubjectTokenKind::IdToken),
            other => Err(OAuthError::UnsupportedTokenType(format!(
                "Unsupported subject_token_type: {}",
                other
            ))),
        }
    }
}

/// Result of a successful exchange.
#[derive(Debug)]
pub struct ExchangedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub issued_token_type: String,
    pub scope: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenExchangeService {
    users: Arc<dyn UserRepository>,
    clients: Arc<dyn ClientRepository>,
    revoked_tokens: Arc<dyn RevokedTokenRepository>,
    tokens: TokenService,
    scopes: Arc<ScopeRegistry>,
}

impl TokenExchangeService {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.repos.users.clone(),
            clients: state.repos.clients.clone(),
            revoked_tokens: state.repos.revoked_tokens.clone(),
            tokens: state.tokens.clone(),
            scopes: state.scopes.clone(),
        }
    }

    pub async fn exchange(
        &self,
        req: &TokenExchangeRequest,
    ) -> Result<ExchangedTokens, OAuthError> {
        if req.grant_type != GRANT_TOKEN_EXCHANGE {
            return Err(OAuthError::UnsupportedGrantType);
        }

        let client_id = req
            .client_id
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;
        let client = self
            .clients
            .find_by_client_id(client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        self.authenticate_client(&client, req.client_secret.as_deref())?;

        let kind = SubjectTokenKind::parse(&req.subject_token_type)?;
        let (claims, _format) = self.tokens.verify(&req.subject_token)?;
        self.check_subject_kind(kind, &claims, &req.subject_token)
            .await?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
            OAuthError::InvalidGrant("Subject token does not identify a user".to_string())
        })?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Unknown subject".to_string()))?;

        let original_scope = match claims.scope() {
            "" => DEFAULT_SCOPE.to_string(),
            scope => scope.to_string(),
        };

        let scope = match req.scope.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(requested) => {
                let normalized = self.scopes.normalize(requested);
                self.scopes.validate(&normalized)?;
                self.scopes.validate_downgrade(&normalized, &original_scope)?;
                normalized
            }
            None => original_scope,
        };
        self.scopes
            .validate_against_allowed(&scope, &client.allowed_scopes)?;

        let sub = user.id.to_string();
        let access_claims = self.tokens.access_claims(&sub, &scope);
        let refresh_claims = self.tokens.refresh_claims(&sub, &scope);
        let id_claims = self
            .tokens
            .id_claims(self.scopes.id_token_claims(&user, &scope, None), &client.client_id);

        let (access_token, refresh_token, id_token) = if req.is_encrypted_jwe {
            (
                self.tokens.encrypt(&access_claims)?,
                self.tokens.encrypt(&refresh_claims)?,
                self.tokens.encrypt(&id_claims)?,
            )
        } else {
            (
                self.tokens.sign(&access_claims)?,
                self.tokens.sign(&refresh_claims)?,
                self.tokens.sign(&id_claims)?,
            )
        };

        Ok(ExchangedTokens {
            access_token,
            refresh_token,
            id_token,
            issued_token_type: TOKEN_TYPE_URN_ACCESS.to_string(),
            scope,
            expires_in: self.tokens.access_token_expiry_secs(),
        })
    }

    /// The declared subject kind must agree with the token's own claims;
    /// rotated-out refresh tokens stay dead here too.
    async fn check_subject_kind(
        &self,
        kind: SubjectTokenKind,
        claims: &TokenClaims,
        raw_token: &str,
    ) -> Result<(), OAuthError> {
        match kind {
            SubjectTokenKind::AccessToken => {
                if !claims.is_access_token() {
                    return Err(OAuthError::InvalidGrant(
                        "Subject token is not an access token".to_string(),
                    ));
                }
            }
            SubjectTokenKind::RefreshToken => {
                if !claims.is_refresh_token() {
                    return Err(OAuthError::InvalidGrant(
                        "Subject token is not a refresh token".to_string(),
                    ));
                }
                if self
                    .revoked_tokens
                    .is_revoked(&hash_token(raw_token))
                    .await?
                {
                    return Err(OAuthError::InvalidGrant(
                        "Refresh token has been revoked".to_string(),
                    ));
                }
            }
            SubjectTokenKind::IdToken => {
                if claims.aud.is_none() {
                    return Err(OAuthError::InvalidGrant(
                        "Subject token is not an ID token".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn authenticate_client(
        &self,
        client: &Client,
        client_secret: Option<&str>,
    ) -> Result<(), OAuthError> {
        match &client.client_secret_hash {
            Some(hash) => {
                let secret = client_secret.ok_or(OAuthError::InvalidClient)?;
                if !verify_client_secret(secret, hash)? {
                    return Err(OAuthError::InvalidClient);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::token::is_jwe;
    use crate::testutil::*;

    fn exchange_request(
        client: &Client,
        secret: Option<&str>,
        subject_token: &str,
        subject_token_type: &str,
    ) -> TokenExchangeRequest {
        TokenExchangeRequest {
            grant_type: GRANT_TOKEN_EXCHANGE.to_string(),
            subject_token: subject_token.to_string(),
            subject_token_type: subject_token_type.to_string(),
            requested_token_type: None,
            scope: None,
            client_id: Some(client.client_id.clone()),
            client_secret: secret.map(String::from),
            is_encrypted_jwe: false,
        }
    }

    #[tokio::test]
    async fn test_jwt_to_jwe_exchange() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let user = seed_user(&state).await;
        let (client, secret) = seed_confidential_client(&state, &[]).await;

        let subject = state
            .tokens
            .issue_access_token(&user.id.to_string(), "openid email")
            .unwrap();

        let mut req = exchange_request(&client, Some(&secret), &subject, "access_token");
        req.is_encrypted_jwe = true;

        let exchanged = svc.exchange(&req).await.unwrap();
        assert!(is_jwe(&exchanged.access_token));
        assert!(is_jwe(&exchanged.refresh_token));
        assert!(is_jwe(&exchanged.id_token));
        assert_eq!(exchanged.issued_token_type, TOKEN_TYPE_URN_ACCESS);

        let payload = state.tokens.decrypt(&exchanged.access_token).unwrap();
        assert_eq!(payload["sub"], serde_json::json!(user.id.to_string()));
        assert_eq!(payload["scope"], serde_json::json!("openid email"));
    }

    #[tokio::test]
    async fn test_jwe_subject_to_jwt_output() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let user = seed_user(&state).await;
        let (client, secret) = seed_confidential_client(&state, &[]).await;

        let claims = state
            .tokens
            .access_claims(&user.id.to_string(), "openid email");
        let subject = state.tokens.encrypt(&claims).unwrap();

        let req = exchange_request(&client, Some(&secret), &subject, "access_token");
        let exchanged = svc.exchange(&req).await.unwrap();

        let access = state.tokens.verify_jwt(&exchanged.access_token).unwrap();
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.scope(), "openid email");

        let id = state.tokens.verify_jwt(&exchanged.id_token).unwrap();
        assert_eq!(id.aud.as_deref(), Some(client.client_id.as_str()));
        assert!(id.nonce.is_none());
    }

    #[tokio::test]
    async fn test_urn_subject_token_type_accepted() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let user = seed_user(&state).await;
        let (client, secret) = seed_confidential_client(&state, &[]).await;

        let subject = state
            .tokens
            .issue_access_token(&user.id.to_string(), "openid")
            .unwrap();

        let req = exchange_request(&client, Some(&secret), &subject, TOKEN_TYPE_URN_ACCESS);
        assert!(svc.exchange(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_scope_downgrade_enforced() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let user = seed_user(&state).await;
        let (client, secret) = seed_confidential_client(&state, &[]).await;

        let subject = state
            .tokens
            .issue_access_token(&user.id.to_string(), "openid email")
            .unwrap();

        let mut req = exchange_request(&client, Some(&secret), &subject, "access_token");
        req.scope = Some("openid email profile".to_string());
        let err = svc.exchange(&req).await.unwrap_err();
        assert_eq!(err.code(), "invalid_scope");

        req.scope = Some("openid".to_string());
        let exchanged = svc.exchange(&req).await.unwrap();
        assert_eq!(exchanged.scope, "openid");
    }

    #[tokio::test]
    async fn test_unsupported_subject_token_type() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let user = seed_user(&state).await;
        let (client, secret) = seed_confidential_client(&state, &[]).await;

        let subject = state
            .tokens
            .issue_access_token(&user.id.to_string(), "openid")
            .unwrap();

        let req = exchange_request(&client, Some(&secret), &subject, "saml2");
        let err = svc.exchange(&req).await.unwrap_err();
        assert_eq!(err.code(), "unsupported_token_type");
    }

    #[tokio::test]
    async fn test_declared_kind_must_match_token() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let user = seed_user(&state).await;
        let (client, secret) = seed_confidential_client(&state, &[]).await;

        let access = state
            .tokens
            .issue_access_token(&user.id.to_string(), "openid")
            .unwrap();

        let req = exchange_request(&client, Some(&secret), &access, "refresh_token");
        let err = svc.exchange(&req).await.unwrap_err();
        assert_eq!(err.code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_revoked_refresh_subject_rejected() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let user = seed_user(&state).await;
        let (client, secret) = seed_confidential_client(&state, &[]).await;

        let refresh = state
            .tokens
            .issue_refresh_token(&user.id.to_string(), "openid")
            .unwrap();
        state
            .repos
            .revoked_tokens
            .revoke(&hash_token(&refresh), chrono::Utc::now() + chrono::Duration::days(7))
            .await
            .unwrap();

        let req = exchange_request(&client, Some(&secret), &refresh, "refresh_token");
        let err = svc.exchange(&req).await.unwrap_err();
        assert_eq!(err.code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_client_credentials_subject_rejected() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let (client, secret) = seed_confidential_client(&state, &[]).await;

        // sub is a client_id, not a user id.
        let subject = state
            .tokens
            .issue_access_token(&client.client_id, "openid")
            .unwrap();

        let req = exchange_request(&client, Some(&secret), &subject, "access_token");
        let err = svc.exchange(&req).await.unwrap_err();
        assert_eq!(err.code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_wrong_client_secret_rejected() {
        let state = test_state();
        let svc = TokenExchangeService::new(&state);
        let user = seed_user(&state).await;
        let (client, _) = seed_confidential_client(&state, &[]).await;

        let subject = state
            .tokens
            .issue_access_token(&user.id.to_string(), "openid")
            .unwrap();

        let req = exchange_request(&client, Some("wrong"), &subject, "access_token");
        let err = svc.exchange(&req).await.unwrap_err();
        assert_eq!(err.code(), "invalid_client");
    }
}
