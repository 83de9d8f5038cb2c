//! Protocol engine for the authorization-code flow and the token grants.
//!
//! The authorize pipeline validates the request, applies prompt handling,
//! and lands in one of four places: a code redirect (SSO plus covering
//! consent), the consent screen, the login page (via a transient
//! OAuthSession), or an error. The token endpoint dispatches on grant_type
//! and leans on the token service and scope registry for everything
//! cryptographic.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{AuthorizeRequest, TokenRequest};
use crate::error::OAuthError;
use crate::models::{AuthorizationCode, Client, OAuthSession, SsoSession};
use crate::repositories::{
    AuthorizationCodeRepository, ClientRepository, OAuthSessionRepository,
    RevokedTokenRepository, UserRepository,
};
use crate::services::consent::ConsentService;
use crate::services::scope::{ScopeRegistry, DEFAULT_SCOPE};
use crate::services::token::TokenService;
use crate::utils::pkce::{
    is_supported_method, validate_code_verifier, verify_pkce, PKCE_METHOD_PLAIN,
};
use crate::utils::secret::{generate_authorization_code, generate_session_id, hash_token};

/// Authorization codes live for at most ten minutes.
pub const AUTHORIZATION_CODE_TTL_SECS: i64 = 600;

/// Pre-authentication OAuth sessions live for at most ten minutes.
pub const OAUTH_SESSION_TTL_SECS: i64 = 600;

/// Upper bound on the nonce parameter.
pub const MAX_NONCE_LENGTH: usize = 512;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Validated authorize-request parameters, bound to the issued code and
/// carried through consent and login continuations.
#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    pub client_id: String,
    pub redirect_uri: String,
    /// Normalized scope.
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Where an authorize request ends up.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Auto-approval: redirect back to the client with a fresh code.
    RedirectCode {
        redirect_uri: String,
        code: String,
        state: Option<String>,
    },
    /// Redirectable failure: error delivered to the registered URI.
    RedirectError {
        redirect_uri: String,
        error: OAuthError,
        state: Option<String>,
    },
    /// Authenticated but no covering consent: show the consent screen.
    ConsentRequired { params: AuthorizeParams },
    /// Anonymous browser: send to login carrying the OAuth session id.
    LoginRequired { session_id: String },
    /// The client or redirect URI could not be trusted; answer directly.
    DirectError(OAuthError),
}

/// Result of completing a login that continues an authorize flow.
#[derive(Debug)]
pub enum LoginContinuation {
    RedirectCode {
        redirect_uri: String,
        code: String,
        state: Option<String>,
    },
    ConsentRequired { params: AuthorizeParams },
}

/// The user's consent decision together with the carried parameters.
#[derive(Debug, Clone)]
pub struct ConsentSubmission {
    pub approved: bool,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug)]
pub enum ConsentOutcome {
    Approved {
        redirect_uri: String,
        code: String,
        state: Option<String>,
    },
    Denied {
        redirect_uri: String,
        state: Option<String>,
    },
}

/// Tokens produced by a grant.
#[derive(Debug)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct OAuthService {
    users: Arc<dyn UserRepository>,
    clients: Arc<dyn ClientRepository>,
    codes: Arc<dyn AuthorizationCodeRepository>,
    oauth_sessions: Arc<dyn OAuthSessionRepository>,
    revoked_tokens: Arc<dyn RevokedTokenRepository>,
    consent: ConsentService,
    tokens: TokenService,
    scopes: Arc<ScopeRegistry>,
}

impl OAuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.repos.users.clone(),
            clients: state.repos.clients.clone(),
            codes: state.repos.codes.clone(),
            oauth_sessions: state.repos.oauth_sessions.clone(),
            revoked_tokens: state.repos.revoked_tokens.clone(),
            consent: ConsentService::new(state),
            tokens: state.tokens.clone(),
            scopes: state.scopes.clone(),
        }
    }

    // ========================================================================
    // Authorization endpoint
    // ========================================================================

    /// Run the full authorize validation pipeline and pick the continuation.
    pub async fn authorize(
        &self,
        req: &AuthorizeRequest,
        session: Option<&SsoSession>,
    ) -> AuthorizeOutcome {
        // Client identity and redirect URI come first: until both check
        // out, no redirect can be trusted and errors are answered directly.
        let client = match self.clients.find_by_client_id(&req.client_id).await {
            Ok(Some(client)) => client,
            Ok(None) => return AuthorizeOutcome::DirectError(OAuthError::InvalidClient),
            Err(e) => return AuthorizeOutcome::DirectError(e),
        };
        if !client.has_redirect_uri(&req.redirect_uri) {
            return AuthorizeOutcome::DirectError(OAuthError::InvalidRequest(
                "redirect_uri does not match any registered URI".to_string(),
            ));
        }

        let redirect_err = |error: OAuthError| AuthorizeOutcome::RedirectError {
            redirect_uri: req.redirect_uri.clone(),
            error,
            state: req.state.clone(),
        };

        if req.response_type != "code" {
            return redirect_err(OAuthError::UnsupportedResponseType);
        }

        if let Some(nonce) = &req.nonce {
            if nonce.len() > MAX_NONCE_LENGTH {
                return redirect_err(OAuthError::InvalidRequest(
                    "nonce exceeds maximum length".to_string(),
                ));
            }
        }

        let mut scope = self.scopes.normalize(req.scope.as_deref().unwrap_or(""));
        if scope.is_empty() {
            scope = DEFAULT_SCOPE.to_string();
        }
        if let Err(e) = self.scopes.validate(&scope) {
            return redirect_err(e);
        }
        if let Err(e) = self
            .scopes
            .validate_against_allowed(&scope, &client.allowed_scopes)
        {
            return redirect_err(e);
        }

        let code_challenge_method = match (&req.code_challenge, &req.code_challenge_method) {
            (Some(_), Some(method)) if !is_supported_method(method) => {
                return redirect_err(OAuthError::InvalidRequest(
                    "code_challenge_method must be S256 or plain".to_string(),
                ));
            }
            (Some(_), Some(method)) => Some(method.clone()),
            (Some(_), None) => Some(PKCE_METHOD_PLAIN.to_string()),
            (None, _) => None,
        };

        let params = AuthorizeParams {
            client_id: client.client_id.clone(),
            redirect_uri: req.redirect_uri.clone(),
            scope,
            state: req.state.clone(),
            nonce: req.nonce.clone().filter(|n| !n.is_empty()),
            code_challenge: req.code_challenge.clone(),
            code_challenge_method,
        };

        let prompt = req.prompt.as_deref().unwrap_or("");
        let force_login = prompt == "login" || prompt == "select_account";
        let force_consent = prompt == "consent";

        let session = if force_login {
            None
        } else {
            session.filter(|s| s.authenticated)
        };

        match session {
            Some(sso) => {
                let consented = if force_consent {
                    false
                } else {
                    match self
                        .consent
                        .has_consent(sso.user_id, &params.client_id, &params.scope)
                        .await
                    {
                        Ok(consented) => consented,
                        Err(e) => return redirect_err(e),
                    }
                };

                if consented {
                    match self.issue_code(sso.user_id, &params).await {
                        Ok(code) => AuthorizeOutcome::RedirectCode {
                            redirect_uri: params.redirect_uri,
                            code,
                            state: params.state,
                        },
                        Err(e) => redirect_err(e),
                    }
                } else if prompt == "none" {
                    redirect_err(OAuthError::ConsentRequired)
                } else {
                    AuthorizeOutcome::ConsentRequired { params }
                }
            }
            None => {
                if prompt == "none" {
                    return redirect_err(OAuthError::LoginRequired);
                }
                match self.create_oauth_session(&params).await {
                    Ok(session) => AuthorizeOutcome::LoginRequired {
                        session_id: session.session_id,
                    },
                    Err(e) => redirect_err(e),
                }
            }
        }
    }

    /// Mint an authorization code bound to the request parameters.
    async fn issue_code(
        &self,
        user_id: Uuid,
        params: &AuthorizeParams,
    ) -> Result<String, OAuthError> {
        let code = generate_authorization_code();
        let now = Utc::now();

        self.codes
            .insert(AuthorizationCode {
                code_hash: hash_token(&code),
                client_id: params.client_id.clone(),
                user_id,
                redirect_uri: params.redirect_uri.clone(),
                scope: params.scope.clone(),
                nonce: params.nonce.clone(),
                code_challenge: params.code_challenge.clone(),
                code_challenge_method: params.code_challenge_method.clone(),
                expires_at: now + Duration::seconds(AUTHORIZATION_CODE_TTL_SECS),
                created_at: now,
            })
            .await?;

        Ok(code)
    }

    async fn create_oauth_session(
        &self,
        params: &AuthorizeParams,
    ) -> Result<OAuthSession, OAuthError> {
        let now = Utc::now();
        let session = OAuthSession {
            session_id: generate_session_id(),
            client_id: params.client_id.clone(),
            redirect_uri: params.redirect_uri.clone(),
            scope: params.scope.clone(),
            state: params.state.clone(),
            response_type: "code".to_string(),
            nonce: params.nonce.clone(),
            code_challenge: params.code_challenge.clone(),
            code_challenge_method: params.code_challenge_method.clone(),
            authenticated: false,
            user_id: None,
            expires_at: now + Duration::seconds(OAUTH_SESSION_TTL_SECS),
            created_at: now,
        };
        self.oauth_sessions.insert(session.clone()).await?;
        Ok(session)
    }

    /// Complete a login that was reached from /oauth/authorize: bind the
    /// user to the pending OAuth session and continue to code issuance or
    /// the consent screen.
    pub async fn continue_after_login(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<LoginContinuation, OAuthError> {
        let mut session = self
            .oauth_sessions
            .find(session_id)
            .await?
            .ok_or_else(|| {
                OAuthError::InvalidGrant("Login session expired or not found".to_string())
            })?;

        session.authenticated = true;
        session.user_id = Some(user_id);
        self.oauth_sessions.update(session.clone()).await?;

        let params = AuthorizeParams {
            client_id: session.client_id.clone(),
            redirect_uri: session.redirect_uri.clone(),
            scope: session.scope.clone(),
            state: session.state.clone(),
            nonce: session.nonce.clone(),
            code_challenge: session.code_challenge.clone(),
            code_challenge_method: session.code_challenge_method.clone(),
        };

        if self
            .consent
            .has_consent(user_id, &params.client_id, &params.scope)
            .await?
        {
            let code = self.issue_code(user_id, &params).await?;
            // The OAuth session is redeemed by the code.
            self.oauth_sessions.delete(session_id).await?;
            Ok(LoginContinuation::RedirectCode {
                redirect_uri: params.redirect_uri,
                code,
                state: params.state,
            })
        } else {
            Ok(LoginContinuation::ConsentRequired { params })
        }
    }

    /// Apply a consent decision. The carried parameters are re-validated
    /// against the client registration; an untrusted client or redirect
    /// URI fails outright instead of redirecting.
    pub async fn complete_consent(
        &self,
        user_id: Uuid,
        submission: &ConsentSubmission,
    ) -> Result<ConsentOutcome, OAuthError> {
        let client = self
            .clients
            .find_by_client_id(&submission.client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        if !client.has_redirect_uri(&submission.redirect_uri) {
            return Err(OAuthError::InvalidRequest(
                "redirect_uri does not match any registered URI".to_string(),
            ));
        }

        if !submission.approved {
            return Ok(ConsentOutcome::Denied {
                redirect_uri: submission.redirect_uri.clone(),
                state: submission.state.clone(),
            });
        }

        let mut scope = self.scopes.normalize(&submission.scope);
        if scope.is_empty() {
            scope = DEFAULT_SCOPE.to_string();
        }
        self.scopes.validate(&scope)?;
        self.scopes
            .validate_against_allowed(&scope, &client.allowed_scopes)?;

        self.consent
            .grant(user_id, &client.client_id, &scope)
            .await?;

        let params = AuthorizeParams {
            client_id: client.client_id.clone(),
            redirect_uri: submission.redirect_uri.clone(),
            scope,
            state: submission.state.clone(),
            nonce: submission.nonce.clone().filter(|n| !n.is_empty()),
            code_challenge: submission.code_challenge.clone(),
            code_challenge_method: submission.code_challenge_method.clone(),
        };
        let code = self.issue_code(user_id, &params).await?;

        // A pending login session, if any, is redeemed by this code.
        if let Some(session_id) = &submission.session_id {
            self.oauth_sessions.delete(session_id).await?;
        }

        Ok(ConsentOutcome::Approved {
            redirect_uri: params.redirect_uri,
            code,
            state: params.state,
        })
    }

    // ========================================================================
    // Token endpoint
    // ========================================================================

    /// Dispatch a token request on its grant type. Token exchange has its
    /// own service and is routed before this point.
    pub async fn token_grant(&self, req: &TokenRequest) -> Result<IssuedTokens, OAuthError> {
        match req.grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => self.authorization_code_grant(req).await,
            GRANT_REFRESH_TOKEN => self.refresh_token_grant(req).await,
            GRANT_CLIENT_CREDENTIALS => self.client_credentials_grant(req).await,
            _ => Err(OAuthError::UnsupportedGrantType),
        }
    }

    /// Redeem an authorization code for access, refresh and ID tokens.
    async fn authorization_code_grant(
        &self,
        req: &TokenRequest,
    ) -> Result<IssuedTokens, OAuthError> {
        let code = req
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("code is required".to_string()))?;
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
        if !client.allows_grant_type(GRANT_AUTHORIZATION_CODE) {
            return Err(OAuthError::InvalidGrant(
                "Grant type not allowed for this client".to_string(),
            ));
        }

        // Compare-and-delete: the code ceases to exist before any token is
        // minted, so a concurrent redemption of the same code loses here.
        let auth_code = self
            .codes
            .take_by_code_hash(&hash_token(code))
            .await?
            .ok_or_else(|| {
                OAuthError::InvalidGrant("Invalid or expired authorization code".to_string())
            })?;

        if auth_code.client_id != client.client_id {
            return Err(OAuthError::InvalidGrant(
                "Authorization code was not issued to this client".to_string(),
            ));
        }
        if req.redirect_uri.as_deref() != Some(auth_code.redirect_uri.as_str()) {
            return Err(OAuthError::InvalidGrant(
                "redirect_uri does not match the authorization request".to_string(),
            ));
        }

        if let Some(challenge) = &auth_code.code_challenge {
            let verifier = req.code_verifier.as_deref().ok_or_else(|| {
                OAuthError::InvalidGrant("code_verifier is required".to_string())
            })?;
            if !validate_code_verifier(verifier) {
                return Err(OAuthError::InvalidGrant(
                    "Invalid code_verifier format".to_string(),
                ));
            }
            let method = auth_code
                .code_challenge_method
                .as_deref()
                .unwrap_or(PKCE_METHOD_PLAIN);
            if !verify_pkce(verifier, challenge, method) {
                return Err(OAuthError::InvalidGrant(
                    "code_verifier does not match code_challenge".to_string(),
                ));
            }
        }

        let user = self
            .users
            .find_by_id(auth_code.user_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Unknown user".to_string()))?;
        let sub = user.id.to_string();

        let access_token = self.tokens.issue_access_token(&sub, &auth_code.scope)?;
        let refresh_token = self.tokens.issue_refresh_token(&sub, &auth_code.scope)?;
        let id_token = if ScopeRegistry::split(&auth_code.scope)
            .iter()
            .any(|s| s == "openid")
        {
            let identity =
                self.scopes
                    .id_token_claims(&user, &auth_code.scope, auth_code.nonce.as_deref());
            Some(self.tokens.issue_id_token(identity, &client.client_id)?)
        } else {
            None
        };

        Ok(IssuedTokens {
            access_token,
            refresh_token: Some(refresh_token),
            id_token,
            scope: auth_code.scope,
            expires_in: self.tokens.access_token_expiry_secs(),
        })
    }

    /// Rotate a refresh token, optionally downgrading its scope. The
    /// presented token is one-time use: its hash goes on the revocation
    /// list for the remainder of its lifetime.
    async fn refresh_token_grant(&self, req: &TokenRequest) -> Result<IssuedTokens, OAuthError> {
        let refresh_token = req.refresh_token.as_deref().ok_or_else(|| {
            OAuthError::InvalidRequest("refresh_token is required".to_string())
        })?;
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
        if !client.allows_grant_type(GRANT_REFRESH_TOKEN) {
            return Err(OAuthError::InvalidGrant(
                "Grant type not allowed for this client".to_string(),
            ));
        }

        let (claims, _) = self
            .tokens
            .verify(refresh_token)
            .map_err(|_| OAuthError::InvalidGrant("Invalid refresh token".to_string()))?;
        if !claims.is_refresh_token() {
            return Err(OAuthError::InvalidGrant(
                "Presented token is not a refresh token".to_string(),
            ));
        }

        let token_hash = hash_token(refresh_token);
        if self.revoked_tokens.is_revoked(&token_hash).await? {
            return Err(OAuthError::InvalidGrant(
                "Refresh token has been revoked".to_string(),
            ));
        }

        let original_scope = claims.scope().to_string();
        let scope = match req.scope.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(requested) => {
                let normalized = self.scopes.normalize(requested);
                if normalized.is_empty() {
                    return Err(OAuthError::InvalidScope(
                        "Requested scope names no registered scopes".to_string(),
                    ));
                }
                self.scopes.validate_downgrade(&normalized, &original_scope)?;
                normalized
            }
            None => original_scope,
        };

        // Rotation: the presented token may never be replayed.
        let expires_at =
            DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
        self.revoked_tokens.revoke(&token_hash, expires_at).await?;

        let access_token = self.tokens.issue_access_token(&claims.sub, &scope)?;
        let refresh_token = self.tokens.issue_refresh_token(&claims.sub, &scope)?;

        Ok(IssuedTokens {
            access_token,
            refresh_token: Some(refresh_token),
            id_token: None,
            scope,
            expires_in: self.tokens.access_token_expiry_secs(),
        })
    }

    /// Machine-to-machine grant: the client itself is the subject. No
    /// refresh token, no ID token, no identity claims.
    async fn client_credentials_grant(
        &self,
        req: &TokenRequest,
    ) -> Result<IssuedTokens, OAuthError> {
        let client_id = req
            .client_id
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;
        let client_secret = req.client_secret.as_deref().ok_or_else(|| {
            OAuthError::InvalidRequest("client_secret is required".to_string())
        })?;

        let client = self
            .clients
            .find_by_client_id(client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        if !client.is_confidential() {
            return Err(OAuthError::InvalidClient);
        }
        self.authenticate_client(&client, Some(client_secret))?;
        if !client.allows_grant_type(GRANT_CLIENT_CREDENTIALS) {
            return Err(OAuthError::InvalidGrant(
                "Grant type not allowed for this client".to_string(),
            ));
        }

        let requested = req
            .scope
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("openid");
        let scope = self.scopes.normalize(requested);
        self.scopes.validate(&scope)?;
        self.scopes
            .validate_against_allowed(&scope, &client.allowed_scopes)?;

        let access_token = self.tokens.issue_access_token(&client.client_id, &scope)?;

        Ok(IssuedTokens {
            access_token,
            refresh_token: None,
            id_token: None,
            scope,
            expires_in: self.tokens.access_token_expiry_secs(),
        })
    }

    /// Confidential clients must present their secret; public clients have
    /// none to present.
    fn authenticate_client(
        &self,
        client: &Client,
        client_secret: Option<&str>,
    ) -> Result<(), OAuthError> {
        match &client.client_secret_hash {
            Some(hash) => {
                let secret = client_secret.ok_or(OAuthError::InvalidClient)?;
                if !crate::utils::secret::verify_client_secret(secret, hash)? {
                    return Err(OAuthError::InvalidClient);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}
