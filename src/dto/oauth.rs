//! Request/response DTOs for the OAuth2/OIDC endpoints.
//!
//! Shapes follow RFC 6749 (core), RFC 7636 (PKCE), RFC 8693 (token
//! exchange) and OpenID Connect Discovery.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Authorization endpoint
// ============================================================================

/// GET /oauth/authorize query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub prompt: Option<String>,
}

// ============================================================================
// Token endpoint
// ============================================================================

/// POST /oauth/token form body. Which fields are required depends on the
/// grant type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    // Token-exchange grant parameters (the exchange endpoint is an alias
    // of this endpoint).
    pub subject_token: Option<String>,
    pub subject_token_type: Option<String>,
    pub requested_token_type: Option<String>,
    pub is_encrypted_jwe: Option<bool>,
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

impl From<crate::services::oauth::IssuedTokens> for TokenResponse {
    fn from(issued: crate::services::oauth::IssuedTokens) -> Self {
        Self {
            access_token: issued.access_token,
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in,
            refresh_token: issued.refresh_token,
            id_token: issued.id_token,
            scope: issued.scope,
        }
    }
}

// ============================================================================
// Token exchange (RFC 8693)
// ============================================================================

/// POST /token/exchange form body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeRequest {
    pub grant_type: String,
    pub subject_token: String,
    pub subject_token_type: String,
    pub requested_token_type: Option<String>,
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Non-standard: emit the issued tokens as JWEs instead of JWTs.
    #[serde(default)]
    pub is_encrypted_jwe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub issued_token_type: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

// ============================================================================
// Introspection
// ============================================================================

/// GET/POST /token/validate input.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Consent
// ============================================================================

/// Data for rendering the consent decision, GET /oauth/consent.
#[derive(Debug, Clone, Serialize)]
pub struct ConsentScreenInfo {
    pub client_id: String,
    pub client_name: String,
    pub scopes: Vec<ScopeInfo>,
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeInfo {
    pub scope: String,
    pub description: String,
}

/// POST /oauth/consent form body: the user's decision plus the authorize
/// parameters carried through the consent screen.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentForm {
    pub approved: bool,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Present when the consent screen was reached from the login flow.
    pub session_id: Option<String>,
}

// ============================================================================
// Client registration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    pub name: String,
    pub redirect_uris: Vec<String>,
    /// Confidential clients get a generated secret; public clients rely on
    /// PKCE.
    #[serde(default)]
    pub confidential: bool,
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    /// Plain text, only returned once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,
}

// ============================================================================
// Discovery
// ============================================================================

/// GET /.well-known/openid-configuration response.
#[derive(Debug, Clone, Serialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

impl OpenIdConfiguration {
    pub fn new(issuer: &str, scopes_supported: Vec<String>, claims_supported: Vec<String>) -> Self {
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{}/oauth/authorize", issuer),
            token_endpoint: format!("{}/oauth/token", issuer),
            userinfo_endpoint: format!("{}/oauth/userinfo", issuer),
            jwks_uri: format!("{}/.well-known/jwks.json", issuer),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
                "client_credentials".to_string(),
                "urn:ietf:params:oauth:grant-type:token-exchange".to_string(),
            ],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            scopes_supported,
            token_endpoint_auth_methods_supported: vec![
                "client_secret_post".to_string(),
                "client_secret_basic".to_string(),
            ],
            claims_supported,
            code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
        }
    }
}
