//! HTTP handlers for the OAuth2/OIDC protocol endpoints:
//! authorize, token, userinfo, consent, discovery and JWKS.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{
    AuthorizeRequest, ConsentScreenInfo, OpenIdConfiguration, ScopeInfo, TokenExchangeRequest,
    TokenRequest, TokenResponse,
};
use crate::error::OAuthError;
use crate::models::SsoSession;
use crate::services::exchange::TokenExchangeService;
use crate::services::keys::JwkSet;
use crate::services::oauth::{
    AuthorizeOutcome, AuthorizeParams, ConsentOutcome, ConsentSubmission, OAuthService,
    GRANT_TOKEN_EXCHANGE,
};

// ============================================================================
// Authorization endpoint
// ============================================================================

/// GET /oauth/authorize
///
/// Runs the authorize pipeline and translates the outcome into a redirect
/// (code, consent screen, login page, or error) or a direct JSON error
/// when the client or redirect URI cannot be trusted.
pub async fn authorize_handler(
    State(state): State<AppState>,
    session: Option<Extension<SsoSession>>,
    Query(req): Query<AuthorizeRequest>,
) -> Response {
    let oauth = OAuthService::new(&state);
    let session = session.map(|Extension(s)| s);

    match oauth.authorize(&req, session.as_ref()).await {
        AuthorizeOutcome::RedirectCode {
            redirect_uri,
            code,
            state,
        } => build_code_redirect(&redirect_uri, &code, state.as_deref()),
        AuthorizeOutcome::RedirectError {
            redirect_uri,
            error,
            state,
        } => build_error_redirect(&redirect_uri, &error, state.as_deref()),
        AuthorizeOutcome::ConsentRequired { params } => {
            Redirect::temporary(&consent_url(&params)).into_response()
        }
        AuthorizeOutcome::LoginRequired { session_id } => {
            let url = format!("/auth/login?session_id={}", urlencoding::encode(&session_id));
            Redirect::temporary(&url).into_response()
        }
        AuthorizeOutcome::DirectError(error) => error.into_response(),
    }
}

/// Redirect back to the client with the authorization code, echoing state
/// verbatim when present.
pub(crate) fn build_code_redirect(
    redirect_uri: &str,
    code: &str,
    state: Option<&str>,
) -> Response {
    let mut url = redirect_uri.to_string();
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&format!("code={}", urlencoding::encode(code)));
    if let Some(state) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    Redirect::temporary(&url).into_response()
}

/// Deliver a protocol error to the registered redirect URI.
pub(crate) fn build_error_redirect(
    redirect_uri: &str,
    error: &OAuthError,
    state: Option<&str>,
) -> Response {
    let mut url = redirect_uri.to_string();
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&format!(
        "error={}&error_description={}",
        urlencoding::encode(error.code()),
        urlencoding::encode(&error.to_string())
    ));
    if let Some(state) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    Redirect::temporary(&url).into_response()
}

/// Consent-screen URL carrying the authorize parameters.
pub(crate) fn consent_url(params: &AuthorizeParams) -> String {
    let mut url = format!(
        "/oauth/consent?client_id={}&redirect_uri={}&scope={}",
        urlencoding::encode(&params.client_id),
        urlencoding::encode(&params.redirect_uri),
        urlencoding::encode(&params.scope),
    );
    if let Some(state) = &params.state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    if let Some(nonce) = &params.nonce {
        url.push_str(&format!("&nonce={}", urlencoding::encode(nonce)));
    }
    if let Some(challenge) = &params.code_challenge {
        url.push_str(&format!("&code_challenge={}", urlencoding::encode(challenge)));
    }
    if let Some(method) = &params.code_challenge_method {
        url.push_str(&format!(
            "&code_challenge_method={}",
            urlencoding::encode(method)
        ));
    }
    url
}

// ============================================================================
// Token endpoint
// ============================================================================

/// POST /oauth/token
///
/// Form-encoded. Dispatches on grant_type; the token-exchange grant is
/// routed to its own service. Client credentials arrive in the form body
/// (client_secret_post) or the Authorization header (client_secret_basic).
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(mut req): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    apply_basic_auth(&headers, &mut req.client_id, &mut req.client_secret);

    if req.grant_type == GRANT_TOKEN_EXCHANGE {
        let exchange_req = exchange_request_from(&req)?;
        let exchanged = TokenExchangeService::new(&state)
            .exchange(&exchange_req)
            .await?;
        return Ok(Json(super::exchange::exchange_response(exchanged)).into_response());
    }

    let issued = OAuthService::new(&state).token_grant(&req).await?;
    Ok(Json(TokenResponse::from(issued)).into_response())
}

/// Pull client credentials out of an HTTP Basic Authorization header when
/// the form body did not carry them.
pub(crate) fn apply_basic_auth(
    headers: &HeaderMap,
    client_id: &mut Option<String>,
    client_secret: &mut Option<String>,
) {
    if client_id.is_some() && client_secret.is_some() {
        return;
    }

    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return;
    };

    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return;
    };
    if let Some((id, secret)) = decoded.split_once(':') {
        if client_id.is_none() {
            *client_id = Some(id.to_string());
        }
        if client_secret.is_none() {
            *client_secret = Some(secret.to_string());
        }
    }
}

fn exchange_request_from(req: &TokenRequest) -> Result<TokenExchangeRequest, OAuthError> {
    Ok(TokenExchangeRequest {
        grant_type: req.grant_type.clone(),
        subject_token: req
            .subject_token
            .clone()
            .ok_or_else(|| OAuthError::InvalidRequest("subject_token is required".to_string()))?,
        subject_token_type: req.subject_token_type.clone().ok_or_else(|| {
            OAuthError::InvalidRequest("subject_token_type is required".to_string())
        })?,
        requested_token_type: req.requested_token_type.clone(),
        scope: req.scope.clone(),
        client_id: req.client_id.clone(),
        client_secret: req.client_secret.clone(),
        is_encrypted_jwe: req.is_encrypted_jwe.unwrap_or(false),
    })
}

// ============================================================================
// UserInfo endpoint
// ============================================================================

/// GET /oauth/userinfo (Bearer)
///
/// Accepts either token form, detected by segment count, and returns the
/// identity claims unlocked by the token's embedded scope.
pub async fn userinfo_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Map<String, Value>>, OAuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OAuthError::InvalidToken("Authorization header required".to_string()))?;
    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::InvalidToken("Bearer token required".to_string()))?;

    let (claims, _) = state.tokens.verify(token)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| OAuthError::InvalidToken("Token does not identify a user".to_string()))?;
    let user = state
        .repos
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| OAuthError::InvalidToken("Unknown user".to_string()))?;

    Ok(Json(state.scopes.filter_claims(&user, claims.scope())))
}

// ============================================================================
// Consent endpoints
// ============================================================================

/// Query parameters carried to the consent screen.
#[derive(Debug, Deserialize)]
pub struct ConsentScreenQuery {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
}

/// GET /oauth/consent
///
/// Returns the data a consent page renders: client name and the requested
/// scopes with their descriptions. Requires an authenticated SSO session.
pub async fn consent_screen_handler(
    State(state): State<AppState>,
    session: Option<Extension<SsoSession>>,
    Query(query): Query<ConsentScreenQuery>,
) -> Result<Json<ConsentScreenInfo>, OAuthError> {
    if session.is_none() {
        return Err(OAuthError::LoginRequired);
    }

    let client = state
        .repos
        .clients
        .find_by_client_id(&query.client_id)
        .await?
        .ok_or(OAuthError::InvalidClient)?;

    let scope = state.scopes.normalize(&query.scope);
    let scopes = scope
        .split_whitespace()
        .map(|token| ScopeInfo {
            scope: token.to_string(),
            description: state
                .scopes
                .description(token)
                .unwrap_or_default()
                .to_string(),
        })
        .collect();

    Ok(Json(ConsentScreenInfo {
        client_id: client.client_id,
        client_name: client.name,
        scopes,
        redirect_uri: query.redirect_uri,
        state: query.state,
    }))
}

/// POST /oauth/consent
///
/// Applies the user's decision: approval upserts the consent and redirects
/// with a fresh code; denial redirects with access_denied, state preserved.
pub async fn consent_submit_handler(
    State(state): State<AppState>,
    session: Option<Extension<SsoSession>>,
    Form(form): Form<crate::dto::oauth::ConsentForm>,
) -> Response {
    let Some(Extension(session)) = session else {
        return OAuthError::LoginRequired.into_response();
    };

    let submission = ConsentSubmission {
        approved: form.approved,
        client_id: form.client_id,
        redirect_uri: form.redirect_uri,
        scope: form.scope,
        state: form.state,
        nonce: form.nonce,
        code_challenge: form.code_challenge,
        code_challenge_method: form.code_challenge_method,
        session_id: form.session_id,
    };

    match OAuthService::new(&state)
        .complete_consent(session.user_id, &submission)
        .await
    {
        Ok(ConsentOutcome::Approved {
            redirect_uri,
            code,
            state,
        }) => build_code_redirect(&redirect_uri, &code, state.as_deref()),
        Ok(ConsentOutcome::Denied {
            redirect_uri,
            state,
        }) => build_error_redirect(&redirect_uri, &OAuthError::AccessDenied, state.as_deref()),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Discovery & JWKS
// ============================================================================

/// GET /.well-known/openid-configuration
pub async fn openid_configuration_handler(
    State(state): State<AppState>,
) -> Json<OpenIdConfiguration> {
    Json(OpenIdConfiguration::new(
        &state.config.issuer_url,
        state.scopes.scopes_supported(),
        state.scopes.claims_supported(),
    ))
}

/// GET /.well-known/jwks.json
pub async fn jwks_handler(State(state): State<AppState>) -> Json<JwkSet> {
    Json(state.keys.jwks())
}
