//! End-user authentication handlers: register, login (with authorize-flow
//! continuation) and logout.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::config::AppState;
use crate::dto::auth::{
    LoginRequest, LogoutRequest, LogoutResponse, RegisterRequest, RegisterResponse,
    TokenPairResponse,
};
use crate::error::AuthError;
use crate::handlers::oauth::{build_code_redirect, consent_url};
use crate::middleware::sso::{fingerprint_from_headers, session_cookie, SSO_COOKIE_NAME};
use crate::services::auth::AuthService;
use crate::services::oauth::{LoginContinuation, OAuthService};
use crate::services::scope::DEFAULT_SCOPE;
use crate::services::session::SsoService;

/// POST /auth/register
pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let user = AuthService::new(&state)
        .register(&req.email, &req.name, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            email: user.email,
            name: user.name,
        }),
    ))
}

/// POST /auth/login
///
/// Verifies credentials and opens an SSO session (cookie). When the login
/// continues a pending authorize flow (`session_id` present) the response
/// is the code-issuance or consent redirect; otherwise a directly minted
/// token pair is returned.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Response {
    let user = match AuthService::new(&state).login(&req.email, &req.password).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    let fingerprint = fingerprint_from_headers(&headers);
    let session = match SsoService::new(&state).create(user.id, fingerprint).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    let jar = jar.add(session_cookie(
        &session.session_id,
        state.config.secure_cookies,
    ));

    if let Some(oauth_session_id) = req.session_id.as_deref() {
        let continuation = OAuthService::new(&state)
            .continue_after_login(oauth_session_id, user.id)
            .await;
        return match continuation {
            Ok(LoginContinuation::RedirectCode {
                redirect_uri,
                code,
                state,
            }) => (jar, build_code_redirect(&redirect_uri, &code, state.as_deref()))
                .into_response(),
            Ok(LoginContinuation::ConsentRequired { params }) => {
                (jar, Redirect::temporary(&consent_url(&params))).into_response()
            }
            Err(e) => (jar, e).into_response(),
        };
    }

    // Login-only flow: no pending authorize request, mint a token pair
    // directly.
    let sub = user.id.to_string();
    let access_token = match state.tokens.issue_access_token(&sub, DEFAULT_SCOPE) {
        Ok(token) => token,
        Err(e) => return (jar, e).into_response(),
    };
    let refresh_token = match state.tokens.issue_refresh_token(&sub, DEFAULT_SCOPE) {
        Ok(token) => token,
        Err(e) => return (jar, e).into_response(),
    };

    (
        jar,
        Json(TokenPairResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: state.tokens.access_token_expiry_secs(),
        }),
    )
        .into_response()
}

/// POST /auth/logout
///
/// Deletes the SSO session and clears the cookie. With a
/// `post_logout_redirect_uri` the response redirects there, otherwise a
/// JSON success body is returned.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<LogoutRequest>>,
) -> Response {
    if let Some(cookie) = jar.get(SSO_COOKIE_NAME) {
        if let Err(e) = SsoService::new(&state).delete(cookie.value()).await {
            return e.into_response();
        }
    }

    let mut removal = Cookie::new(SSO_COOKIE_NAME, "");
    removal.set_path("/");
    removal.make_removal();
    let jar = jar.add(removal);

    let redirect = body
        .and_then(|Json(req)| req.post_logout_redirect_uri)
        .filter(|uri| !uri.is_empty());

    match redirect {
        Some(uri) => (jar, Redirect::temporary(&uri)).into_response(),
        None => (jar, Json(LogoutResponse { success: true })).into_response(),
    }
}
