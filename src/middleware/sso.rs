//! SSO session middleware.
//!
//! Every request may carry the session cookie. The middleware resolves it:
//! expired or unauthenticated sessions are ignored, a fingerprint mismatch
//! deletes the session and clears the cookie, and a valid session is
//! attached to the request extensions with its activity touched.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::AppState;
use crate::models::ClientFingerprint;
use crate::services::session::{SessionResolution, SsoService, SSO_SESSION_TTL_DAYS};

pub const SSO_COOKIE_NAME: &str = "oauth_sso_session";

/// Client fingerprint for the current request: first X-Forwarded-For entry
/// (the client address as seen by the edge) plus the user agent.
pub fn fingerprint_from_headers(headers: &HeaderMap) -> ClientFingerprint {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_default();

    ClientFingerprint {
        ip_address,
        user_agent,
    }
}

/// Build the SSO cookie for a freshly created session.
pub fn session_cookie(session_id: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((SSO_COOKIE_NAME, session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::days(SSO_SESSION_TTL_DAYS))
        .build()
}

pub async fn sso_session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let session_id = match jar.get(SSO_COOKIE_NAME) {
        Some(cookie) => cookie.value().to_string(),
        None => return next.run(request).await,
    };

    let fingerprint = fingerprint_from_headers(request.headers());
    let sso = SsoService::new(&state);

    match sso.resolve(&session_id, &fingerprint).await {
        Ok(SessionResolution::Authenticated(session)) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Ok(SessionResolution::Hijacked) => {
            // Session already deleted; the request proceeds
            // unauthenticated and the browser loses the cookie.
            let mut response = next.run(request).await;
            let mut removal = Cookie::new(SSO_COOKIE_NAME, "");
            removal.set_path("/");
            removal.make_removal();
            if let Ok(value) = HeaderValue::from_str(&removal.to_string()) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            response
        }
        Ok(SessionResolution::Anonymous) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SsoSession;
    use crate::testutil::*;
    use axum::{middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn whoami(session: Option<Extension<SsoSession>>) -> String {
        match session {
            Some(Extension(session)) => session.user_id.to_string(),
            None => "anonymous".to_string(),
        }
    }

    fn test_router(state: crate::config::AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                sso_session_middleware,
            ))
            .with_state(state)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_cookie_attaches_session() {
        let state = test_state();
        let user = seed_user(&state).await;
        let session = seed_sso_session(&state, &user).await;
        let app = test_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::COOKIE, format!("{}={}", SSO_COOKIE_NAME, session.session_id))
                    .header("x-forwarded-for", "10.0.0.1")
                    .header(header::USER_AGENT, "UA-Test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_string(response).await, user.id.to_string());
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_clears_cookie_and_proceeds_anonymous() {
        let state = test_state();
        let user = seed_user(&state).await;
        let session = seed_sso_session(&state, &user).await;
        let app = test_router(state.clone());

        // Same cookie, different source address.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::COOKIE, format!("{}={}", SSO_COOKIE_NAME, session.session_id))
                    .header("x-forwarded-for", "10.0.0.2")
                    .header(header::USER_AGENT, "UA-Test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("removal cookie must be set")
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with(SSO_COOKIE_NAME));
        assert!(set_cookie.contains("Max-Age=0"));
        assert_eq!(body_string(response).await, "anonymous");

        // The session is gone server-side as well.
        assert!(state
            .repos
            .sso_sessions
            .find(&session.session_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_cookie_is_anonymous() {
        let state = test_state();
        let app = test_router(state);

        let response = app
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(body_string(response).await, "anonymous");
    }

    #[test]
    fn test_fingerprint_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("UA"));

        let fp = fingerprint_from_headers(&headers);
        assert_eq!(fp.ip_address, "203.0.113.7");
        assert_eq!(fp.user_agent, "UA");
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc123", true);
        let rendered = cookie.to_string();
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("Max-Age=604800"));
    }
}
