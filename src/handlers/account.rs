//! Account endpoints: the user-facing session and authorization manager.
//!
//! All handlers run behind the bearer-token middleware; the caller is the
//! token subject and can only see or revoke their own records.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::config::AppState;
use crate::dto::account::{
    AuthorizationInfo, AuthorizationsResponse, SessionInfo, SessionsResponse,
};
use crate::error::OAuthError;
use crate::middleware::oauth_auth::AccessContext;
use crate::services::consent::ConsentService;
use crate::services::session::SsoService;

/// GET /account/sessions
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    ctx: AccessContext,
) -> Result<Json<SessionsResponse>, OAuthError> {
    let user_id = ctx.user_id()?;
    let sessions = SsoService::new(&state).list(user_id).await?;

    Ok(Json(SessionsResponse {
        sessions: sessions.into_iter().map(SessionInfo::from).collect(),
    }))
}

/// DELETE /account/sessions/:id
pub async fn revoke_session_handler(
    State(state): State<AppState>,
    ctx: AccessContext,
    Path(session_id): Path<String>,
) -> Result<StatusCode, OAuthError> {
    let user_id = ctx.user_id()?;
    SsoService::new(&state)
        .revoke_owned(user_id, &session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /account/authorizations
pub async fn list_authorizations_handler(
    State(state): State<AppState>,
    ctx: AccessContext,
) -> Result<Json<AuthorizationsResponse>, OAuthError> {
    let user_id = ctx.user_id()?;
    let consents = ConsentService::new(&state).list(user_id).await?;

    let mut authorizations = Vec::with_capacity(consents.len());
    for consent in consents {
        let client_name = state
            .repos
            .clients
            .find_by_client_id(&consent.client_id)
            .await?
            .map(|c| c.name);
        authorizations.push(AuthorizationInfo::from_consent(consent, client_name));
    }

    Ok(Json(AuthorizationsResponse { authorizations }))
}

/// DELETE /account/authorizations/:client_id
pub async fn revoke_authorization_handler(
    State(state): State<AppState>,
    ctx: AccessContext,
    Path(client_id): Path<String>,
) -> Result<StatusCode, OAuthError> {
    let user_id = ctx.user_id()?;
    let removed = ConsentService::new(&state)
        .revoke(user_id, &client_id)
        .await?;

    if !removed {
        return Err(OAuthError::NotFound("Authorization not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::oauth_auth::oauth_auth_middleware;
    use crate::testutil::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::{delete, get};
    use axum::{middleware, Router};
    use tower::ServiceExt;

    fn account_router(state: AppState) -> Router {
        Router::new()
            .route("/account/sessions", get(list_sessions_handler))
            .route("/account/sessions/:id", delete(revoke_session_handler))
            .route("/account/authorizations", get(list_authorizations_handler))
            .route(
                "/account/authorizations/:client_id",
                delete(revoke_authorization_handler),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                oauth_auth_middleware,
            ))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_list_and_revoke_own_session() {
        let state = test_state();
        let user = seed_user(&state).await;
        let session = seed_sso_session(&state, &user).await;
        let token = state
            .tokens
            .issue_access_token(&user.id.to_string(), "openid")
            .unwrap();
        let app = account_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/account/sessions")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["sessions"].as_array().unwrap().len(), 1);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/account/sessions/{}", session.session_id))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_cannot_revoke_foreign_session() {
        let state = test_state();
        let owner = seed_user(&state).await;
        let stranger = seed_user(&state).await;
        let session = seed_sso_session(&state, &owner).await;
        let token = state
            .tokens
            .issue_access_token(&stranger.id.to_string(), "openid")
            .unwrap();
        let app = account_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/account/sessions/{}", session.session_id))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_list_and_revoke_authorizations() {
        let state = test_state();
        let user = seed_user(&state).await;
        let client = seed_public_client(&state).await;
        seed_consent(&state, &user, &client, "openid email").await;
        let token = state
            .tokens
            .issue_access_token(&user.id.to_string(), "openid")
            .unwrap();
        let app = account_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/account/authorizations")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let authorizations = body["authorizations"].as_array().unwrap();
        assert_eq!(authorizations.len(), 1);
        assert_eq!(authorizations[0]["client_id"], client.client_id.as_str());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/account/authorizations/{}", client.client_id))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // Revoking again is a 404.
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/account/authorizations/{}", client.client_id))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_client_credentials_token_cannot_use_account_endpoints() {
        let state = test_state();
        let token = state
            .tokens
            .issue_access_token("some-client-id", "openid")
            .unwrap();
        let app = account_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/account/sessions")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
