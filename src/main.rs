mod config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;
#[cfg(test)]
mod testutil;
mod utils;

use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppState, Config};
use crate::handlers::{
    authorize_handler, consent_screen_handler, consent_submit_handler, jwks_handler,
    list_authorizations_handler, list_sessions_handler, login_handler, logout_handler,
    openid_configuration_handler, register_client_handler, register_handler,
    revoke_authorization_handler, revoke_session_handler, token_exchange_handler, token_handler,
    userinfo_handler, validate_get_handler, validate_post_handler,
};
use crate::middleware::{oauth_auth_middleware, sso_session_middleware};
use crate::repositories::Repositories;
use crate::services::keys::KeyMaterial;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Create the application router with all routes configured.
///
/// ## Public routes
/// - GET /.well-known/openid-configuration - Discovery document
/// - GET /.well-known/jwks.json - Public signing keys
/// - GET /oauth/authorize - Start the authorization-code flow
/// - POST /oauth/token - Issue / refresh / exchange tokens
/// - GET /oauth/userinfo - Identity claims (Bearer)
/// - GET/POST /oauth/consent - Render / submit consent
/// - POST /token/exchange - RFC 8693 exchange (alias of /oauth/token)
/// - GET/POST /token/validate - Introspect a JWT or JWE
/// - POST /auth/register, /auth/login, /auth/logout - End-user auth
/// - POST /clients/register - Client registration
/// - GET /health - Liveness
///
/// ## Bearer-protected routes
/// - GET /account/sessions, DELETE /account/sessions/:id
/// - GET /account/authorizations, DELETE /account/authorizations/:client_id
pub fn create_router(state: AppState) -> Router {
    let oauth_routes = Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/token", post(token_handler))
        .route("/userinfo", get(userinfo_handler))
        .route(
            "/consent",
            get(consent_screen_handler).post(consent_submit_handler),
        );

    let wellknown_routes = Router::new()
        .route("/openid-configuration", get(openid_configuration_handler))
        .route("/jwks.json", get(jwks_handler));

    let token_routes = Router::new()
        .route("/exchange", post(token_exchange_handler))
        .route(
            "/validate",
            get(validate_get_handler).post(validate_post_handler),
        );

    let auth_routes = Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler));

    // Account management - requires a Bearer access token
    let account_routes = Router::new()
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/:id", delete(revoke_session_handler))
        .route("/authorizations", get(list_authorizations_handler))
        .route(
            "/authorizations/:client_id",
            delete(revoke_authorization_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            oauth_auth_middleware,
        ));

    let client_routes = Router::new().route("/register", post(register_client_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/oauth", oauth_routes)
        .nest("/.well-known", wellknown_routes)
        .nest("/token", token_routes)
        .nest("/auth", auth_routes)
        .nest("/account", account_routes)
        .nest("/clients", client_routes)
        // The session cookie is resolved for every request; the middleware
        // is a no-op for requests without it.
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            sso_session_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oidc_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Signing material: loaded from disk, generated on first run.
    let keys = KeyMaterial::load_or_generate(&config.keys_dir)?;

    let addr = config.socket_addr()?;
    let state = AppState::new(Repositories::in_memory(), keys, config)?;
    let app = create_router(state);

    tracing::info!(
        "OIDC server v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
