//! Client registration.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{ClientRegistrationRequest, ClientRegistrationResponse};
use crate::error::OAuthError;
use crate::models::Client;
use crate::utils::secret::{generate_client_secret, hash_client_secret};

/// POST /clients/register
///
/// Registers a relying client. Confidential clients receive a generated
/// secret, returned exactly once; public clients get none and are expected
/// to use PKCE.
pub async fn register_client_handler(
    State(state): State<AppState>,
    Json(req): Json<ClientRegistrationRequest>,
) -> Result<(StatusCode, Json<ClientRegistrationResponse>), OAuthError> {
    if req.redirect_uris.is_empty() {
        return Err(OAuthError::InvalidRequest(
            "At least one redirect_uri is required".to_string(),
        ));
    }
    for uri in &req.redirect_uris {
        if !uri.starts_with("https://") && !uri.starts_with("http://") {
            return Err(OAuthError::InvalidRequest(format!(
                "redirect_uri must be an absolute http(s) URL: {}",
                uri
            )));
        }
    }
    for scope in &req.allowed_scopes {
        if !state.scopes.is_registered(scope) {
            return Err(OAuthError::InvalidScope(format!("Unknown scope: {}", scope)));
        }
    }

    let client_secret = req.confidential.then(generate_client_secret);
    let client_secret_hash = match &client_secret {
        Some(secret) => Some(hash_client_secret(secret)?),
        None => None,
    };

    let client = Client {
        client_id: Uuid::new_v4().to_string(),
        client_secret_hash,
        name: req.name,
        redirect_uris: req.redirect_uris,
        allowed_scopes: req.allowed_scopes,
        grant_types: req.grant_types,
        created_at: Utc::now(),
    };
    let client = state.repos.clients.create(client).await?;

    Ok((
        StatusCode::CREATED,
        Json(ClientRegistrationResponse {
            client_id: client.client_id,
            client_secret,
            name: client.name,
            redirect_uris: client.redirect_uris,
            allowed_scopes: client.allowed_scopes,
            grant_types: client.grant_types,
        }),
    ))
}
