//! Token exchange and introspection handlers.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Form, Json,
};
use serde_json::Value;

use crate::config::AppState;
use crate::dto::oauth::{
    IntrospectionRequest, IntrospectionResponse, TokenExchangeRequest, TokenExchangeResponse,
};
use crate::error::OAuthError;
use crate::handlers::oauth::apply_basic_auth;
use crate::services::exchange::{ExchangedTokens, TokenExchangeService};

pub(crate) fn exchange_response(exchanged: ExchangedTokens) -> TokenExchangeResponse {
    TokenExchangeResponse {
        access_token: exchanged.access_token,
        issued_token_type: exchanged.issued_token_type,
        token_type: "Bearer".to_string(),
        expires_in: exchanged.expires_in,
        refresh_token: Some(exchanged.refresh_token),
        id_token: Some(exchanged.id_token),
        scope: exchanged.scope,
    }
}

/// POST /token/exchange (RFC 8693), alias of the token endpoint's
/// token-exchange grant.
pub async fn token_exchange_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(mut req): Form<TokenExchangeRequest>,
) -> Result<Json<TokenExchangeResponse>, OAuthError> {
    apply_basic_auth(&headers, &mut req.client_id, &mut req.client_secret);

    let exchanged = TokenExchangeService::new(&state).exchange(&req).await?;
    Ok(Json(exchange_response(exchanged)))
}

/// GET /token/validate?token=…
pub async fn validate_get_handler(
    State(state): State<AppState>,
    Query(req): Query<IntrospectionRequest>,
) -> Json<IntrospectionResponse> {
    Json(introspect(&state, &req.token))
}

/// POST /token/validate (form)
pub async fn validate_post_handler(
    State(state): State<AppState>,
    Form(req): Form<IntrospectionRequest>,
) -> Json<IntrospectionResponse> {
    Json(introspect(&state, &req.token))
}

/// Introspect a token in either wire form. Invalid tokens yield a
/// non-error response with `valid: false`.
fn introspect(state: &AppState, token: &str) -> IntrospectionResponse {
    match state.tokens.verify(token) {
        Ok((claims, format)) => {
            let claims_map = match serde_json::to_value(&claims) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            };
            IntrospectionResponse {
                valid: true,
                format: Some(format.as_str().to_string()),
                claims: claims_map,
                error: None,
            }
        }
        Err(e) => IntrospectionResponse {
            valid: false,
            format: None,
            claims: None,
            error: Some(e.code().to_string()),
        },
    }
}
