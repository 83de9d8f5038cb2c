//! DTOs for the end-user /auth endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Present when the login continues a pending authorize flow.
    pub session_id: Option<String>,
}

/// Direct token pair returned by a login that is not part of an authorize
/// flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogoutRequest {
    pub post_logout_redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}
