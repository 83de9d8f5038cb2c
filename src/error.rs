use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Protocol-level errors for the OAuth2/OIDC endpoints.
///
/// Every variant maps onto one of the RFC 6749 / OIDC error codes; the code
/// is what goes on the wire (JSON body or redirect query parameter), the
/// display string becomes `error_description`.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Client authentication failed")]
    InvalidClient,

    #[error("{0}")]
    InvalidGrant(String),

    #[error("{0}")]
    InvalidScope(String),

    #[error("Grant type not supported")]
    UnsupportedGrantType,

    #[error("Only response_type=code is supported")]
    UnsupportedResponseType,

    #[error("{0}")]
    UnsupportedTokenType(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("User denied consent")]
    AccessDenied,

    #[error("End-user authentication is required")]
    LoginRequired,

    #[error("End-user consent is required")]
    ConsentRequired,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal server error")]
    ServerError(String),
}

impl OAuthError {
    /// The OAuth error code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::UnsupportedTokenType(_) => "unsupported_token_type",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::LoginRequired => "login_required",
            OAuthError::ConsentRequired => "consent_required",
            OAuthError::NotFound(_) => "not_found",
            OAuthError::Forbidden(_) => "forbidden",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidRequest(_)
            | OAuthError::InvalidGrant(_)
            | OAuthError::InvalidScope(_)
            | OAuthError::UnsupportedGrantType
            | OAuthError::UnsupportedResponseType
            | OAuthError::UnsupportedTokenType(_) => StatusCode::BAD_REQUEST,
            OAuthError::InvalidClient
            | OAuthError::InvalidToken(_)
            | OAuthError::LoginRequired => StatusCode::UNAUTHORIZED,
            OAuthError::AccessDenied
            | OAuthError::ConsentRequired
            | OAuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            OAuthError::NotFound(_) => StatusCode::NOT_FOUND,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// RFC 6749 error body.
#[derive(Debug, Clone, Serialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        // The internal detail of a server error stays in the logs.
        if let OAuthError::ServerError(detail) = &self {
            tracing::error!(%detail, "request failed with server_error");
        }

        let body = Json(OAuthErrorBody {
            error: self.code().to_string(),
            error_description: Some(self.to_string()),
        });

        (self.status(), body).into_response()
    }
}

/// Errors for the end-user /auth endpoints (register, login, logout).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Invalid email format")]
    InvalidEmailFormat,

    #[error("Password does not meet requirements")]
    WeakPassword,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AuthError::EmailAlreadyExists => (StatusCode::CONFLICT, "email_exists"),
            AuthError::InvalidEmailFormat => (StatusCode::BAD_REQUEST, "invalid_email"),
            AuthError::WeakPassword => (StatusCode::BAD_REQUEST, "weak_password"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AuthError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<AuthError> for OAuthError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                OAuthError::InvalidGrant("Invalid credentials".to_string())
            }
            AuthError::InvalidToken => OAuthError::InvalidToken("Invalid token".to_string()),
            other => OAuthError::ServerError(other.to_string()),
        }
    }
}
