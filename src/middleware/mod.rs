pub mod oauth_auth;
pub mod sso;

pub use oauth_auth::{oauth_auth_middleware, AccessContext};
pub use sso::{fingerprint_from_headers, session_cookie, sso_session_middleware, SSO_COOKIE_NAME};
