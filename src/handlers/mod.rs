pub mod account;
pub mod auth;
pub mod clients;
pub mod exchange;
pub mod oauth;

pub use account::{
    list_authorizations_handler, list_sessions_handler, revoke_authorization_handler,
    revoke_session_handler,
};
pub use auth::{login_handler, logout_handler, register_handler};
pub use clients::register_client_handler;
pub use exchange::{token_exchange_handler, validate_get_handler, validate_post_handler};
pub use oauth::{
    authorize_handler, consent_screen_handler, consent_submit_handler, jwks_handler,
    openid_configuration_handler, token_handler, userinfo_handler,
};
