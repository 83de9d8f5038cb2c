pub mod auth;
pub mod consent;
pub mod exchange;
pub mod keys;
pub mod oauth;
pub mod scope;
pub mod session;
pub mod token;

pub use auth::AuthService;
pub use consent::ConsentService;
pub use exchange::TokenExchangeService;
pub use keys::KeyMaterial;
pub use oauth::OAuthService;
pub use scope::ScopeRegistry;
pub use session::SsoService;
pub use token::TokenService;
