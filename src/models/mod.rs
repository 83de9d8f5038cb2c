pub mod authorization_code;
pub mod client;
pub mod oauth_session;
pub mod sso_session;
pub mod user;
pub mod user_consent;

pub use authorization_code::*;
pub use client::*;
pub use oauth_session::*;
pub use sso_session::*;
pub use user::*;
pub use user_consent::*;
