pub mod account;
pub mod auth;
pub mod oauth;

pub use account::*;
pub use auth::*;
pub use oauth::*;
