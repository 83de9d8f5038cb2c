pub mod password;
pub mod pkce;
pub mod secret;
