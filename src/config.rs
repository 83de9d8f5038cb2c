use std::path::PathBuf;
use std::sync::Arc;

use crate::repositories::Repositories;
use crate::services::keys::KeyMaterial;
use crate::services::scope::ScopeRegistry;
use crate::services::token::TokenService;

/// Application configuration loaded from environment variables.
///
/// The persistent-backend settings are parsed and carried for the external
/// store; the bundled in-process repositories do not read them.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct Config {
    // Persistent backend (external collaborator)
    pub mongodb_uri: String,
    pub database_name: String,

    // Server
    pub server_host: String,
    pub server_port: u16,
    /// Issuer URL stamped into every token and the discovery document.
    pub issuer_url: String,

    // Tokens & keys
    pub keys_dir: PathBuf,
    pub access_token_expiry_secs: i64,
    pub refresh_token_expiry_secs: i64,

    // Sessions
    pub session_secret: String,
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_host =
            std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port: u16 = std::env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let issuer_url = std::env::var("ISSUER_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));

        Ok(Self {
            mongodb_uri: std::env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database_name: std::env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "oidc_server".to_string()),
            server_host,
            server_port,
            issuer_url,
            keys_dir: std::env::var("KEYS_DIR")
                .unwrap_or_else(|_| "keys".to_string())
                .into(),
            access_token_expiry_secs: std::env::var("ACCESS_TOKEN_EXPIRY")
                .unwrap_or_else(|_| "900".to_string()) // 15 minutes
                .parse()?,
            refresh_token_expiry_secs: std::env::var("REFRESH_TOKEN_EXPIRY")
                .unwrap_or_else(|_| "604800".to_string()) // 7 days
                .parse()?,
            session_secret: std::env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "dev-session-secret".to_string()),
            secure_cookies: std::env::var("SECURE_COOKIES")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(format!("{}:{}", self.server_host, self.server_port).parse()?)
    }
}

/// Shared application state: the repository set, the token engine, the
/// scope registry and the signing keys. All fields are cheap to clone and
/// read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub tokens: TokenService,
    pub scopes: Arc<ScopeRegistry>,
    pub keys: Arc<KeyMaterial>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        keys: KeyMaterial,
        config: Config,
    ) -> anyhow::Result<Self> {
        let tokens = TokenService::new(
            &keys,
            config.issuer_url.clone(),
            config.access_token_expiry_secs,
            config.refresh_token_expiry_secs,
        )
        .map_err(|e| anyhow::anyhow!("token service init failed: {}", e))?;

        Ok(Self {
            repos,
            tokens,
            scopes: Arc::new(ScopeRegistry::new()),
            keys: Arc::new(keys),
            config: Arc::new(config),
        })
    }
}
