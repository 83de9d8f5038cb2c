//! Random identifiers and secret handling.
//!
//! Authorization codes and session ids are raw random bytes, hex encoded.
//! Client secrets are bcrypt-hashed before storage; authorization codes use
//! SHA-256 because they are already high-entropy and need fast lookup.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::OAuthError;

/// Authorization codes are 16 random bytes.
pub const AUTHORIZATION_CODE_BYTES: usize = 16;

/// OAuth and SSO session ids are 32 random bytes.
pub const SESSION_ID_BYTES: usize = 32;

/// Bcrypt cost factor for client secrets.
pub const BCRYPT_COST: u32 = 12;

/// Generate a random authorization code (hex, 32 chars).
pub fn generate_authorization_code() -> String {
    random_hex(AUTHORIZATION_CODE_BYTES)
}

/// Generate a random session id (hex, 64 chars).
pub fn generate_session_id() -> String {
    random_hex(SESSION_ID_BYTES)
}

/// Generate a client secret: 32 random bytes, base64url.
pub fn generate_client_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a client secret with bcrypt for storage.
pub fn hash_client_secret(secret: &str) -> Result<String, OAuthError> {
    bcrypt::hash(secret, BCRYPT_COST)
        .map_err(|e| OAuthError::ServerError(format!("Secret hashing failed: {}", e)))
}

/// Verify a presented client secret against the stored bcrypt hash.
pub fn verify_client_secret(secret: &str, hash: &str) -> Result<bool, OAuthError> {
    bcrypt::verify(secret, hash)
        .map_err(|e| OAuthError::ServerError(format!("Secret verification failed: {}", e)))
}

/// SHA-256 hash of a token or code, base64url. Deterministic on purpose so
/// the hash can serve as the storage key.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
