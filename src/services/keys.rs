//! RSA signing-key lifecycle and JWKS export.
//!
//! The server works with a single 2048-bit key pair created on first run
//! and loaded from PEM files on every start after that. Rotation is out of
//! scope; the key id is the constant `"1"`.

use std::fs;
use std::path::Path;

use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

/// Key id advertised in the JWKS.
pub const KEY_ID: &str = "1";

pub const RSA_KEY_BITS: usize = 2048;

const PRIVATE_KEY_FILE: &str = "private.pem";
const PUBLIC_KEY_FILE: &str = "public.pem";

/// Process-wide signing material, loaded once at startup and read-only
/// thereafter.
#[derive(Clone)]
pub struct KeyMaterial {
    pub private_key: RsaPrivateKey,
    pub public_key: RsaPublicKey,
    pub private_pem: String,
    pub public_pem: String,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_id", &KEY_ID)
            .field("bits", &RSA_KEY_BITS)
            .finish()
    }
}

impl KeyMaterial {
    /// Load the key pair from `<dir>/private.pem` and `<dir>/public.pem`,
    /// generating and persisting a fresh pair when the files are absent.
    /// The private key file is written with owner-only permissions.
    pub fn load_or_generate(dir: &Path) -> anyhow::Result<Self> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);

        if private_path.exists() && public_path.exists() {
            let private_pem = fs::read_to_string(&private_path)
                .with_context(|| format!("reading {}", private_path.display()))?;
            let public_pem = fs::read_to_string(&public_path)
                .with_context(|| format!("reading {}", public_path.display()))?;
            return Self::from_pem(&private_pem, &public_pem);
        }

        let material = Self::generate()?;

        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        fs::write(&private_path, &material.private_pem)
            .with_context(|| format!("writing {}", private_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&private_path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("restricting {}", private_path.display()))?;
        }
        fs::write(&public_path, &material.public_pem)
            .with_context(|| format!("writing {}", public_path.display()))?;

        tracing::info!(dir = %dir.display(), "generated new RSA signing key pair");
        Ok(material)
    }

    /// Generate a fresh 2048-bit pair in memory.
    pub fn generate() -> anyhow::Result<Self> {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).context("RSA key generation failed")?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .context("encoding private key")?
            .to_string();
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .context("encoding public key")?;

        Ok(Self {
            private_key,
            public_key,
            private_pem,
            public_pem,
        })
    }

    /// Parse an existing pair. The private key may be PKCS#8
    /// (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`); the
    /// public key is PKIX (`BEGIN PUBLIC KEY`).
    pub fn from_pem(private_pem: &str, public_pem: &str) -> anyhow::Result<Self> {
        let private_key = if private_pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(private_pem).context("parsing PKCS#1 private key")?
        } else {
            RsaPrivateKey::from_pkcs8_pem(private_pem).context("parsing PKCS#8 private key")?
        };
        let public_key =
            RsaPublicKey::from_public_key_pem(public_pem).context("parsing public key")?;

        Ok(Self {
            private_key,
            public_key,
            private_pem: private_pem.to_string(),
            public_pem: public_pem.to_string(),
        })
    }

    /// Export the public key as a JWKS document.
    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: vec![Jwk {
                kty: "RSA".to_string(),
                use_: "sig".to_string(),
                alg: "RS256".to_string(),
                kid: KEY_ID.to_string(),
                n: URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
                e: URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
            }],
        }
    }
}

/// A single RSA signing key in JWK form, RFC 7517.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::token::tests::test_keys;

    #[test]
    fn test_jwks_shape() {
        let jwks = test_keys().jwks();
        assert_eq!(jwks.keys.len(), 1);

        let key = &jwks.keys[0];
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.use_, "sig");
        assert_eq!(key.alg, "RS256");
        assert_eq!(key.kid, KEY_ID);
        // base64url without padding
        assert!(!key.n.contains('='));
        assert!(!key.e.contains('='));
        // 65537
        assert_eq!(key.e, "AQAB");
    }

    #[test]
    fn test_pem_roundtrip() {
        let keys = test_keys();
        let reloaded = KeyMaterial::from_pem(&keys.private_pem, &keys.public_pem).unwrap();
        assert_eq!(reloaded.public_key, keys.public_key);
    }

    #[test]
    fn test_load_or_generate_persists_and_reloads() {
        let dir = std::env::temp_dir().join(format!("oidc-keys-{}", uuid::Uuid::new_v4()));

        let generated = KeyMaterial::load_or_generate(&dir).unwrap();
        assert!(dir.join("private.pem").exists());
        assert!(dir.join("public.pem").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.join("private.pem")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let reloaded = KeyMaterial::load_or_generate(&dir).unwrap();
        assert_eq!(reloaded.public_key, generated.public_key);

        fs::remove_dir_all(&dir).ok();
    }
}
