//! Token minting, verification and format detection.
//!
//! Every token the server issues is either a JWT (RS256, three segments) or
//! a JWE (RSA-OAEP key wrap with SHA-256 plus AES-256-GCM, five segments).
//! Both forms carry the same claims JSON; the JWE is the encrypted
//! rendition used when a client asks for an opaque token.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::Sha256;

use crate::error::OAuthError;
use crate::services::keys::KeyMaterial;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

const JWE_ALG: &str = "RSA-OAEP";
const JWE_ENC: &str = "A256GCM";
const GCM_TAG_BYTES: usize = 16;
const GCM_IV_BYTES: usize = 12;
const CEK_BYTES: usize = 32;

/// `true` iff the string has the three-segment compact JWT form.
pub fn is_jwt(token: &str) -> bool {
    token.split('.').count() == 3
}

/// `true` iff the string has the five-segment compact JWE form.
pub fn is_jwe(token: &str) -> bool {
    token.split('.').count() == 5
}

/// Claims carried by every token the server issues.
///
/// Access and refresh tokens carry `scope` and a `token_type`
/// discriminator; ID tokens carry `aud`, optionally `nonce`, and the
/// scope-filtered identity claims (captured in `extra`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or("")
    }

    pub fn is_refresh_token(&self) -> bool {
        self.token_type.as_deref() == Some(TOKEN_TYPE_REFRESH)
    }

    pub fn is_access_token(&self) -> bool {
        self.token_type.as_deref() == Some(TOKEN_TYPE_ACCESS)
    }
}

/// Detected wire format of a presented token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    Jwt,
    Jwe,
}

impl TokenFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenFormat::Jwt => "jwt",
            TokenFormat::Jwe => "jwe",
        }
    }

    /// Exactly one of the two forms holds for a well-formed token.
    pub fn detect(token: &str) -> Result<Self, OAuthError> {
        if is_jwt(token) {
            Ok(TokenFormat::Jwt)
        } else if is_jwe(token) {
            Ok(TokenFormat::Jwe)
        } else {
            Err(OAuthError::InvalidToken(
                "Token is neither a JWT nor a JWE".to_string(),
            ))
        }
    }
}

struct TokenServiceInner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    issuer: String,
    access_token_expiry_secs: i64,
    refresh_token_expiry_secs: i64,
}

/// Stateless (post-construction) mint/verify engine shared across requests.
#[derive(Clone)]
pub struct TokenService {
    inner: Arc<TokenServiceInner>,
}

impl TokenService {
    pub fn new(
        keys: &KeyMaterial,
        issuer: String,
        access_token_expiry_secs: i64,
        refresh_token_expiry_secs: i64,
    ) -> Result<Self, OAuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(keys.private_pem.as_bytes())
            .map_err(|e| OAuthError::ServerError(format!("Invalid private key: {}", e)))?;
        let decoding_key = DecodingKey::from_rsa_pem(keys.public_pem.as_bytes())
            .map_err(|e| OAuthError::ServerError(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            inner: Arc::new(TokenServiceInner {
                encoding_key,
                decoding_key,
                private_key: keys.private_key.clone(),
                public_key: keys.public_key.clone(),
                issuer,
                access_token_expiry_secs,
                refresh_token_expiry_secs,
            }),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.inner.issuer
    }

    pub fn access_token_expiry_secs(&self) -> i64 {
        self.inner.access_token_expiry_secs
    }

    pub fn refresh_token_expiry_secs(&self) -> i64 {
        self.inner.refresh_token_expiry_secs
    }

    // ------------------------------------------------------------------
    // Claim construction
    // ------------------------------------------------------------------

    /// Access-token claims: iss, sub, scope, iat, exp.
    pub fn access_claims(&self, sub: &str, scope: &str) -> Map<String, Value> {
        self.base_claims(sub, self.inner.access_token_expiry_secs, |claims| {
            claims.insert("scope".to_string(), json!(scope));
            claims.insert("token_type".to_string(), json!(TOKEN_TYPE_ACCESS));
        })
    }

    /// Refresh-token claims: iss, sub, scope, iat, exp.
    pub fn refresh_claims(&self, sub: &str, scope: &str) -> Map<String, Value> {
        self.base_claims(sub, self.inner.refresh_token_expiry_secs, |claims| {
            claims.insert("scope".to_string(), json!(scope));
            claims.insert("token_type".to_string(), json!(TOKEN_TYPE_REFRESH));
        })
    }

    /// ID-token claims: the scope-filtered identity claims plus iss, aud,
    /// iat and exp. The identity map already carries sub and, when the
    /// authorize request supplied one, the nonce.
    pub fn id_claims(&self, identity: Map<String, Value>, aud: &str) -> Map<String, Value> {
        let now = Utc::now();
        let mut claims = identity;
        claims.insert("iss".to_string(), json!(self.inner.issuer));
        claims.insert("aud".to_string(), json!(aud));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(self.inner.access_token_expiry_secs)).timestamp()),
        );
        claims
    }

    fn base_claims(
        &self,
        sub: &str,
        ttl_secs: i64,
        extend: impl FnOnce(&mut Map<String, Value>),
    ) -> Map<String, Value> {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(self.inner.issuer));
        claims.insert("sub".to_string(), json!(sub));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(ttl_secs)).timestamp()),
        );
        extend(&mut claims);
        claims
    }

    // ------------------------------------------------------------------
    // JWT
    // ------------------------------------------------------------------

    /// RS256-sign a claims set into compact JWT form.
    pub fn sign(&self, claims: &Map<String, Value>) -> Result<String, OAuthError> {
        let header = Header {
            kid: Some(crate::services::keys::KEY_ID.to_string()),
            ..Header::new(Algorithm::RS256)
        };
        encode(&header, claims, &self.inner.encoding_key)
            .map_err(|e| OAuthError::ServerError(format!("Token signing failed: {}", e)))
    }

    pub fn issue_access_token(&self, sub: &str, scope: &str) -> Result<String, OAuthError> {
        self.sign(&self.access_claims(sub, scope))
    }

    pub fn issue_refresh_token(&self, sub: &str, scope: &str) -> Result<String, OAuthError> {
        self.sign(&self.refresh_claims(sub, scope))
    }

    pub fn issue_id_token(
        &self,
        identity: Map<String, Value>,
        aud: &str,
    ) -> Result<String, OAuthError> {
        self.sign(&self.id_claims(identity, aud))
    }

    /// Verify a compact JWT: require RS256, check the signature with the
    /// server public key, check exp and iss.
    pub fn verify_jwt(&self, token: &str) -> Result<TokenClaims, OAuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.inner.issuer]);

        decode::<TokenClaims>(token, &self.inner.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    OAuthError::InvalidToken("Token expired".to_string())
                }
                _ => OAuthError::InvalidToken("Invalid token".to_string()),
            })
    }

    // ------------------------------------------------------------------
    // JWE
    // ------------------------------------------------------------------

    /// Encrypt a claims set into compact JWE form:
    /// `header.encrypted_key.iv.ciphertext.tag`, all segments base64url
    /// without padding. The CEK is wrapped with RSA-OAEP (SHA-256), the
    /// payload sealed with AES-256-GCM using the protected header as AAD.
    pub fn encrypt(&self, claims: &Map<String, Value>) -> Result<String, OAuthError> {
        let header = json!({ "alg": JWE_ALG, "enc": JWE_ENC });
        let header_bytes = serde_json::to_vec(&header)
            .map_err(|e| OAuthError::ServerError(format!("Header serialization failed: {}", e)))?;
        let header_b64 = URL_SAFE_NO_PAD.encode(header_bytes);

        let mut rng = rand::thread_rng();
        let mut cek = [0u8; CEK_BYTES];
        rng.fill_bytes(&mut cek);
        let mut iv = [0u8; GCM_IV_BYTES];
        rng.fill_bytes(&mut iv);

        let wrapped_cek = self
            .inner
            .public_key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), &cek)
            .map_err(|e| OAuthError::ServerError(format!("CEK wrap failed: {}", e)))?;

        let cipher = Aes256Gcm::new_from_slice(&cek)
            .map_err(|e| OAuthError::ServerError(format!("Cipher init failed: {}", e)))?;
        let plaintext = serde_json::to_vec(claims)
            .map_err(|e| OAuthError::ServerError(format!("Payload serialization failed: {}", e)))?;

        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &plaintext,
                    aad: header_b64.as_bytes(),
                },
            )
            .map_err(|_| OAuthError::ServerError("Content encryption failed".to_string()))?;

        let (ciphertext, tag) = sealed.split_at(sealed.len() - GCM_TAG_BYTES);

        Ok(format!(
            "{}.{}.{}.{}.{}",
            header_b64,
            URL_SAFE_NO_PAD.encode(&wrapped_cek),
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(ciphertext),
            URL_SAFE_NO_PAD.encode(tag),
        ))
    }

    /// Decrypt and authenticate a compact JWE, returning the claims JSON.
    /// The expiry check happens on the decoded payload.
    pub fn decrypt(&self, token: &str) -> Result<Map<String, Value>, OAuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 5 {
            return Err(OAuthError::InvalidToken(
                "JWE must have five segments".to_string(),
            ));
        }

        let header_bytes = decode_segment(segments[0])?;
        let header: Value = serde_json::from_slice(&header_bytes)
            .map_err(|_| OAuthError::InvalidToken("Malformed JWE header".to_string()))?;
        if header["alg"] != JWE_ALG || header["enc"] != JWE_ENC {
            return Err(OAuthError::InvalidToken(
                "Unsupported JWE algorithm".to_string(),
            ));
        }

        let wrapped_cek = decode_segment(segments[1])?;
        let iv = decode_segment(segments[2])?;
        let ciphertext = decode_segment(segments[3])?;
        let tag = decode_segment(segments[4])?;

        if iv.len() != GCM_IV_BYTES || tag.len() != GCM_TAG_BYTES {
            return Err(OAuthError::InvalidToken("Malformed JWE segments".to_string()));
        }

        let cek = self
            .inner
            .private_key
            .decrypt(Oaep::new::<Sha256>(), &wrapped_cek)
            .map_err(|_| OAuthError::InvalidToken("CEK unwrap failed".to_string()))?;
        if cek.len() != CEK_BYTES {
            return Err(OAuthError::InvalidToken("Invalid content key".to_string()));
        }

        let cipher = Aes256Gcm::new_from_slice(&cek)
            .map_err(|_| OAuthError::InvalidToken("Invalid content key".to_string()))?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: segments[0].as_bytes(),
                },
            )
            .map_err(|_| {
                OAuthError::InvalidToken("Token authentication failed".to_string())
            })?;

        let claims: Map<String, Value> = serde_json::from_slice(&plaintext)
            .map_err(|_| OAuthError::InvalidToken("Malformed token payload".to_string()))?;

        match claims.get("exp").and_then(Value::as_i64) {
            Some(exp) if exp > Utc::now().timestamp() => Ok(claims),
            Some(_) => Err(OAuthError::InvalidToken("Token expired".to_string())),
            None => Err(OAuthError::InvalidToken("Token missing expiry".to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Unified verification
    // ------------------------------------------------------------------

    /// Verify a token in either wire form and return its claims together
    /// with the detected format.
    pub fn verify(&self, token: &str) -> Result<(TokenClaims, TokenFormat), OAuthError> {
        match TokenFormat::detect(token)? {
            TokenFormat::Jwt => Ok((self.verify_jwt(token)?, TokenFormat::Jwt)),
            TokenFormat::Jwe => {
                let claims = self.decrypt(token)?;
                let claims: TokenClaims = serde_json::from_value(Value::Object(claims))
                    .map_err(|_| OAuthError::InvalidToken("Malformed token claims".to_string()))?;
                if claims.iss != self.inner.issuer {
                    return Err(OAuthError::InvalidToken("Unknown issuer".to_string()));
                }
                Ok((claims, TokenFormat::Jwe))
            }
        }
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, OAuthError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| OAuthError::InvalidToken("Invalid base64url segment".to_string()))
}
