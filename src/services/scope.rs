//! Scope registry and claim filtering.
//!
//! A single table maps every registered scope to the claims it unlocks.
//! The same table drives discovery advertising, scope validation, UserInfo
//! filtering and ID-token assembly; adding a scope is one new entry here.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::error::OAuthError;
use crate::models::User;

/// Scope the server falls back to when an authorize request names none.
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// One registry entry: the scope token, a consent-screen description, and
/// the claim names the scope unlocks.
#[derive(Debug, Clone)]
pub struct ScopeDefinition {
    pub name: String,
    pub description: String,
    pub claims: Vec<String>,
}

/// Immutable post-init registry of every scope the server understands.
#[derive(Debug, Clone)]
pub struct ScopeRegistry {
    entries: Vec<ScopeDefinition>,
    index: HashMap<String, usize>,
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeRegistry {
    pub fn new() -> Self {
        let entries = vec![
            ScopeDefinition {
                name: "openid".to_string(),
                description: "Authenticate using your account".to_string(),
                claims: vec!["sub".to_string()],
            },
            ScopeDefinition {
                name: "profile".to_string(),
                description: "Read your name and profile details".to_string(),
                claims: vec![
                    "name".to_string(),
                    "preferred_username".to_string(),
                    "picture".to_string(),
                ],
            },
            ScopeDefinition {
                name: "email".to_string(),
                description: "Read your email address".to_string(),
                claims: vec!["email".to_string(), "email_verified".to_string()],
            },
            ScopeDefinition {
                name: "phone".to_string(),
                description: "Read your phone number".to_string(),
                claims: vec![
                    "phone_number".to_string(),
                    "phone_number_verified".to_string(),
                ],
            },
            ScopeDefinition {
                name: "address".to_string(),
                description: "Read your postal address".to_string(),
                claims: vec!["address".to_string()],
            },
            ScopeDefinition {
                name: "offline_access".to_string(),
                description: "Keep access while you are away".to_string(),
                claims: vec![],
            },
        ];

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();

        Self { entries, index }
    }

    pub fn is_registered(&self, scope: &str) -> bool {
        self.index.contains_key(scope)
    }

    pub fn description(&self, scope: &str) -> Option<&str> {
        self.index
            .get(scope)
            .map(|&i| self.entries[i].description.as_str())
    }

    /// Every registered scope name, for the discovery document.
    pub fn scopes_supported(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Every claim any scope can unlock, for the discovery document.
    pub fn claims_supported(&self) -> Vec<String> {
        let mut claims = Vec::new();
        for entry in &self.entries {
            for claim in &entry.claims {
                if !claims.contains(claim) {
                    claims.push(claim.clone());
                }
            }
        }
        claims
    }

    /// Split a scope string into its whitespace-delimited tokens.
    pub fn split(scope: &str) -> Vec<String> {
        scope.split_whitespace().map(String::from).collect()
    }

    /// Normalize a scope string: drop empties and unknown tokens,
    /// deduplicate preserving first occurrence, rejoin with single spaces.
    pub fn normalize(&self, scope: &str) -> String {
        let mut seen = Vec::new();
        for token in scope.split_whitespace() {
            if self.is_registered(token) && !seen.iter().any(|s: &String| s == token) {
                seen.push(token.to_string());
            }
        }
        seen.join(" ")
    }

    /// A valid scope names only registered tokens and includes `openid`.
    pub fn validate(&self, scope: &str) -> Result<(), OAuthError> {
        let tokens = Self::split(scope);
        if tokens.is_empty() {
            return Err(OAuthError::InvalidScope("Scope must not be empty".to_string()));
        }
        for token in &tokens {
            if !self.is_registered(token) {
                return Err(OAuthError::InvalidScope(format!(
                    "Unknown scope: {}",
                    token
                )));
            }
        }
        if !tokens.iter().any(|t| t == "openid") {
            return Err(OAuthError::InvalidScope(
                "Scope must include openid".to_string(),
            ));
        }
        Ok(())
    }

    /// Every requested token must appear in the client's allowed set; an
    /// empty allowed set is a wildcard.
    pub fn validate_against_allowed(
        &self,
        requested: &str,
        allowed: &[String],
    ) -> Result<(), OAuthError> {
        if allowed.is_empty() {
            return Ok(());
        }
        for token in requested.split_whitespace() {
            if !allowed.iter().any(|a| a == token) {
                return Err(OAuthError::InvalidScope(format!(
                    "Scope not permitted for this client: {}",
                    token
                )));
            }
        }
        Ok(())
    }

    /// Refresh and exchange may only narrow a scope, never widen it.
    pub fn validate_downgrade(&self, requested: &str, original: &str) -> Result<(), OAuthError> {
        let original_tokens = Self::split(original);
        for token in requested.split_whitespace() {
            if !original_tokens.iter().any(|o| o == token) {
                return Err(OAuthError::InvalidScope(format!(
                    "Scope exceeds originally granted scope: {}",
                    token
                )));
            }
        }
        Ok(())
    }

    /// Set intersection of two scope strings, ordered by `a`.
    pub fn intersect(a: &str, b: &str) -> String {
        let b_tokens = Self::split(b);
        let mut out = Vec::new();
        for token in a.split_whitespace() {
            if b_tokens.iter().any(|t| t == token) && !out.iter().any(|s: &String| s == token) {
                out.push(token.to_string());
            }
        }
        out.join(" ")
    }

    /// UserInfo claims for a token scope: `{sub}` plus the union of every
    /// claim the scope tokens unlock, populated from the user record.
    /// Unknown tokens contribute nothing.
    pub fn filter_claims(&self, user: &User, scope: &str) -> Map<String, Value> {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(user.id.to_string()));

        for token in scope.split_whitespace() {
            match token {
                "profile" => {
                    claims.insert("name".to_string(), json!(user.name));
                    if let Some(username) = &user.preferred_username {
                        claims.insert("preferred_username".to_string(), json!(username));
                    }
                    if let Some(picture) = &user.picture {
                        claims.insert("picture".to_string(), json!(picture));
                    }
                }
                "email" => {
                    claims.insert("email".to_string(), json!(user.email));
                    claims.insert("email_verified".to_string(), json!(user.email_verified));
                }
                "phone" => {
                    if let Some(phone) = &user.phone_number {
                        claims.insert("phone_number".to_string(), json!(phone));
                    }
                    claims.insert(
                        "phone_number_verified".to_string(),
                        json!(user.phone_number_verified),
                    );
                }
                "address" => {
                    if let Some(address) = &user.address {
                        claims.insert("address".to_string(), json!(address));
                    }
                }
                _ => {}
            }
        }

        claims
    }

    /// Identity claims for an ID token: the filtered claims plus the nonce
    /// when the authorize request supplied one. `iss`, `aud`, `iat` and
    /// `exp` are stamped by the token service.
    pub fn id_token_claims(
        &self,
        user: &User,
        scope: &str,
        nonce: Option<&str>,
    ) -> Map<String, Value> {
        let mut claims = self.filter_claims(user, scope);
        match nonce {
            Some(n) if !n.is_empty() => {
                claims.insert("nonce".to_string(), json!(n));
            }
            _ => {}
        }
        claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry() -> ScopeRegistry {
        ScopeRegistry::new()
    }

    fn test_user() -> User {
        let mut user = User::new(
            "alice@example.com".to_string(),
            "Alice".to_string(),
            "hash".to_string(),
        );
        user.email_verified = true;
        user
    }

    #[test]
    fn test_normalize_drops_unknown_and_dedups() {
        let r = registry();
        assert_eq!(
            r.normalize("openid  email openid bogus profile"),
            "openid email profile"
        );
    }

    #[test]
    fn test_normalize_preserves_first_occurrence_order() {
        let r = registry();
        assert_eq!(r.normalize("email openid email"), "email openid");
    }

    #[test]
    fn test_validate_requires_openid() {
        let r = registry();
        assert!(r.validate("openid email").is_ok());
        assert!(r.validate("profile email").is_err());
        assert!(r.validate("").is_err());
    }

    #[test]
    fn test_validate_rejects_unknown() {
        let r = registry();
        assert!(r.validate("openid admin").is_err());
    }

    #[test]
    fn test_validate_against_allowed_wildcard_when_empty() {
        let r = registry();
        assert!(r.validate_against_allowed("openid email", &[]).is_ok());
    }

    #[test]
    fn test_validate_against_allowed_rejects_extra() {
        let r = registry();
        let allowed = vec!["openid".to_string()];
        assert!(r.validate_against_allowed("openid", &allowed).is_ok());
        assert!(r.validate_against_allowed("openid email", &allowed).is_err());
    }

    #[test]
    fn test_downgrade_allows_subset_and_equal() {
        let r = registry();
        assert!(r
            .validate_downgrade("openid profile", "openid profile email phone")
            .is_ok());
        assert!(r
            .validate_downgrade("openid profile", "openid profile")
            .is_ok());
    }

    #[test]
    fn test_downgrade_rejects_widening() {
        let r = registry();
        assert!(r
            .validate_downgrade("openid profile address", "openid profile email phone")
            .is_err());
    }

    #[test]
    fn test_filter_claims_openid_only_is_sub() {
        let r = registry();
        let user = test_user();
        let claims = r.filter_claims(&user, "openid");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims["sub"], json!(user.id.to_string()));
    }

    #[test]
    fn test_filter_claims_email_scope() {
        let r = registry();
        let user = test_user();
        let claims = r.filter_claims(&user, "openid email");
        assert_eq!(claims["email"], json!("alice@example.com"));
        assert_eq!(claims["email_verified"], json!(true));
        assert!(!claims.contains_key("name"));
    }

    #[test]
    fn test_filter_claims_unknown_scope_contributes_nothing() {
        let r = registry();
        let user = test_user();
        let with = r.filter_claims(&user, "openid email bogus");
        let without = r.filter_claims(&user, "openid email");
        assert_eq!(with, without);
    }

    #[test]
    fn test_id_token_claims_nonce_presence() {
        let r = registry();
        let user = test_user();

        let with = r.id_token_claims(&user, "openid", Some("n-0S6_WzA2Mj"));
        assert_eq!(with["nonce"], json!("n-0S6_WzA2Mj"));

        let without = r.id_token_claims(&user, "openid", None);
        assert!(!without.contains_key("nonce"));

        let empty = r.id_token_claims(&user, "openid", Some(""));
        assert!(!empty.contains_key("nonce"));
    }

    #[test]
    fn test_claims_supported_covers_registry() {
        let r = registry();
        let claims = r.claims_supported();
        for expected in ["sub", "name", "email", "email_verified", "phone_number", "address"] {
            assert!(claims.iter().any(|c| c == expected), "missing {}", expected);
        }
    }

    fn sorted_tokens(s: &str) -> Vec<String> {
        let mut tokens = ScopeRegistry::split(s);
        tokens.sort();
        tokens.dedup();
        tokens
    }

    fn scope_strategy() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop_oneof![
                Just("openid"),
                Just("profile"),
                Just("email"),
                Just("phone"),
                Just("address"),
                Just("offline_access"),
                Just("bogus"),
            ],
            0..8,
        )
        .prop_map(|tokens| tokens.join(" "))
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(scope in scope_strategy()) {
            let r = registry();
            let once = r.normalize(&scope);
            prop_assert_eq!(r.normalize(&once), once.clone());
        }

        #[test]
        fn prop_intersect_commutative_as_sets(a in scope_strategy(), b in scope_strategy()) {
            let ab = ScopeRegistry::intersect(&a, &b);
            let ba = ScopeRegistry::intersect(&b, &a);
            prop_assert_eq!(sorted_tokens(&ab), sorted_tokens(&ba));
        }

        #[test]
        fn prop_intersect_idempotent(a in scope_strategy()) {
            let aa = ScopeRegistry::intersect(&a, &a);
            prop_assert_eq!(sorted_tokens(&aa), sorted_tokens(&a));
        }

        #[test]
        fn prop_normalized_scope_survives_downgrade_to_itself(scope in scope_strategy()) {
            let r = registry();
            let normalized = r.normalize(&scope);
            prop_assert!(r.validate_downgrade(&normalized, &normalized).is_ok());
        }
    }
}
