//! PKCE (Proof Key for Code Exchange) verification, RFC 7636.
//!
//! A redemption succeeds iff the presented code_verifier satisfies the
//! challenge method recorded at authorize time: S256 compares
//! base64url(SHA-256(verifier)) against the stored challenge, plain compares
//! the verifier itself.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

/// Minimum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MIN_LENGTH: usize = 43;

/// Maximum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MAX_LENGTH: usize = 128;

pub const PKCE_METHOD_S256: &str = "S256";
pub const PKCE_METHOD_PLAIN: &str = "plain";

/// Check that a challenge method is one the server supports.
pub fn is_supported_method(method: &str) -> bool {
    method == PKCE_METHOD_S256 || method == PKCE_METHOD_PLAIN
}

/// Verify code_verifier against code_challenge using the recorded method.
///
/// Returns false on any mismatch or an unsupported method.
pub fn verify_pkce(code_verifier: &str, code_challenge: &str, method: &str) -> bool {
    match method {
        PKCE_METHOD_S256 => {
            let computed = compute_s256_challenge(code_verifier);
            constant_time_compare(&computed, code_challenge)
        }
        PKCE_METHOD_PLAIN => constant_time_compare(code_verifier, code_challenge),
        _ => false,
    }
}

/// S256: code_challenge = BASE64URL(SHA256(code_verifier))
pub fn compute_s256_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Validate code_verifier format according to RFC 7636: 43..=128 chars of
/// the unreserved URI character set.
pub fn validate_code_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    if !(CODE_VERIFIER_MIN_LENGTH..=CODE_VERIFIER_MAX_LENGTH).contains(&len) {
        return false;
    }

    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // Known test vector from RFC 7636 Appendix B
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_verify_pkce_s256_valid() {
        assert!(verify_pkce(RFC_VERIFIER, RFC_CHALLENGE, "S256"));
    }

    #[test]
    fn test_verify_pkce_s256_invalid_verifier() {
        let wrong = "wrong_verifier_that_is_long_enough_to_pass_length_check";
        assert!(!verify_pkce(wrong, RFC_CHALLENGE, "S256"));
    }

    #[test]
    fn test_verify_pkce_plain() {
        let v = "my_plain_code_verifier_that_is_at_least_43_chars";
        assert!(verify_pkce(v, v, "plain"));
        assert!(!verify_pkce(
            v,
            "different_challenge_value_that_is_also_long_enough",
            "plain"
        ));
    }

    #[test]
    fn test_verify_pkce_unsupported_method() {
        assert!(!verify_pkce(RFC_VERIFIER, RFC_CHALLENGE, "S512"));
    }

    #[test]
    fn test_compute_s256_challenge_rfc_vector() {
        assert_eq!(compute_s256_challenge(RFC_VERIFIER), RFC_CHALLENGE);
    }

    #[test]
    fn test_supported_methods() {
        assert!(is_supported_method("S256"));
        assert!(is_supported_method("plain"));
        assert!(!is_supported_method("s256"));
        assert!(!is_supported_method(""));
    }

    #[test]
    fn test_validate_code_verifier_length_bounds() {
        assert!(validate_code_verifier(&"a".repeat(43)));
        assert!(validate_code_verifier(&"a".repeat(128)));
        assert!(!validate_code_verifier(&"a".repeat(42)));
        assert!(!validate_code_verifier(&"a".repeat(129)));
    }

    #[test]
    fn test_validate_code_verifier_charset() {
        assert!(validate_code_verifier(
            "abcABC123-._~abcABC123-._~abcABC123-._~abcde"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789+abcdef"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789 abcdef"
        ));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
