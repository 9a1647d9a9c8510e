//! PKCE helpers (RFC 7636, S256 only).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a base64url-encoded SHA-256 digest without padding.
pub const S256_CHALLENGE_LEN: usize = 43;
pub const MIN_VERIFIER_LEN: usize = 43;
pub const MAX_VERIFIER_LEN: usize = 128;

/// Derive the S256 code challenge for a verifier.
pub fn code_challenge_s256(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Check a verifier against a stored S256 challenge in constant time.
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    let computed = code_challenge_s256(code_verifier);
    computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
}

/// Verifiers are 43-128 characters from the unreserved set `[A-Za-z0-9-._~]`.
pub fn is_valid_verifier(code_verifier: &str) -> bool {
    (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&code_verifier.len())
        && code_verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// An S256 challenge is exactly 43 base64url characters.
pub fn is_valid_challenge(code_challenge: &str) -> bool {
    code_challenge.len() == S256_CHALLENGE_LEN
        && code_challenge
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
}

/// Generate a fresh verifier the way a client would.
///
/// The server never needs one; this backs the tests, the bench and the
/// `crm-auth` smoke tooling.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 48];
    getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn matches_rfc_7636_appendix_b() {
        assert_eq!(code_challenge_s256(RFC_VERIFIER), RFC_CHALLENGE);
        assert!(verify_s256(RFC_VERIFIER, RFC_CHALLENGE));
    }

    #[test]
    fn derivation_is_deterministic() {
        let verifier = generate_verifier();
        assert_eq!(code_challenge_s256(&verifier), code_challenge_s256(&verifier));
    }

    #[test]
    fn wrong_verifier_fails() {
        assert!(!verify_s256(
            "wrong-verifier-that-is-long-enough-to-be-valid-xx",
            RFC_CHALLENGE
        ));
        // A challenge of the wrong length must not panic
        assert!(!verify_s256(RFC_VERIFIER, "short"));
    }

    #[test]
    fn generated_verifiers_are_unique_and_valid() {
        let v1 = generate_verifier();
        let v2 = generate_verifier();
        assert_ne!(v1, v2);
        assert!(is_valid_verifier(&v1));
        assert_eq!(v1.len(), 64);
        assert!(is_valid_challenge(&code_challenge_s256(&v1)));
    }

    #[test]
    fn verifier_bounds() {
        assert!(!is_valid_verifier(&"a".repeat(42)));
        assert!(is_valid_verifier(&"a".repeat(43)));
        assert!(is_valid_verifier(&"a".repeat(128)));
        assert!(!is_valid_verifier(&"a".repeat(129)));
        assert!(!is_valid_verifier(&format!("{}+", "a".repeat(43))));
    }

    #[test]
    fn challenge_shape() {
        assert!(is_valid_challenge(RFC_CHALLENGE));
        assert!(!is_valid_challenge("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM="));
        assert!(!is_valid_challenge("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw+cM"));
    }
}
