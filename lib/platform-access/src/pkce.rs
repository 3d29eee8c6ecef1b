//! PKCE transaction state for the authorization-code flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use oauth2::{CsrfToken, PkceCodeChallenge};
use sha2::{Digest, Sha256};

/// Verifier, challenge and state for one login attempt.
///
/// The verifier and state travel back to the browser in short-lived
/// cookies and must be presented, unchanged, at the callback.
#[derive(Clone)]
pub struct PkceTransaction {
    code_verifier: String,
    code_challenge: String,
    state: String,
}

impl std::fmt::Debug for PkceTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceTransaction")
            .field("code_challenge", &self.code_challenge)
            .finish_non_exhaustive()
    }
}

impl PkceTransaction {
    /// Starts a transaction: a 32-byte verifier, its S256 challenge and a
    /// 16-byte state, all base64url encoded.
    #[must_use]
    pub fn new() -> Self {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        Self {
            code_verifier: verifier.secret().clone(),
            code_challenge: challenge.as_str().to_string(),
            state: CsrfToken::new_random().secret().clone(),
        }
    }

    /// Returns the code verifier.
    #[must_use]
    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    /// Returns the S256 code challenge.
    #[must_use]
    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    /// Returns the anti-forgery state.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }
}

impl Default for PkceTransaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes `base64url(sha256(verifier))`.
#[must_use]
pub fn code_challenge_from_verifier(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_url_safe(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn verifier_is_32_bytes_url_safe() {
        let tx = PkceTransaction::new();
        assert_eq!(tx.code_verifier().len(), 43);
        assert!(is_url_safe(tx.code_verifier()));
        assert_eq!(
            URL_SAFE_NO_PAD.decode(tx.code_verifier()).expect("decode").len(),
            32
        );
    }

    #[test]
    fn challenge_matches_verifier() {
        let tx = PkceTransaction::new();
        assert_eq!(tx.code_challenge(), code_challenge_from_verifier(tx.code_verifier()));
    }

    #[test]
    fn state_is_16_bytes_and_distinct_from_verifier() {
        let tx = PkceTransaction::new();
        assert_eq!(URL_SAFE_NO_PAD.decode(tx.state()).expect("decode").len(), 16);
        assert_ne!(tx.state(), tx.code_verifier());
    }

    #[test]
    fn transactions_are_unique() {
        let a = PkceTransaction::new();
        let b = PkceTransaction::new();
        assert_ne!(a.code_verifier(), b.code_verifier());
        assert_ne!(a.state(), b.state());
    }

    #[test]
    fn rfc7636_appendix_b_vector() {
        assert_eq!(
            code_challenge_from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn debug_hides_secrets() {
        let tx = PkceTransaction::new();
        let rendered = format!("{tx:?}");
        assert!(!rendered.contains(tx.code_verifier()));
        assert!(!rendered.contains(tx.state()));
    }
}
