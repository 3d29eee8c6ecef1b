//! Symmetric session codec.
//!
//! Sessions are sealed with AES-256-GCM under a key derived from the
//! configured cookie secret with PBKDF2-HMAC-SHA256. The token format is
//! `b64url(nonce).b64url(ciphertext).b64url(tag)`, each segment unpadded.
//!
//! # Key rotation
//!
//! The derivation salt doubles as the key version. To rotate, set a new
//! `salt` and move the old one into `previous_salts`: new cookies are sealed
//! under the new key while cookies sealed under any previous salt still
//! open until they expire. Drop the old salt once the cookie max age has
//! elapsed.

use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, Nonce, OsRng, Tag};
use aes_gcm::{Aes256Gcm, Key};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pbkdf2::pbkdf2_hmac_array;
use rootcause::prelude::Report;
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;

use crate::error::CodecError;
use crate::session::Session;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Configuration for cookie sealing.
#[derive(Clone, Deserialize)]
pub struct CookieConfig {
    /// High-entropy secret the session key is derived from. Required.
    #[serde(default)]
    secret: Option<String>,
    /// PBKDF2 salt; bump it to rotate the key.
    #[serde(default = "default_salt")]
    salt: String,
    /// Salts of keys that may still open cookies but never seal new ones.
    #[serde(default)]
    previous_salts: Vec<String>,
    /// PBKDF2 iteration count.
    #[serde(default = "default_pbkdf2_iterations")]
    pbkdf2_iterations: u32,
}

fn default_salt() -> String {
    "od_cookie_salt_v1".to_string()
}

fn default_pbkdf2_iterations() -> u32 {
    100_000
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secret: None,
            salt: default_salt(),
            previous_salts: Vec::new(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

impl fmt::Debug for CookieConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("salt", &self.salt)
            .field("previous_salts", &self.previous_salts)
            .field("pbkdf2_iterations", &self.pbkdf2_iterations)
            .finish()
    }
}

impl CookieConfig {
    /// Creates a configuration with the given secret and default derivation settings.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Sets the derivation salt.
    #[must_use]
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    /// Sets the salts that remain valid for opening cookies.
    #[must_use]
    pub fn with_previous_salts(mut self, salts: Vec<String>) -> Self {
        self.previous_salts = salts;
        self
    }

    /// Sets the PBKDF2 iteration count.
    #[must_use]
    pub fn with_pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }

    /// Returns the configured secret, treating an empty one as absent.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the current derivation salt.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Returns the salts still accepted for opening cookies.
    #[must_use]
    pub fn previous_salts(&self) -> &[String] {
        &self.previous_salts
    }

    /// Returns the PBKDF2 iteration count.
    #[must_use]
    pub fn pbkdf2_iterations(&self) -> u32 {
        self.pbkdf2_iterations
    }
}

/// Seals and opens session cookies.
///
/// Keys are derived once, at construction. The codec is cheap to share
/// behind an `Arc` and holds no mutable state.
#[derive(Clone)]
pub struct SessionCodec {
    primary: Aes256Gcm,
    previous: Vec<Aes256Gcm>,
}

impl fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCodec")
            .field("previous_keys", &self.previous.len())
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    /// Derives the codec keys from the cookie configuration.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::MissingSecret` when no secret is configured and
    /// `CodecError::InvalidIterations` for a zero iteration count.
    pub fn new(config: &CookieConfig) -> Result<Self, Report<CodecError>> {
        let secret = config.secret().ok_or(CodecError::MissingSecret)?;
        let iterations = config.pbkdf2_iterations();
        if iterations == 0 {
            return Err(CodecError::InvalidIterations { iterations }.into());
        }

        let primary = derive_cipher(secret, config.salt(), iterations);
        let previous = config
            .previous_salts()
            .iter()
            .filter(|salt| salt.as_str() != config.salt())
            .map(|salt| derive_cipher(secret, salt, iterations))
            .collect();

        Ok(Self { primary, previous })
    }

    /// Seals a session into a cookie-safe token under the primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be serialized or encrypted.
    pub fn seal(&self, session: &Session) -> Result<String, Report<CodecError>> {
        let mut buffer = serde_json::to_vec(session).map_err(|e| CodecError::Serialize {
            details: e.to_string(),
        })?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let tag = self
            .primary
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|_| CodecError::Encrypt)?;

        Ok(format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(&buffer),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Opens a sealed token.
    ///
    /// Every failure (shape, encoding, authentication, payload) yields `None`.
    #[must_use]
    pub fn open(&self, token: &str) -> Option<Session> {
        let mut segments = token.split('.');
        let (Some(nonce), Some(ciphertext), Some(tag), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return None;
        };

        let nonce = URL_SAFE_NO_PAD.decode(nonce).ok()?;
        let ciphertext = URL_SAFE_NO_PAD.decode(ciphertext).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return None;
        }

        let nonce = Nonce::<Aes256Gcm>::from_slice(&nonce);
        let tag = Tag::<Aes256Gcm>::from_slice(&tag);

        let plaintext = std::iter::once(&self.primary)
            .chain(self.previous.iter())
            .find_map(|cipher| {
                let mut buffer = ciphertext.clone();
                cipher
                    .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
                    .ok()
                    .map(|()| buffer)
            })?;

        serde_json::from_slice(&plaintext).ok()
    }
}

fn derive_cipher(secret: &str, salt: &str, iterations: u32) -> Aes256Gcm {
    let key = pbkdf2_hmac_array::<Sha256, KEY_LEN>(secret.as_bytes(), salt.as_bytes(), iterations);
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{TokenSet, UserInfo};

    fn test_config() -> CookieConfig {
        CookieConfig::new("correct horse battery staple").with_pbkdf2_iterations(1_000)
    }

    fn test_codec() -> SessionCodec {
        SessionCodec::new(&test_config()).expect("codec")
    }

    fn sample_session() -> Session {
        let tokens: TokenSet = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "id_token": "it",
            "expires_in": 300
        }))
        .expect("tokens");
        let user = UserInfo {
            sub: Some("user1".to_string()),
            email: Some("u@example.com".to_string()),
            ..UserInfo::default()
        };
        Session::new(tokens, Some(user), vec!["odin_users".to_string()])
            .with_roles_and_permissions(vec!["editor".to_string()], vec!["manage:triggers".to_string()])
    }

    /// Flips one bit of the decoded segment at `index` and re-encodes the token.
    fn flip_bit(token: &str, index: usize, byte: usize) -> String {
        let mut segments: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut bytes = URL_SAFE_NO_PAD.decode(&segments[index]).expect("decode");
        bytes[byte] ^= 0x01;
        segments[index] = URL_SAFE_NO_PAD.encode(&bytes);
        segments.join(".")
    }

    #[test]
    fn seal_then_open_round_trips() {
        let codec = test_codec();
        let session = sample_session();
        let token = codec.seal(&session).expect("seal");
        assert_eq!(codec.open(&token), Some(session));
    }

    #[test]
    fn token_has_three_url_safe_segments() {
        let token = test_codec().seal(&sample_session()).expect("seal");
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[0]).expect("nonce").len(), NONCE_LEN);
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[2]).expect("tag").len(), TAG_LEN);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        );
    }

    #[test]
    fn each_seal_uses_a_fresh_nonce() {
        let codec = test_codec();
        let session = sample_session();
        let first = codec.seal(&session).expect("seal");
        let second = codec.seal(&session).expect("seal");
        assert_ne!(first.split('.').next(), second.split('.').next());
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_tokens_do_not_open() {
        let codec = test_codec();
        let token = codec.seal(&sample_session()).expect("seal");
        let (head, _) = token.rsplit_once('.').expect("segments");

        for bad in [
            String::new(),
            "garbage".to_string(),
            "a.b".to_string(),
            head.to_string(),
            format!("{token}.extra"),
            "!!!.???.***".to_string(),
            "...".to_string(),
        ] {
            assert_eq!(codec.open(&bad), None, "token {bad:?} should not open");
        }
    }

    #[test]
    fn flipped_ciphertext_bit_is_rejected() {
        let codec = test_codec();
        let token = codec.seal(&sample_session()).expect("seal");
        assert_eq!(codec.open(&flip_bit(&token, 1, 0)), None);
    }

    #[test]
    fn flipped_tag_bit_is_rejected() {
        let codec = test_codec();
        let token = codec.seal(&sample_session()).expect("seal");
        for byte in [0, TAG_LEN - 1] {
            assert_eq!(codec.open(&flip_bit(&token, 2, byte)), None);
        }
    }

    #[test]
    fn truncated_tag_is_rejected() {
        let codec = test_codec();
        let token = codec.seal(&sample_session()).expect("seal");
        let mut segments: Vec<String> = token.split('.').map(str::to_string).collect();
        let tag = URL_SAFE_NO_PAD.decode(&segments[2]).expect("tag");
        segments[2] = URL_SAFE_NO_PAD.encode(&tag[..8]);
        assert_eq!(codec.open(&segments.join(".")), None);
    }

    #[test]
    fn authentic_non_session_payload_is_rejected() {
        let config = test_config();
        let cipher = derive_cipher(
            config.secret().expect("secret"),
            config.salt(),
            config.pbkdf2_iterations(),
        );
        let mut buffer = b"not json at all".to_vec();
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let tag = cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .expect("encrypt");
        let token = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(&buffer),
            URL_SAFE_NO_PAD.encode(tag)
        );
        assert_eq!(test_codec().open(&token), None);
    }

    #[test]
    fn other_secret_cannot_open() {
        let token = test_codec().seal(&sample_session()).expect("seal");
        let other = SessionCodec::new(
            &CookieConfig::new("a different secret").with_pbkdf2_iterations(1_000),
        )
        .expect("codec");
        assert_eq!(other.open(&token), None);
    }

    #[test]
    fn previous_salt_still_opens_after_rotation() {
        let old = SessionCodec::new(&test_config().with_salt("od_cookie_salt_v1")).expect("codec");
        let token = old.seal(&sample_session()).expect("seal");

        let rotated = SessionCodec::new(
            &test_config()
                .with_salt("od_cookie_salt_v2")
                .with_previous_salts(vec!["od_cookie_salt_v1".to_string()]),
        )
        .expect("codec");
        assert_eq!(rotated.open(&token), Some(sample_session()));

        let fresh = rotated.seal(&sample_session()).expect("seal");
        assert_eq!(old.open(&fresh), None);

        let retired = SessionCodec::new(&test_config().with_salt("od_cookie_salt_v2")).expect("codec");
        assert_eq!(retired.open(&token), None);
    }

    #[test]
    fn missing_secret_is_fatal() {
        let err = SessionCodec::new(&CookieConfig::default()).unwrap_err();
        assert!(err.to_string().contains("cookie secret"));

        let err = SessionCodec::new(&CookieConfig::new("")).unwrap_err();
        assert!(err.to_string().contains("cookie secret"));
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let err = SessionCodec::new(&CookieConfig::new("secret").with_pbkdf2_iterations(0)).unwrap_err();
        assert!(err.to_string().contains("iteration"));
    }

    #[test]
    fn config_defaults() {
        let config = CookieConfig::default();
        assert_eq!(config.salt(), "od_cookie_salt_v1");
        assert_eq!(config.pbkdf2_iterations(), 100_000);
        assert!(config.secret().is_none());
        assert!(config.previous_salts().is_empty());
    }

    #[test]
    fn config_debug_redacts_secret() {
        let rendered = format!("{:?}", CookieConfig::new("hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
