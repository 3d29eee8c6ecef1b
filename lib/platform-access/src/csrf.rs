//! Double-submit CSRF tokens.
//!
//! The token lives in a cookie that client script can read and must be
//! echoed in the `x-csrf-token` header on state-changing requests. A forging
//! site can make the browser send the cookie but cannot read it to set the
//! header. The token is independent of the session.

use oauth2::CsrfToken;
use std::fmt;
use subtle::ConstantTimeEq;

/// Name of the CSRF cookie.
pub const CSRF_COOKIE: &str = "od_csrf";

/// Name of the header that must mirror the CSRF cookie.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Why a double-submit check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfViolation {
    /// The cookie or the header is absent.
    Missing,
    /// Both are present but differ.
    Mismatch,
}

impl CsrfViolation {
    /// The client-facing error message.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Missing => "CSRF token missing",
            Self::Mismatch => "CSRF token mismatch",
        }
    }
}

impl fmt::Display for CsrfViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for CsrfViolation {}

/// Generates a fresh token: 16 random bytes, base64url encoded.
#[must_use]
pub fn generate_csrf_token() -> String {
    CsrfToken::new_random().secret().clone()
}

/// Checks that the header value equals the cookie value byte for byte.
///
/// # Errors
///
/// Returns `CsrfViolation::Missing` if either value is absent or empty, and
/// `CsrfViolation::Mismatch` if they differ.
pub fn verify_double_submit(cookie: Option<&str>, header: Option<&str>) -> Result<(), CsrfViolation> {
    let (Some(cookie), Some(header)) = (
        cookie.filter(|c| !c.is_empty()),
        header.filter(|h| !h.is_empty()),
    ) else {
        return Err(CsrfViolation::Missing);
    };

    if bool::from(cookie.as_bytes().ct_eq(header.as_bytes())) {
        Ok(())
    } else {
        Err(CsrfViolation::Mismatch)
    }
}
