//! CSRF cookie and the double-submit guard extractor.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use odin_platform_access::{CSRF_COOKIE, CSRF_HEADER, verify_double_submit};
use time::Duration as TimeDuration;
use tracing::warn;

use super::{AUDIT_TARGET, AuthRejection};

/// Builds the CSRF cookie. Client script must be able to read it, so it is
/// not `HttpOnly`.
pub fn csrf_cookie(token: String) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .path("/")
        .http_only(false)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::days(7))
        .build()
}

/// Proof that the request passed the double-submit check.
///
/// Place it before any body extractor so a forged request is rejected
/// before business logic runs.
#[derive(Debug)]
pub struct CsrfGuard;

impl<S> FromRequestParts<S> for CsrfGuard
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = jar.get(CSRF_COOKIE).map(|c| c.value());
        let header = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok());

        verify_double_submit(cookie, header).map_err(|violation| {
            warn!(
                target: AUDIT_TARGET,
                action = "csrf.reject",
                method = %parts.method,
                path = parts.uri.path(),
                reason = %violation,
                "CSRF check failed"
            );
            AuthRejection::Csrf(violation)
        })?;
        Ok(CsrfGuard)
    }
}
