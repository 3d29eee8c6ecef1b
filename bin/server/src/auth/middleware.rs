//! Request gate, authentication extractors and permission checks for Axum.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, Uri, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use odin_platform_access::{CsrfViolation, Session, SessionCodec, authorize};
use serde_json::json;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AUDIT_TARGET, AppState};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "od_session";

/// Legacy header carrying comma-separated group names.
pub const GROUPS_HEADER: &str = "x-groups";

const PUBLIC_PREFIXES: &[&str] = &["/auth", "/_app", "/static", "/images"];
const PUBLIC_FILES: &[&str] = &[
    "/robots.txt",
    "/site.webmanifest",
    "/favicon.ico",
    "/api/health",
];
const PUBLIC_SUFFIXES: &[&str] = &[".css", ".js", ".png", ".svg", ".webmanifest"];

/// Returns true for paths that bypass authentication.
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
        || PUBLIC_FILES.contains(&path)
        || PUBLIC_SUFFIXES.iter().any(|s| path.ends_with(s))
}

/// Opens the session cookie. Any failure, including an absent cookie, is
/// "no session".
pub fn session_from_jar(codec: &SessionCodec, jar: &CookieJar) -> Option<Session> {
    let cookie = jar.get(SESSION_COOKIE)?;
    let session = codec.open(cookie.value());
    if session.is_none() {
        debug!("session cookie present but did not open");
    }
    session
}

/// Opens the session cookie from raw request headers.
pub fn session_from_headers(codec: &SessionCodec, headers: &HeaderMap) -> Option<Session> {
    session_from_jar(codec, &CookieJar::from_headers(headers))
}

/// Returns the session or the rejection an anonymous request gets.
pub fn require_auth(
    session: Option<Session>,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Session, AuthRejection> {
    session.ok_or_else(|| AuthRejection::unauthenticated(uri, headers))
}

/// Checks that `session` holds `permission`.
pub fn require_permission(
    session: &Session,
    headers: &HeaderMap,
    permission: &str,
) -> Result<(), AuthRejection> {
    let legacy_groups = headers
        .get(GROUPS_HEADER)
        .and_then(|v| v.to_str().ok());
    let decision = authorize(session, legacy_groups, permission);
    if decision.is_granted() {
        return Ok(());
    }

    warn!(
        target: AUDIT_TARGET,
        action = "authz.deny",
        permission,
        email = session.email().unwrap_or("-"),
        ?decision,
        "permission denied"
    );
    Err(AuthRejection::Forbidden)
}

/// Gate applied to every route: public paths pass, everything else needs a
/// session.
pub async fn gate(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let session = session_from_headers(&state.codec, request.headers());
    match require_auth(session, request.uri(), request.headers()) {
        Ok(_) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}

/// Extractor for requiring an authenticated session.
pub struct RequireAuth(pub Session);

impl<S> FromRequestParts<S> for RequireAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let session = session_from_headers(&app_state.codec, &parts.headers);
        require_auth(session, &parts.uri, &parts.headers).map(RequireAuth)
    }
}

/// Extractor for optionally getting the session.
///
/// Returns None if the request is anonymous.
pub struct OptionalAuth(pub Option<Session>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        Ok(OptionalAuth(session_from_headers(
            &app_state.codec,
            &parts.headers,
        )))
    }
}

/// A permission a route requires, named at the type level.
pub trait RequiredPermission {
    const PERMISSION: &'static str;
}

/// `view:triggers`
pub struct ViewTriggers;

impl RequiredPermission for ViewTriggers {
    const PERMISSION: &'static str = "view:triggers";
}

/// `manage:triggers`
pub struct ManageTriggers;

impl RequiredPermission for ManageTriggers {
    const PERMISSION: &'static str = "manage:triggers";
}

/// `manage:users`
pub struct ManageUsers;

impl RequiredPermission for ManageUsers {
    const PERMISSION: &'static str = "manage:users";
}

/// Extractor for requiring a session that holds `P::PERMISSION`.
pub struct RequirePermission<P>(pub Session, PhantomData<P>);

impl<P> RequirePermission<P> {
    /// Returns the authorized session.
    pub fn into_session(self) -> Session {
        self.0
    }
}

impl<S, P> FromRequestParts<S> for RequirePermission<P>
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
    P: RequiredPermission + Send,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(session) = RequireAuth::from_request_parts(parts, state).await?;
        require_permission(&session, &parts.headers, P::PERMISSION)?;
        Ok(RequirePermission(session, PhantomData))
    }
}

/// Rejection type for the gate and its extractors.
///
/// There is no internal-error variant: a check that cannot complete denies.
#[derive(Debug)]
pub enum AuthRejection {
    /// No valid session.
    Unauthenticated { return_to: String, wants_json: bool },
    /// Authenticated but missing the permission.
    Forbidden,
    /// Double-submit CSRF check failed.
    Csrf(CsrfViolation),
}

impl AuthRejection {
    /// Builds the anonymous-request rejection for this request.
    pub fn unauthenticated(uri: &Uri, headers: &HeaderMap) -> Self {
        let wants_json = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("application/json"))
            || uri.path().starts_with("/api");
        let return_to = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
        Self::Unauthenticated {
            return_to,
            wants_json,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated {
                wants_json: true, ..
            } => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthenticated" })),
            )
                .into_response(),
            Self::Unauthenticated { return_to, .. } => {
                let location = format!(
                    "/auth/login?returnTo={}",
                    urlencoding::encode(&return_to)
                );
                super::routes::found(&location)
            }
            Self::Forbidden => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": "Forbidden" }))).into_response()
            }
            Self::Csrf(violation) => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": violation.message() })),
            )
                .into_response(),
        }
    }
}
