//! Authentication routes for login, callback, logout, CSRF and `me`.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use odin_platform_access::{
    LoginStage, PkceTransaction, Session, enrich_session, generate_csrf_token, groups_from_claims,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::{info, warn};

use crate::db::AuditEntry;

use super::{
    AUDIT_TARGET, AppState, OptionalAuth, RequireAuth,
    csrf::csrf_cookie,
    middleware::SESSION_COOKIE,
    oidc::OidcError,
};

/// PKCE verifier cookie name.
pub const PKCE_VERIFIER_COOKIE: &str = "od_pkce_verifier";

/// OAuth state cookie name.
pub const OAUTH_STATE_COOKIE: &str = "od_oauth_state";

/// Post-login destination cookie name.
pub const RETURN_TO_COOKIE: &str = "od_return_to";

const CALLBACK_PATH: &str = "/auth/callback";

/// Responds 302 Found.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn strict_cookie(name: &'static str, value: String, max_age: TimeDuration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}

/// Accepts only same-origin relative paths.
fn safe_return_to(return_to: Option<&str>) -> Option<&str> {
    return_to.filter(|r| r.starts_with('/') && !r.starts_with("//") && !r.contains('\\'))
}

fn is_https(uri: &Uri, headers: &HeaderMap, trust_forwarded_proto: bool) -> bool {
    if uri.scheme_str() == Some("https") {
        return true;
    }
    trust_forwarded_proto
        && headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

fn request_host<'a>(uri: &'a Uri, headers: &'a HeaderMap) -> Option<&'a str> {
    uri.authority()
        .map(|a| a.as_str())
        .or_else(|| headers.get(header::HOST).and_then(|v| v.to_str().ok()))
}

/// The callback URI registered with the provider. It never varies with the
/// post-login destination.
fn redirect_uri(state: &AppState, uri: &Uri, headers: &HeaderMap) -> Option<String> {
    match state.oidc_client.config().redirect_uri() {
        Some(configured) => Some(configured.to_string()),
        None => Some(format!(
            "https://{}{CALLBACK_PATH}",
            request_host(uri, headers)?
        )),
    }
}

/// Query parameters for the login route.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnTo")]
    return_to: Option<String>,
}

/// Starts the PKCE login flow by redirecting to the identity provider.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    uri: Uri,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, CallbackError> {
    info!(stage = %LoginStage::Initiated, "login requested");
    if !is_https(&uri, &headers, state.trust_forwarded_proto) {
        return Err(CallbackError::HttpsRequired);
    }
    let redirect_uri = redirect_uri(&state, &uri, &headers).ok_or(CallbackError::MissingHost)?;

    let transaction = PkceTransaction::new();
    let auth_url = state
        .oidc_client
        .authorization_url(&transaction, &redirect_uri)
        .await
        .map_err(CallbackError::Provider)?;

    info!(stage = %LoginStage::Redirected, "redirecting to identity provider");

    let five_minutes = TimeDuration::minutes(5);
    let mut jar = jar
        .add(strict_cookie(
            PKCE_VERIFIER_COOKIE,
            transaction.code_verifier().to_string(),
            five_minutes,
        ))
        .add(strict_cookie(
            OAUTH_STATE_COOKIE,
            transaction.state().to_string(),
            five_minutes,
        ));
    jar = match safe_return_to(query.return_to.as_deref()) {
        Some(path) => jar.add(strict_cookie(RETURN_TO_COOKIE, path.to_string(), five_minutes)),
        None => jar.add(removal_cookie(RETURN_TO_COOKIE)),
    };

    Ok((jar, found(&auth_url)))
}

/// Query parameters for the OIDC callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// Completes the login: verifies state, exchanges the code, and issues the
/// session and CSRF cookies.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    uri: Uri,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, CallbackError> {
    info!(stage = %LoginStage::CallbackReceived, "login callback received");

    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(CallbackError::CodeRequired)?;

    let stored_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let verifier = jar
        .get(PKCE_VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(CallbackError::InvalidState)?;
    match (stored_state.as_deref(), query.state.as_deref()) {
        (Some(stored), Some(received)) if stored == received => {}
        _ => return Err(CallbackError::InvalidState),
    }

    let redirect_uri = redirect_uri(&state, &uri, &headers).ok_or(CallbackError::MissingHost)?;

    let tokens = state
        .oidc_client
        .exchange_code(code, &verifier, &redirect_uri)
        .await
        .map_err(CallbackError::Provider)?;
    info!(stage = %LoginStage::TokenExchanged, "authorization code exchanged");

    let user = match state.oidc_client.user_info(&tokens).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "userinfo unavailable, continuing without identity claims");
            None
        }
    };
    if user.is_some() {
        info!(stage = %LoginStage::UserinfoFetched, "userinfo fetched");
    }

    let groups = groups_from_claims(user.as_ref());
    let session = enrich_session(Session::new(tokens, user, groups), state.role_store()).await;

    let sealed = state.codec.seal(&session).map_err(|e| {
        tracing::error!(error = %e, "failed to seal session");
        CallbackError::SessionIssue
    })?;

    info!(stage = %LoginStage::SessionIssued, "session issued");
    state
        .audit(
            AuditEntry::new("login.success")
                .actor(session.email())
                .data(json!({ "groups": session.groups() })),
        )
        .await;

    let destination = safe_return_to(jar.get(RETURN_TO_COOKIE).map(|c| c.value()))
        .unwrap_or("/")
        .to_string();

    let jar = jar
        .add(strict_cookie(SESSION_COOKIE, sealed, TimeDuration::days(7)))
        .add(csrf_cookie(generate_csrf_token()))
        .add(removal_cookie(PKCE_VERIFIER_COOKIE))
        .add(removal_cookie(OAUTH_STATE_COOKIE))
        .add(removal_cookie(RETURN_TO_COOKIE));

    Ok((jar, found(&destination)))
}

/// Logs out by clearing the session and CSRF cookies.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    OptionalAuth(session): OptionalAuth,
    jar: CookieJar,
) -> impl IntoResponse {
    state
        .audit(AuditEntry::new("logout").actor(session.as_ref().and_then(Session::email)))
        .await;
    let jar = jar
        .add(removal_cookie(SESSION_COOKIE))
        .add(removal_cookie(odin_platform_access::CSRF_COOKIE));
    (jar, found("/"))
}

/// Issues a fresh CSRF token to an authenticated client.
pub async fn csrf_token(RequireAuth(_session): RequireAuth, jar: CookieJar) -> impl IntoResponse {
    let token = generate_csrf_token();
    let jar = jar.add(csrf_cookie(token.clone()));
    (jar, Json(json!({ "csrfToken": token })))
}

/// Returns the current identity with live role enrichment.
pub async fn me(
    State(state): State<Arc<AppState>>,
    RequireAuth(session): RequireAuth,
) -> impl IntoResponse {
    let session = enrich_session(session, state.role_store()).await;
    Json(json!({
        "user": session.user(),
        "roles": session.roles().unwrap_or_default(),
        "permissions": session.permissions().unwrap_or_default(),
        "groups": session.groups(),
    }))
}

/// Login flow errors.
#[derive(Debug)]
pub enum CallbackError {
    HttpsRequired,
    MissingHost,
    CodeRequired,
    InvalidState,
    Provider(OidcError),
    SessionIssue,
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::HttpsRequired => (StatusCode::BAD_REQUEST, "HTTPS required for auth endpoints"),
            Self::MissingHost => (StatusCode::BAD_REQUEST, "Host header required"),
            Self::CodeRequired => (StatusCode::BAD_REQUEST, "code required"),
            Self::InvalidState => (StatusCode::BAD_REQUEST, "invalid state"),
            Self::Provider(OidcError::TokenExchange(_)) => {
                (StatusCode::BAD_GATEWAY, "Token exchange failed")
            }
            Self::Provider(OidcError::RedirectUri(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid redirect URI")
            }
            Self::Provider(_) => (StatusCode::BAD_GATEWAY, "Identity provider unavailable"),
            Self::SessionIssue => (StatusCode::INTERNAL_SERVER_ERROR, "Login failed"),
        };

        match &self {
            Self::Provider(e) => warn!(
                target: AUDIT_TARGET,
                action = "login.failure",
                stage = %LoginStage::Failed,
                error = %e,
                "login failed"
            ),
            _ => warn!(
                target: AUDIT_TARGET,
                action = "login.failure",
                stage = %LoginStage::Failed,
                reason = message,
                "login rejected"
            ),
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
