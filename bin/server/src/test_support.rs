//! Shared fixtures for server tests.

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::{Form, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use odin_core::TriggerId;
use odin_platform_access::{
    CookieConfig, OidcConfig, RoleStore, RoleStoreError, Session, SessionCodec,
};
use rootcause::Report;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::{AppState, OidcClient, middleware::SESSION_COOKIE};
use crate::db::{
    AuditEntry, AuditSink, NewTrigger, PermissionRecord, RbacStore, RoleChanges, RoleRecord,
    TriggerChanges, TriggerRecord, TriggerStore,
};
use uuid::Uuid;

/// How the mock identity provider responds.
#[derive(Debug, Clone, Default)]
pub struct ProviderBehavior {
    pub discovery_fails: bool,
    pub token_fails: bool,
    pub userinfo_fails: bool,
    /// Userinfo document; a default identity when `None`.
    pub userinfo: Option<Value>,
}

/// Request counters and captured input of the mock provider.
#[derive(Debug, Default)]
pub struct ProviderState {
    pub discovery_hits: AtomicUsize,
    pub token_hits: AtomicUsize,
    pub userinfo_hits: AtomicUsize,
    token_forms: Mutex<Vec<HashMap<String, String>>>,
    behavior: ProviderBehavior,
    base_url: String,
}

/// An OIDC provider served from a throwaway local listener.
pub struct MockProvider {
    pub state: Arc<ProviderState>,
}

impl MockProvider {
    pub async fn start(behavior: ProviderBehavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock provider");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(ProviderState {
            behavior,
            base_url: format!("http://{addr}"),
            ..ProviderState::default()
        });

        let app = Router::new()
            .route("/.well-known/openid-configuration", get(discovery))
            .route("/token", post(token))
            .route("/userinfo", get(userinfo))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock provider");
        });

        Self { state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.state.base_url)
    }

    pub fn discovery_url(&self) -> String {
        self.url("/.well-known/openid-configuration")
    }

    pub fn last_token_form(&self) -> HashMap<String, String> {
        self.state
            .token_forms
            .lock()
            .expect("token forms")
            .last()
            .cloned()
            .expect("a token request")
    }
}

async fn discovery(State(state): State<Arc<ProviderState>>) -> Response {
    state.discovery_hits.fetch_add(1, Ordering::SeqCst);
    if state.behavior.discovery_fails {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({
        "issuer": state.base_url,
        "authorization_endpoint": format!("{}/authorize", state.base_url),
        "token_endpoint": format!("{}/token", state.base_url),
        "userinfo_endpoint": format!("{}/userinfo", state.base_url),
        "jwks_uri": format!("{}/jwks", state.base_url),
    }))
    .into_response()
}

async fn token(
    State(state): State<Arc<ProviderState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_hits.fetch_add(1, Ordering::SeqCst);
    state.token_forms.lock().expect("token forms").push(form);
    if state.behavior.token_fails {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" }))).into_response();
    }
    Json(json!({
        "access_token": "access-token",
        "id_token": "id-token",
        "token_type": "Bearer",
        "expires_in": 300,
    }))
    .into_response()
}

async fn userinfo(State(state): State<Arc<ProviderState>>, headers: HeaderMap) -> Response {
    state.userinfo_hits.fetch_add(1, Ordering::SeqCst);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer access-token");
    if !authorized || state.behavior.userinfo_fails {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let document = state.behavior.userinfo.clone().unwrap_or_else(|| {
        json!({
            "sub": "user-1",
            "email": "user@example.com",
            "name": "Test User",
            "groups": ["triggers_viewer"],
        })
    });
    Json(document).into_response()
}

/// Codec with a test secret and a single PBKDF2 iteration.
pub fn test_codec() -> SessionCodec {
    SessionCodec::new(&CookieConfig::new("test-secret").with_pbkdf2_iterations(1))
        .expect("test codec")
}

/// State whose OIDC client points at `discovery_url` without contacting it.
pub fn app_state(discovery_url: String) -> AppState {
    let oidc = OidcClient::new(
        OidcConfig::builder(discovery_url, "odin".to_string())
            .client_secret("client-secret".to_string())
            .build(),
    )
    .expect("oidc client");
    AppState::new(test_codec(), oidc)
}

/// State with no reachable provider and no stores.
pub async fn test_state() -> Arc<AppState> {
    Arc::new(app_state(
        "http://127.0.0.1:9/.well-known/openid-configuration".to_string(),
    ))
}

/// A `Cookie` header value carrying `session`.
pub fn session_cookie_header(state: &AppState, session: &Session) -> String {
    let sealed = state.codec.seal(session).expect("seal session");
    format!("{SESSION_COOKIE}={sealed}")
}

pub async fn body_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// In-memory role assignments.
#[derive(Default)]
pub struct MemoryRoleStore {
    pub roles: HashMap<String, Vec<String>>,
    pub permissions: HashMap<String, Vec<String>>,
}

impl MemoryRoleStore {
    pub fn assign(mut self, email: &str, role: &str, permissions: &[&str]) -> Self {
        self.roles
            .entry(email.to_string())
            .or_default()
            .push(role.to_string());
        self.permissions.insert(
            role.to_string(),
            permissions.iter().map(|p| p.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn roles_for_email(&self, email: &str) -> Result<Vec<String>, Report<RoleStoreError>> {
        Ok(self.roles.get(email).cloned().unwrap_or_default())
    }

    async fn permissions_for_roles(
        &self,
        roles: &[String],
    ) -> Result<Vec<String>, Report<RoleStoreError>> {
        let mut permissions: Vec<String> = roles
            .iter()
            .filter_map(|r| self.permissions.get(r))
            .flatten()
            .cloned()
            .collect();
        permissions.sort();
        permissions.dedup();
        Ok(permissions)
    }
}

/// In-memory trigger store counting every call.
#[derive(Default)]
pub struct MemoryTriggerStore {
    triggers: Mutex<Vec<TriggerRecord>>,
    pub calls: AtomicUsize,
}

impl MemoryTriggerStore {
    pub fn with(triggers: Vec<TriggerRecord>) -> Self {
        Self {
            triggers: Mutex::new(triggers),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.triggers.lock().expect("triggers").len()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TriggerStore for MemoryTriggerStore {
    async fn list(&self) -> Result<Vec<TriggerRecord>, sqlx::Error> {
        self.touch();
        let mut triggers = self.triggers.lock().expect("triggers").clone();
        triggers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(triggers)
    }

    async fn get(&self, id: TriggerId) -> Result<Option<TriggerRecord>, sqlx::Error> {
        self.touch();
        let triggers = self.triggers.lock().expect("triggers");
        Ok(triggers.iter().find(|t| t.id == id).cloned())
    }

    async fn create(&self, new: NewTrigger) -> Result<TriggerRecord, sqlx::Error> {
        self.touch();
        let trigger = TriggerRecord::new(new);
        self.triggers.lock().expect("triggers").push(trigger.clone());
        Ok(trigger)
    }

    async fn update(
        &self,
        id: TriggerId,
        changes: TriggerChanges,
    ) -> Result<Option<TriggerRecord>, sqlx::Error> {
        self.touch();
        let mut triggers = self.triggers.lock().expect("triggers");
        Ok(triggers.iter_mut().find(|t| t.id == id).map(|t| {
            if let Some(name) = changes.name {
                t.name = name;
            }
            if let Some(expression) = changes.expression {
                t.expression = expression;
            }
            if let Some(enabled) = changes.enabled {
                t.enabled = enabled;
            }
            t.updated_at = chrono::Utc::now();
            t.clone()
        }))
    }

    async fn delete(&self, id: TriggerId) -> Result<bool, sqlx::Error> {
        self.touch();
        let mut triggers = self.triggers.lock().expect("triggers");
        let before = triggers.len();
        triggers.retain(|t| t.id != id);
        Ok(triggers.len() != before)
    }
}

/// In-memory RBAC tables counting every call.
#[derive(Default)]
pub struct MemoryRbacStore {
    roles: Mutex<Vec<RoleRecord>>,
    permissions: Mutex<Vec<PermissionRecord>>,
    pub user_roles: Mutex<Vec<(String, Uuid)>>,
    pub role_permissions: Mutex<Vec<(Uuid, String)>>,
    users: Vec<String>,
    pub calls: AtomicUsize,
}

impl MemoryRbacStore {
    /// A store that knows the users with these emails.
    pub fn with_users(emails: &[&str]) -> Self {
        Self {
            users: emails.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn has_role(&self, id: Uuid) -> bool {
        self.roles.lock().expect("roles").iter().any(|r| r.id == id)
    }
}

/// A duplicate-key failure, as Postgres would report it.
fn unique_violation() -> sqlx::Error {
    #[derive(Debug)]
    struct Duplicate;

    impl std::fmt::Display for Duplicate {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint")
        }
    }

    impl std::error::Error for Duplicate {}

    impl sqlx::error::DatabaseError for Duplicate {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    sqlx::Error::Database(Box::new(Duplicate))
}

#[async_trait]
impl RbacStore for MemoryRbacStore {
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, sqlx::Error> {
        self.touch();
        let mut roles = self.roles.lock().expect("roles").clone();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn get_role(&self, id: Uuid) -> Result<Option<RoleRecord>, sqlx::Error> {
        self.touch();
        let roles = self.roles.lock().expect("roles");
        Ok(roles.iter().find(|r| r.id == id).cloned())
    }

    async fn create_role(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<RoleRecord, sqlx::Error> {
        self.touch();
        let mut roles = self.roles.lock().expect("roles");
        if roles.iter().any(|r| r.name == name) {
            return Err(unique_violation());
        }
        let role = RoleRecord {
            id: Uuid::new_v4(),
            name,
            description,
        };
        roles.push(role.clone());
        Ok(role)
    }

    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> Result<Option<RoleRecord>, sqlx::Error> {
        self.touch();
        let mut roles = self.roles.lock().expect("roles");
        Ok(roles.iter_mut().find(|r| r.id == id).map(|r| {
            if let Some(name) = changes.name {
                r.name = name;
            }
            if let Some(description) = changes.description {
                r.description = Some(description);
            }
            r.clone()
        }))
    }

    async fn delete_role(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        self.touch();
        let mut roles = self.roles.lock().expect("roles");
        let before = roles.len();
        roles.retain(|r| r.id != id);
        Ok(roles.len() != before)
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, sqlx::Error> {
        self.touch();
        let mut permissions = self.permissions.lock().expect("permissions").clone();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn get_permission(&self, name: &str) -> Result<Option<PermissionRecord>, sqlx::Error> {
        self.touch();
        let permissions = self.permissions.lock().expect("permissions");
        Ok(permissions.iter().find(|p| p.name == name).cloned())
    }

    async fn create_permission(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<PermissionRecord, sqlx::Error> {
        self.touch();
        let mut permissions = self.permissions.lock().expect("permissions");
        if permissions.iter().any(|p| p.name == name) {
            return Err(unique_violation());
        }
        let permission = PermissionRecord { name, description };
        permissions.push(permission.clone());
        Ok(permission)
    }

    async fn update_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Option<PermissionRecord>, sqlx::Error> {
        self.touch();
        let mut permissions = self.permissions.lock().expect("permissions");
        Ok(permissions.iter_mut().find(|p| p.name == name).map(|p| {
            if description.is_some() {
                p.description = description;
            }
            p.clone()
        }))
    }

    async fn delete_permission(&self, name: &str) -> Result<bool, sqlx::Error> {
        self.touch();
        let mut permissions = self.permissions.lock().expect("permissions");
        let before = permissions.len();
        permissions.retain(|p| p.name != name);
        Ok(permissions.len() != before)
    }

    async fn assign_role(&self, email: &str, role_id: Uuid) -> Result<bool, sqlx::Error> {
        self.touch();
        if !self.users.iter().any(|u| u == email) || !self.has_role(role_id) {
            return Ok(false);
        }
        let mut assigned = self.user_roles.lock().expect("user roles");
        let pair = (email.to_string(), role_id);
        if !assigned.contains(&pair) {
            assigned.push(pair);
        }
        Ok(true)
    }

    async fn assign_permission(
        &self,
        role_id: Uuid,
        permission: &str,
    ) -> Result<bool, sqlx::Error> {
        self.touch();
        let known = self
            .permissions
            .lock()
            .expect("permissions")
            .iter()
            .any(|p| p.name == permission);
        if !known || !self.has_role(role_id) {
            return Ok(false);
        }
        let mut assigned = self.role_permissions.lock().expect("role permissions");
        let pair = (role_id, permission.to_string());
        if !assigned.contains(&pair) {
            assigned.push(pair);
        }
        Ok(true)
    }
}

/// Collects audit entries; fails every write when `failing` is set.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    pub failing: bool,
}

impl MemoryAuditSink {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit entries").clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, entry: &AuditEntry) -> Result<(), sqlx::Error> {
        if self.failing {
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.entries
            .lock()
            .expect("audit entries")
            .push(entry.clone());
        Ok(())
    }
}
