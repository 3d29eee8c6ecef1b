//! Authentication module for the odin server.
//!
//! This module provides:
//! - OIDC/PKCE login with an external identity provider
//! - Encrypted cookie sessions (no server-side session table)
//! - The request gate, authentication and permission extractors for Axum
//! - Double-submit CSRF protection for state-changing requests
//!
//! # Authorization Model
//!
//! A request is first classified by path: allowlisted paths are public,
//! everything else needs a session. Handlers then ask for a permission with
//! [`RequirePermission`]. Database-backed permissions, when a session has
//! them, are authoritative; otherwise identity-provider groups are mapped
//! through the static group table.

pub mod csrf;
pub mod db;
pub mod middleware;
pub mod oidc;
pub mod routes;

use odin_platform_access::{RoleStore, SessionCodec};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::db::{AuditEntry, AuditSink, RbacStore, TriggerStore};

pub use csrf::CsrfGuard;
pub use middleware::{
    AuthRejection, ManageTriggers, ManageUsers, OptionalAuth, RequireAuth, RequirePermission,
    RequiredPermission, ViewTriggers,
};
pub use oidc::{OidcClient, OidcError};
pub use routes::{callback, csrf_token, login, logout, me};

/// Target for audit-style authentication and authorization events.
pub const AUDIT_TARGET: &str = "odin::audit";

/// Shared application state.
pub struct AppState {
    /// Seals and opens session cookies.
    pub codec: SessionCodec,
    /// OIDC client for authentication.
    pub oidc_client: OidcClient,
    /// Database-backed roles and permissions, when configured.
    pub role_store: Option<Arc<dyn RoleStore>>,
    /// Trigger persistence, when configured.
    pub triggers: Option<Arc<dyn TriggerStore>>,
    /// Role and permission administration, when configured.
    pub rbac: Option<Arc<dyn RbacStore>>,
    /// Durable audit trail, when configured.
    pub audit_sink: Option<Arc<dyn AuditSink>>,
    /// Whether `x-forwarded-proto` is believed for HTTPS detection.
    pub trust_forwarded_proto: bool,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Creates a new application state without database collaborators.
    pub fn new(codec: SessionCodec, oidc_client: OidcClient) -> Self {
        Self {
            codec,
            oidc_client,
            role_store: None,
            triggers: None,
            rbac: None,
            audit_sink: None,
            trust_forwarded_proto: false,
            started_at: Instant::now(),
        }
    }

    /// Attaches a role store used to enrich sessions.
    #[must_use]
    pub fn with_role_store(mut self, store: Arc<dyn RoleStore>) -> Self {
        self.role_store = Some(store);
        self
    }

    /// Attaches trigger persistence.
    #[must_use]
    pub fn with_triggers(mut self, store: Arc<dyn TriggerStore>) -> Self {
        self.triggers = Some(store);
        self
    }

    /// Attaches RBAC administration storage.
    #[must_use]
    pub fn with_rbac(mut self, store: Arc<dyn RbacStore>) -> Self {
        self.rbac = Some(store);
        self
    }

    /// Attaches a durable audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Sets whether `x-forwarded-proto` is trusted.
    #[must_use]
    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }

    /// Returns the role store as a trait object reference.
    pub fn role_store(&self) -> Option<&dyn RoleStore> {
        self.role_store.as_deref()
    }

    /// Emits an audit event and persists it when a sink is attached.
    /// Persistence failures are logged and never reach the caller.
    pub async fn audit(&self, entry: AuditEntry) {
        info!(
            target: AUDIT_TARGET,
            action = entry.action,
            resource = entry.resource.unwrap_or("-"),
            resource_id = entry.resource_id.as_deref().unwrap_or("-"),
            email = entry.actor_email.as_deref().unwrap_or("-"),
            outcome = entry.outcome,
            data = %entry.data,
            "audit event"
        );
        if let Some(sink) = &self.audit_sink {
            if let Err(e) = sink.write(&entry).await {
                warn!(error = %e, action = entry.action, "audit persistence failed");
            }
        }
    }
}
