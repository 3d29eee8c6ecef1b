//! Database-backed roles and permissions.
//!
//! A user's email maps, through user→role and role→permission relations,
//! to a set of role names and a set of permission names. The store is an
//! optional collaborator: when it is absent, sessions keep their
//! claim-derived groups only.

use crate::error::RoleStoreError;
use crate::session::Session;
use async_trait::async_trait;
use rootcause::Report;
use serde::Serialize;
use tracing::{debug, warn};

/// Role names that grant every permission when found in `Session::roles`.
pub const ADMIN_ROLES: &[&str] = &["admin", crate::group::ODIN_ADMINS];

/// Source of role and permission assignments.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Returns the role names assigned to the user with this email.
    async fn roles_for_email(&self, email: &str) -> Result<Vec<String>, Report<RoleStoreError>>;

    /// Returns the permission names granted by any of `roles`.
    async fn permissions_for_roles(
        &self,
        roles: &[String],
    ) -> Result<Vec<String>, Report<RoleStoreError>>;
}

/// Roles and permissions resolved for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RolesAndPermissions {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl RolesAndPermissions {
    /// Returns true if no role was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Resolves roles and permissions for `email`.
///
/// An empty email or a missing store is an explicit opt-out and yields an
/// empty result. Permissions are only queried when at least one role
/// resolved.
///
/// # Errors
///
/// Propagates any store failure.
pub async fn roles_and_permissions_by_email(
    store: Option<&dyn RoleStore>,
    email: &str,
) -> Result<RolesAndPermissions, Report<RoleStoreError>> {
    let Some(store) = store else {
        return Ok(RolesAndPermissions::default());
    };
    if email.is_empty() {
        return Ok(RolesAndPermissions::default());
    }

    let roles = store.roles_for_email(email).await?;
    if roles.is_empty() {
        return Ok(RolesAndPermissions::default());
    }

    let permissions = store.permissions_for_roles(&roles).await?;
    Ok(RolesAndPermissions { roles, permissions })
}

/// Attaches database-backed roles and permissions to a session.
///
/// Best effort: without a store or an email the session is returned as is,
/// and a store failure is logged and discarded. Roles and permissions are
/// only recorded when at least one role resolved, so an unknown user keeps
/// group-based authorization.
pub async fn enrich_session(session: Session, store: Option<&dyn RoleStore>) -> Session {
    let Some(store) = store else {
        return session;
    };
    let Some(email) = session.email().map(str::to_string) else {
        debug!("no email claim, skipping role enrichment");
        return session;
    };

    match roles_and_permissions_by_email(Some(store), &email).await {
        Ok(resolved) if resolved.is_empty() => session,
        Ok(resolved) => {
            debug!(
                roles = resolved.roles.len(),
                permissions = resolved.permissions.len(),
                "session enriched from role store"
            );
            session.with_roles_and_permissions(resolved.roles, resolved.permissions)
        }
        Err(e) => {
            warn!(error = %e, "role enrichment failed, continuing with claim groups");
            session
        }
    }
}
