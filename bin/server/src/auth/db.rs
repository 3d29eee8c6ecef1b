//! Postgres-backed role and permission lookups.

use async_trait::async_trait;
use odin_platform_access::{RoleStore, RoleStoreError};
use rootcause::Report;
use sqlx::{FromRow, PgPool};

/// Row type for role name queries.
#[derive(FromRow)]
struct RoleRow {
    name: String,
}

/// Row type for permission queries.
#[derive(FromRow)]
struct PermissionRow {
    permission_name: String,
}

fn query_failed(query: &'static str, e: sqlx::Error) -> Report<RoleStoreError> {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RoleStoreError::Unavailable {
                details: e.to_string(),
            }
            .into()
        }
        e => RoleStoreError::QueryFailed {
            query,
            details: e.to_string(),
        }
        .into(),
    }
}

/// Role store reading `users`, `roles`, `user_roles` and `role_permissions`.
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn roles_for_email(&self, email: &str) -> odin_core::Result<Vec<String>, RoleStoreError> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            r#"
            SELECT r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            JOIN users u ON u.id = ur.user_id
            WHERE u.email = $1
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("roles_for_email", e))?;

        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn permissions_for_roles(
        &self,
        roles: &[String],
    ) -> odin_core::Result<Vec<String>, RoleStoreError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<PermissionRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT rp.permission_name
            FROM role_permissions rp
            JOIN roles r ON rp.role_id = r.id
            WHERE r.name = ANY($1)
            "#,
        )
        .bind(roles)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("permissions_for_roles", e))?;

        Ok(rows.into_iter().map(|r| r.permission_name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_are_unavailable() {
        let report = query_failed("roles_for_email", sqlx::Error::PoolTimedOut);
        assert!(report.to_string().contains("role store unavailable"));
    }

    #[test]
    fn other_failures_name_the_query() {
        let report = query_failed("permissions_for_roles", sqlx::Error::RowNotFound);
        assert!(report.to_string().contains("permissions_for_roles"));
    }
}
