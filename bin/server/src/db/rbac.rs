//! Role, permission and assignment administration.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A row of `roles`.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct RoleRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// A row of `permissions`, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PermissionRecord {
    pub name: String,
    pub description: Option<String>,
}

/// Fields to change on a role. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Storage behind the RBAC admin API.
///
/// Assignment methods return `false` when either side of the assignment
/// does not exist. Re-assigning an existing pair is a success.
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, sqlx::Error>;

    async fn get_role(&self, id: Uuid) -> Result<Option<RoleRecord>, sqlx::Error>;

    async fn create_role(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<RoleRecord, sqlx::Error>;

    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> Result<Option<RoleRecord>, sqlx::Error>;

    async fn delete_role(&self, id: Uuid) -> Result<bool, sqlx::Error>;

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, sqlx::Error>;

    async fn get_permission(&self, name: &str) -> Result<Option<PermissionRecord>, sqlx::Error>;

    async fn create_permission(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<PermissionRecord, sqlx::Error>;

    async fn update_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Option<PermissionRecord>, sqlx::Error>;

    async fn delete_permission(&self, name: &str) -> Result<bool, sqlx::Error>;

    /// Grants the role to the user with `email`.
    async fn assign_role(&self, email: &str, role_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Grants the named permission to the role.
    async fn assign_permission(
        &self,
        role_id: Uuid,
        permission: &str,
    ) -> Result<bool, sqlx::Error>;
}

/// Returns true when `e` is a unique-key violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Repository over `roles`, `permissions`, `user_roles` and
/// `role_permissions`.
pub struct RbacRepository {
    pool: PgPool,
}

impl RbacRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RbacStore for RbacRepository {
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, name, description
            FROM roles
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_role(&self, id: Uuid) -> Result<Option<RoleRecord>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, name, description
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_role(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<RoleRecord, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO roles (id, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, description
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> Result<Option<RoleRecord>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                description = COALESCE($3, description)
            WHERE id = $1
            RETURNING id, name, description
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.description)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_role(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT name, description
            FROM permissions
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_permission(&self, name: &str) -> Result<Option<PermissionRecord>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT name, description
            FROM permissions
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_permission(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<PermissionRecord, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO permissions (name, description)
            VALUES ($1, $2)
            RETURNING name, description
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Option<PermissionRecord>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE permissions
            SET description = COALESCE($2, description)
            WHERE name = $1
            RETURNING name, description
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_permission(&self, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM permissions WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn assign_role(&self, email: &str, role_id: Uuid) -> Result<bool, sqlx::Error> {
        let matched: i64 = sqlx::query_scalar(
            r#"
            WITH target AS (
                SELECT u.id AS user_id, r.id AS role_id
                FROM users u
                JOIN roles r ON r.id = $2
                WHERE u.email = $1
            ), inserted AS (
                INSERT INTO user_roles (user_id, role_id)
                SELECT user_id, role_id FROM target
                ON CONFLICT DO NOTHING
            )
            SELECT COUNT(*) FROM target
            "#,
        )
        .bind(email)
        .bind(role_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(matched > 0)
    }

    async fn assign_permission(
        &self,
        role_id: Uuid,
        permission: &str,
    ) -> Result<bool, sqlx::Error> {
        let matched: i64 = sqlx::query_scalar(
            r#"
            WITH target AS (
                SELECT r.id AS role_id, p.name AS permission_name
                FROM roles r
                JOIN permissions p ON p.name = $2
                WHERE r.id = $1
            ), inserted AS (
                INSERT INTO role_permissions (role_id, permission_name)
                SELECT role_id, permission_name FROM target
                ON CONFLICT DO NOTHING
            )
            SELECT COUNT(*) FROM target
            "#,
        )
        .bind(role_id)
        .bind(permission)
        .fetch_one(&self.pool)
        .await?;
        Ok(matched > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_serializes_with_uuid_string() {
        let id = Uuid::nil();
        let role = RoleRecord {
            id,
            name: "editor".to_string(),
            description: None,
        };
        assert_eq!(
            serde_json::to_value(role).expect("serialize"),
            json!({
                "id": "00000000-0000-0000-0000-000000000000",
                "name": "editor",
                "description": null,
            })
        );
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }
}
