//! Audit trail persistence.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// One security-relevant action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    /// Email of the acting user, when known.
    pub actor_email: Option<String>,
    pub action: &'static str,
    pub resource: Option<&'static str>,
    pub resource_id: Option<String>,
    /// Action-specific detail, stored as `jsonb`.
    pub data: Value,
    pub outcome: &'static str,
}

impl AuditEntry {
    /// A successful `action` with no actor or resource yet.
    #[must_use]
    pub fn new(action: &'static str) -> Self {
        Self {
            actor_email: None,
            action,
            resource: None,
            resource_id: None,
            data: Value::Object(Default::default()),
            outcome: "success",
        }
    }

    #[must_use]
    pub fn actor(mut self, email: Option<&str>) -> Self {
        self.actor_email = email.map(str::to_string);
        self
    }

    #[must_use]
    pub fn resource(mut self, resource: &'static str, id: impl ToString) -> Self {
        self.resource = Some(resource);
        self.resource_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Durable destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, entry: &AuditEntry) -> Result<(), sqlx::Error>;
}

/// Writes entries to `audit_entries`. The actor is resolved to a user id
/// by email and left null for unknown users.
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for AuditRepository {
    async fn write(&self, entry: &AuditEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries
                (id, actor_id, actor_type, action, resource, resource_id, data, outcome, created_at)
            VALUES
                ($1, (SELECT id FROM users WHERE email = $2), $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.actor_email.as_deref())
        .bind(entry.actor_email.as_ref().map(|_| "user"))
        .bind(entry.action)
        .bind(entry.resource)
        .bind(entry.resource_id.as_deref())
        .bind(&entry.data)
        .bind(entry.outcome)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_fills_resource_and_actor() {
        let entry = AuditEntry::new("role.create")
            .actor(Some("admin@example.com"))
            .resource("role", "r-1")
            .data(json!({ "name": "editor" }));

        assert_eq!(entry.actor_email.as_deref(), Some("admin@example.com"));
        assert_eq!(entry.resource, Some("role"));
        assert_eq!(entry.resource_id.as_deref(), Some("r-1"));
        assert_eq!(entry.outcome, "success");
        assert_eq!(entry.data["name"], "editor");
    }

    #[test]
    fn new_entry_has_empty_object_data() {
        let entry = AuditEntry::new("logout");
        assert_eq!(entry.data, json!({}));
        assert!(entry.actor_email.is_none());
    }
}
