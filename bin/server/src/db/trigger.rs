//! Trigger persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use odin_core::TriggerId;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// A trigger record from the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRecord {
    /// Trigger ID.
    pub id: TriggerId,
    /// Human-readable name.
    pub name: String,
    /// Schedule or match expression.
    pub expression: String,
    /// Whether the trigger is active.
    pub enabled: bool,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// When last updated.
    pub updated_at: DateTime<Utc>,
}

impl TriggerRecord {
    /// Creates a new, not yet persisted trigger.
    #[must_use]
    pub fn new(new: NewTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: TriggerId::new(),
            name: new.name,
            expression: new.expression,
            enabled: new.enabled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields for a trigger being created.
#[derive(Debug, Clone)]
pub struct NewTrigger {
    pub name: String,
    pub expression: String,
    pub enabled: bool,
}

/// Fields to change on an existing trigger. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct TriggerChanges {
    pub name: Option<String>,
    pub expression: Option<String>,
    pub enabled: Option<bool>,
}

/// Storage for triggers.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Lists all triggers, newest first.
    async fn list(&self) -> Result<Vec<TriggerRecord>, sqlx::Error>;

    /// Fetches one trigger.
    async fn get(&self, id: TriggerId) -> Result<Option<TriggerRecord>, sqlx::Error>;

    /// Persists a new trigger.
    async fn create(&self, new: NewTrigger) -> Result<TriggerRecord, sqlx::Error>;

    /// Updates a trigger, returning `None` if it does not exist.
    async fn update(
        &self,
        id: TriggerId,
        changes: TriggerChanges,
    ) -> Result<Option<TriggerRecord>, sqlx::Error>;

    /// Deletes a trigger, returning whether it existed.
    async fn delete(&self, id: TriggerId) -> Result<bool, sqlx::Error>;
}

/// Row type for trigger queries.
#[derive(FromRow)]
struct TriggerRow {
    id: String,
    name: String,
    expression: String,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TriggerRow {
    fn try_into_record(self) -> Result<TriggerRecord, sqlx::Error> {
        let id = TriggerId::from_str(&self.id).map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )))
        })?;

        Ok(TriggerRecord {
            id,
            name: self.name,
            expression: self.expression,
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for trigger operations.
pub struct TriggerRepository {
    pool: PgPool,
}

impl TriggerRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerStore for TriggerRepository {
    async fn list(&self) -> Result<Vec<TriggerRecord>, sqlx::Error> {
        let rows: Vec<TriggerRow> = sqlx::query_as(
            r#"
            SELECT id, name, expression, enabled, created_at, updated_at
            FROM triggers
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into_record()).collect()
    }

    async fn get(&self, id: TriggerId) -> Result<Option<TriggerRecord>, sqlx::Error> {
        let row: Option<TriggerRow> = sqlx::query_as(
            r#"
            SELECT id, name, expression, enabled, created_at, updated_at
            FROM triggers
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into_record()).transpose()
    }

    async fn create(&self, new: NewTrigger) -> Result<TriggerRecord, sqlx::Error> {
        let trigger = TriggerRecord::new(new);
        sqlx::query(
            r#"
            INSERT INTO triggers (id, name, expression, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(trigger.id.to_string())
        .bind(&trigger.name)
        .bind(&trigger.expression)
        .bind(trigger.enabled)
        .bind(trigger.created_at)
        .bind(trigger.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(trigger)
    }

    async fn update(
        &self,
        id: TriggerId,
        changes: TriggerChanges,
    ) -> Result<Option<TriggerRecord>, sqlx::Error> {
        let row: Option<TriggerRow> = sqlx::query_as(
            r#"
            UPDATE triggers
            SET name = COALESCE($2, name),
                expression = COALESCE($3, expression),
                enabled = COALESCE($4, enabled),
                updated_at = $5
            WHERE id = $1
            RETURNING id, name, expression, enabled, created_at, updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(changes.name)
        .bind(changes.expression)
        .bind(changes.enabled)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into_record()).transpose()
    }

    async fn delete(&self, id: TriggerId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM triggers
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
