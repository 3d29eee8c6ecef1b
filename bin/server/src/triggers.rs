//! Trigger CRUD handlers.
//!
//! Reads need `view:triggers`. Writes need `manage:triggers` and a valid
//! CSRF double-submit, both checked before the body is read.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use odin_core::TriggerId;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::{AppState, CsrfGuard, ManageTriggers, RequirePermission, ViewTriggers};
use crate::db::{AuditEntry, NewTrigger, TriggerChanges, TriggerStore};
use crate::error::ApiError;

/// Query string carrying an optional trigger id.
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateTriggerBody {
    name: Option<String>,
    expression: Option<String>,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UpdateTriggerBody {
    id: Option<String>,
    name: Option<String>,
    expression: Option<String>,
    enabled: Option<bool>,
}

fn store(state: &AppState) -> Result<&dyn TriggerStore, ApiError> {
    state.triggers.as_deref().ok_or(ApiError::DatabaseNotConfigured)
}

pub(crate) fn required_id(id: Option<&str>) -> Result<&str, ApiError> {
    id.filter(|id| !id.is_empty()).ok_or(ApiError::IdRequired)
}

/// An id that does not parse cannot name a stored trigger.
fn parse_id(id: &str) -> Result<TriggerId, ApiError> {
    TriggerId::from_str(id).map_err(|_| ApiError::NotFound { id: id.to_string() })
}

pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidInput {
        details: e.to_string(),
    })
}

/// Lists triggers, or fetches one with `?id=`.
pub async fn list_or_get(
    State(state): State<Arc<AppState>>,
    _permission: RequirePermission<ViewTriggers>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ApiError> {
    let store = store(&state)?;

    match query.id.as_deref() {
        Some(id) => {
            let trigger = store
                .get(parse_id(id)?)
                .await?
                .ok_or_else(|| ApiError::NotFound { id: id.to_string() })?;
            Ok(Json(trigger).into_response())
        }
        None => Ok(Json(store.list().await?).into_response()),
    }
}

/// Creates a trigger.
pub async fn create(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageTriggers>,
    _csrf: CsrfGuard,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;
    let body: CreateTriggerBody = parse_body(&body)?;

    let (Some(name), Some(expression)) = (
        body.name.filter(|n| !n.is_empty()),
        body.expression.filter(|e| !e.is_empty()),
    ) else {
        return Err(ApiError::InvalidInput {
            details: "name and expression are required".to_string(),
        });
    };

    let trigger = store
        .create(NewTrigger {
            name,
            expression,
            enabled: body.enabled.unwrap_or(true),
        })
        .await?;

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("trigger.create")
                .actor(session.email())
                .resource("trigger", trigger.id)
                .data(json!({ "name": trigger.name })),
        )
        .await;
    Ok((StatusCode::CREATED, Json(trigger)))
}

/// Updates the provided fields of a trigger.
pub async fn update(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageTriggers>,
    _csrf: CsrfGuard,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;
    let body: UpdateTriggerBody = parse_body(&body)?;
    let id = required_id(body.id.as_deref())?;

    let trigger = store
        .update(
            parse_id(id)?,
            TriggerChanges {
                name: body.name,
                expression: body.expression,
                enabled: body.enabled,
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFound { id: id.to_string() })?;

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("trigger.update")
                .actor(session.email())
                .resource("trigger", trigger.id)
                .data(json!({ "name": trigger.name, "enabled": trigger.enabled })),
        )
        .await;
    Ok(Json(trigger))
}

/// Deletes the trigger named by `?id=`.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageTriggers>,
    _csrf: CsrfGuard,
    Query(query): Query<IdQuery>,
) -> Result<StatusCode, ApiError> {
    let store = store(&state)?;
    let id = required_id(query.id.as_deref())?;
    let trigger_id = parse_id(id)?;

    if !store.delete(trigger_id).await? {
        return Err(ApiError::NotFound { id: id.to_string() });
    }

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("trigger.delete")
                .actor(session.email())
                .resource("trigger", trigger_id),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}
