//! RBAC administration: roles, permissions and their assignment.
//!
//! Every route needs `manage:users`. Writes also need a valid CSRF
//! double-submit, checked before the body is read. Roles are addressed by
//! uuid `id`, permissions by `name`.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AppState, CsrfGuard, ManageUsers, RequirePermission};
use crate::db::{AuditEntry, RbacStore, RoleChanges};
use crate::error::ApiError;
use crate::triggers::{parse_body, required_id};

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionQuery {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleBody {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PermissionBody {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentBody {
    action: Option<String>,
    user_email: Option<String>,
    role_id: Option<String>,
    permission_id: Option<String>,
}

fn store(state: &AppState) -> Result<&dyn RbacStore, ApiError> {
    state.rbac.as_deref().ok_or(ApiError::DatabaseNotConfigured)
}

/// A string that is not a uuid cannot name a stored role.
fn parse_role_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::NotFound { id: id.to_string() })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// An optional JSON body; an empty or unparseable body counts as absent.
fn optional_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Option<T> {
    serde_json::from_slice(body).ok()
}

/// Lists roles, or fetches one with `?id=`.
pub async fn list_or_get_roles(
    State(state): State<Arc<AppState>>,
    _permission: RequirePermission<ManageUsers>,
    Query(query): Query<RoleQuery>,
) -> Result<Response, ApiError> {
    let store = store(&state)?;

    match query.id.as_deref() {
        Some(id) => {
            let role = store
                .get_role(parse_role_id(id)?)
                .await?
                .ok_or_else(|| ApiError::NotFound { id: id.to_string() })?;
            Ok(Json(role).into_response())
        }
        None => Ok(Json(store.list_roles().await?).into_response()),
    }
}

/// Creates a role.
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageUsers>,
    _csrf: CsrfGuard,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;
    let body: RoleBody = parse_body(&body)?;
    let name = non_empty(body.name).ok_or(ApiError::NameRequired)?;

    let role = store.create_role(name, body.description).await?;

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("role.create")
                .actor(session.email())
                .resource("role", role.id)
                .data(json!({ "name": role.name })),
        )
        .await;
    Ok((StatusCode::CREATED, Json(role)))
}

/// Updates the provided fields of a role.
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageUsers>,
    _csrf: CsrfGuard,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;
    let body: RoleBody = parse_body(&body)?;
    let id = required_id(body.id.as_deref())?;

    let role = store
        .update_role(
            parse_role_id(id)?,
            RoleChanges {
                name: non_empty(body.name),
                description: body.description,
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFound { id: id.to_string() })?;

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("role.update")
                .actor(session.email())
                .resource("role", role.id)
                .data(json!({ "name": role.name })),
        )
        .await;
    Ok(Json(role))
}

/// Deletes the role named by `?id=` or a JSON body `id`.
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageUsers>,
    _csrf: CsrfGuard,
    Query(query): Query<RoleQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let store = store(&state)?;
    let body_id = optional_body::<RoleBody>(&body).and_then(|b| b.id);
    let id = required_id(query.id.as_deref().or(body_id.as_deref()))?;
    let role_id = parse_role_id(id)?;

    if !store.delete_role(role_id).await? {
        return Err(ApiError::NotFound { id: id.to_string() });
    }

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("role.delete")
                .actor(session.email())
                .resource("role", role_id),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists permissions, or fetches one with `?name=`.
pub async fn list_or_get_permissions(
    State(state): State<Arc<AppState>>,
    _permission: RequirePermission<ManageUsers>,
    Query(query): Query<PermissionQuery>,
) -> Result<Response, ApiError> {
    let store = store(&state)?;

    match query.name.as_deref() {
        Some(name) => {
            let permission = store
                .get_permission(name)
                .await?
                .ok_or_else(|| ApiError::NotFound { id: name.to_string() })?;
            Ok(Json(permission).into_response())
        }
        None => Ok(Json(store.list_permissions().await?).into_response()),
    }
}

/// Creates a permission.
pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageUsers>,
    _csrf: CsrfGuard,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;
    let body: PermissionBody = parse_body(&body)?;
    let name = non_empty(body.name).ok_or(ApiError::NameRequired)?;

    let created = store.create_permission(name, body.description).await?;

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("permission.create")
                .actor(session.email())
                .resource("permission", &created.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Updates a permission's description.
pub async fn update_permission(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageUsers>,
    _csrf: CsrfGuard,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;
    let body: PermissionBody = parse_body(&body)?;
    let name = non_empty(body.name).ok_or(ApiError::NameRequired)?;

    let updated = store
        .update_permission(&name, body.description)
        .await?
        .ok_or_else(|| ApiError::NotFound { id: name.clone() })?;

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("permission.update")
                .actor(session.email())
                .resource("permission", &updated.name),
        )
        .await;
    Ok(Json(updated))
}

/// Deletes the permission named by `?name=` or a JSON body `name`.
pub async fn delete_permission(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageUsers>,
    _csrf: CsrfGuard,
    Query(query): Query<PermissionQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let store = store(&state)?;
    let body_name = optional_body::<PermissionBody>(&body).and_then(|b| b.name);
    let name = non_empty(query.name.or(body_name)).ok_or(ApiError::NameRequired)?;

    if !store.delete_permission(&name).await? {
        return Err(ApiError::NotFound { id: name });
    }

    let session = permission.into_session();
    state
        .audit(
            AuditEntry::new("permission.delete")
                .actor(session.email())
                .resource("permission", &name),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Performs an assignment: `assignRole` grants a role to a user by email,
/// `assignPermission` grants a permission to a role.
pub async fn assign(
    State(state): State<Arc<AppState>>,
    permission: RequirePermission<ManageUsers>,
    _csrf: CsrfGuard,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;
    let body: AssignmentBody = parse_body(&body)?;
    let action = non_empty(body.action).ok_or_else(|| ApiError::InvalidInput {
        details: "action is required".to_string(),
    })?;

    let entry = match action.as_str() {
        "assignRole" => {
            let (Some(email), Some(role_id)) = (non_empty(body.user_email), non_empty(body.role_id))
            else {
                return Err(ApiError::MissingFields);
            };
            if !store.assign_role(&email, parse_role_id(&role_id)?).await? {
                return Err(ApiError::NotFound { id: role_id });
            }
            AuditEntry::new("rbac.assign_role")
                .resource("role", &role_id)
                .data(json!({ "userEmail": email }))
        }
        "assignPermission" => {
            let (Some(role_id), Some(permission_name)) =
                (non_empty(body.role_id), non_empty(body.permission_id))
            else {
                return Err(ApiError::MissingFields);
            };
            if !store
                .assign_permission(parse_role_id(&role_id)?, &permission_name)
                .await?
            {
                return Err(ApiError::NotFound { id: role_id });
            }
            AuditEntry::new("rbac.assign_permission")
                .resource("role", &role_id)
                .data(json!({ "permission": permission_name }))
        }
        _ => return Err(ApiError::UnknownAction { action: action.clone() }),
    };

    let session = permission.into_session();
    state.audit(entry.actor(session.email())).await;
    Ok(Json(json!({ "ok": true, "action": action })))
}
