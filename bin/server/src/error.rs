//! Domain error types for server operations.
//!
//! Variants carry details for the logs. Responses only ever carry the
//! generic category.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Errors of the trigger and RBAC admin APIs.
#[derive(Debug)]
pub enum ApiError {
    /// Body missing, malformed, or missing required fields.
    InvalidInput { details: String },
    /// No id supplied.
    IdRequired,
    /// No permission name supplied.
    NameRequired,
    /// An assignment is missing one of its two sides.
    MissingFields,
    /// RBAC action not recognised.
    UnknownAction { action: String },
    /// The record does not exist.
    NotFound { id: String },
    /// A record with the same unique key exists.
    Conflict { details: String },
    /// No database configured for this server.
    DatabaseNotConfigured,
    /// Database error while accessing triggers.
    DatabaseError { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { details } => write!(f, "invalid input: {}", details),
            Self::IdRequired => write!(f, "id required"),
            Self::NameRequired => write!(f, "name required"),
            Self::MissingFields => write!(f, "missing fields"),
            Self::UnknownAction { action } => write!(f, "unknown action '{}'", action),
            Self::NotFound { id } => write!(f, "'{}' not found", id),
            Self::Conflict { details } => write!(f, "conflict: {}", details),
            Self::DatabaseNotConfigured => write!(f, "database not configured"),
            Self::DatabaseError { details } => write!(f, "database error: {}", details),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if crate::db::rbac::is_unique_violation(&e) {
            return Self::Conflict {
                details: e.to_string(),
            };
        }
        Self::DatabaseError {
            details: e.to_string(),
        }
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "Invalid input"),
            Self::IdRequired => (StatusCode::BAD_REQUEST, "id required"),
            Self::NameRequired => (StatusCode::BAD_REQUEST, "name required"),
            Self::MissingFields => (StatusCode::BAD_REQUEST, "Missing fields"),
            Self::UnknownAction { .. } => (StatusCode::BAD_REQUEST, "Unknown action"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found"),
            Self::Conflict { .. } => (StatusCode::CONFLICT, "Already exists"),
            Self::DatabaseNotConfigured => {
                (StatusCode::SERVICE_UNAVAILABLE, "Database not configured")
            }
            Self::DatabaseError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "api request failed");
        } else {
            tracing::debug!(error = %self, "api request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
