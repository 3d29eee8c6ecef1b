//! odin authentication gateway.
//!
//! This crate provides the axum service that logs users in through an
//! OIDC provider, carries their identity in an encrypted cookie, and guards
//! the trigger and RBAC admin APIs with group and database-backed
//! permissions.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod rbac;
pub mod triggers;

#[cfg(test)]
mod test_support;
