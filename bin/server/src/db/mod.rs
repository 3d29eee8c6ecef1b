//! Database repositories for the odin server.
//!
//! Triggers, RBAC administration and the audit trail live here. The role
//! lookups that enrich sessions live with authentication in `auth::db`.

pub mod audit;
pub mod rbac;
pub mod trigger;

pub use audit::{AuditEntry, AuditRepository, AuditSink};
pub use rbac::{PermissionRecord, RbacRepository, RbacStore, RoleChanges, RoleRecord};
pub use trigger::{NewTrigger, TriggerChanges, TriggerRecord, TriggerRepository, TriggerStore};
