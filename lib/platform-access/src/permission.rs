//! Permission decisions for a session.
//!
//! Two sources can grant a permission, checked in order:
//!
//! 1. Database permissions. When a session carries a `permissions` list it
//!    is authoritative: the permission must be listed, or the session must
//!    hold an admin role. The group table is not consulted.
//! 2. Groups. The session's claim-derived groups, or the legacy `x-groups`
//!    header when the session has none. Admin group membership grants
//!    everything; otherwise the static group table decides.

use crate::group::{groups_grant_permission, is_admin_group_member, parse_groups_header};
use crate::role::ADMIN_ROLES;
use crate::session::Session;

/// Which source decided a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Granted or denied by database permissions.
    Database { granted: bool },
    /// Granted or denied by group membership.
    Groups { granted: bool },
}

impl Decision {
    /// Returns true if the permission was granted.
    #[must_use]
    pub fn is_granted(self) -> bool {
        match self {
            Self::Database { granted } | Self::Groups { granted } => granted,
        }
    }
}

/// Decides whether `session` holds `permission`.
///
/// `legacy_groups_header` is the raw `x-groups` header value. It is only
/// used when the session has neither database permissions nor groups.
#[must_use]
pub fn authorize(session: &Session, legacy_groups_header: Option<&str>, permission: &str) -> Decision {
    if let Some(permissions) = session.permissions() {
        let roles = session.roles().unwrap_or_default();
        return Decision::Database {
            granted: has_permission(roles, permissions, permission),
        };
    }

    let header_groups;
    let groups: &[String] = if session.groups().is_empty() {
        header_groups = parse_groups_header(legacy_groups_header);
        &header_groups
    } else {
        session.groups()
    };

    Decision::Groups {
        granted: is_admin_group_member(groups) || groups_grant_permission(groups, permission),
    }
}

/// Returns true if the principal holds `permission` explicitly or holds an
/// admin role.
#[must_use]
pub fn has_permission<R: AsRef<str>, P: AsRef<str>>(roles: &[R], permissions: &[P], permission: &str) -> bool {
    is_admin(roles) || permissions.iter().any(|p| p.as_ref() == permission)
}

fn is_admin<R: AsRef<str>>(roles: &[R]) -> bool {
    roles.iter().any(|r| ADMIN_ROLES.contains(&r.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn enriched(groups: &[&str], roles: &[&str], permissions: &[&str]) -> Session {
        Session::with_groups(groups.iter().copied())
            .with_roles_and_permissions(strings(roles), strings(permissions))
    }

    #[test]
    fn admin_group_may_manage() {
        let session = Session::with_groups(["odin_admins"]);
        assert!(authorize(&session, None, "manage:triggers").is_granted());
    }

    #[test]
    fn baseline_group_may_not_manage() {
        let session = Session::with_groups(["odin_users"]);
        let decision = authorize(&session, None, "manage:triggers");
        assert_eq!(decision, Decision::Groups { granted: false });
        assert!(authorize(&session, None, "view:triggers").is_granted());
    }

    #[test]
    fn database_permissions_grant_without_groups() {
        let session = enriched(&[], &["editor"], &["manage:triggers"]);
        assert_eq!(
            authorize(&session, None, "manage:triggers"),
            Decision::Database { granted: true }
        );
    }

    #[test]
    fn database_permissions_do_not_fall_back_to_groups() {
        let session = enriched(&["odin_admins"], &["viewer"], &["view:triggers"]);
        assert_eq!(
            authorize(&session, None, "manage:triggers"),
            Decision::Database { granted: false }
        );
    }

    #[test]
    fn empty_database_permissions_are_still_authoritative() {
        let session = enriched(&["odin_admins"], &["nobody"], &[]);
        assert!(!authorize(&session, None, "view:triggers").is_granted());
    }

    #[test]
    fn admin_role_grants_everything() {
        let session = enriched(&[], &["admin"], &[]);
        assert!(authorize(&session, None, "manage:users").is_granted());
        let session = enriched(&[], &["odin_admins"], &[]);
        assert!(authorize(&session, None, "manage:users").is_granted());
    }

    #[test]
    fn legacy_header_used_only_without_session_groups() {
        let empty = Session::default();
        assert!(authorize(&empty, Some("triggers_admin"), "manage:triggers").is_granted());

        let session = Session::with_groups(["odin_users"]);
        assert!(!authorize(&session, Some("odin_admins"), "manage:triggers").is_granted());
    }

    #[test]
    fn legacy_header_ignored_when_database_permissions_present() {
        let session = enriched(&[], &["viewer"], &["view:triggers"]);
        assert!(!authorize(&session, Some("odin_admins"), "manage:triggers").is_granted());
    }

    #[test]
    fn no_groups_and_no_header_denies() {
        assert!(!authorize(&Session::default(), None, "view:triggers").is_granted());
    }

    #[test]
    fn admin_named_group_grants_everything() {
        let session = Session::with_groups(["admin"]);
        assert!(authorize(&session, None, "manage:users").is_granted());
    }

    #[test]
    fn principal_helpers() {
        let roles = strings(&["editor"]);
        let permissions = strings(&["view:triggers", "manage:triggers"]);

        assert!(has_permission(&roles, &permissions, "view:triggers"));
        assert!(!has_permission(&roles, &permissions, "manage:users"));

        let admin = strings(&["admin"]);
        let none: Vec<String> = Vec::new();
        assert!(has_permission(&admin, &none, "manage:users"));
    }
}
