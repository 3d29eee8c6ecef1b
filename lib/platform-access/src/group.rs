//! Group memberships and the static group→permission table.
//!
//! Groups come from identity-provider claims. They are the fallback source
//! of permissions when a session has not been enriched from the role store.

use crate::session::UserInfo;

/// Group granting every permission.
pub const ODIN_ADMINS: &str = "odin_admins";

/// Baseline group carried by every authenticated session.
pub const ODIN_USERS: &str = "odin_users";

/// Permission value that grants everything.
pub const WILDCARD: &str = "*";

/// Claim values that map to [`ODIN_ADMINS`], compared case-insensitively.
const ADMIN_CLAIMS: &[&str] = &["admin", ODIN_ADMINS, "realm-admin", "realm_admin"];

static GROUP_PERMISSIONS: &[(&str, &[&str])] = &[
    (ODIN_ADMINS, &[WILDCARD]),
    (ODIN_USERS, &["view:triggers"]),
    ("triggers_admin", &["manage:triggers"]),
    ("triggers_editor", &["manage:triggers"]),
    ("triggers_viewer", &["view:triggers"]),
];

/// Returns the permissions a single group grants, if the group is known.
#[must_use]
pub fn permissions_for_group(group: &str) -> Option<&'static [&'static str]> {
    GROUP_PERMISSIONS
        .iter()
        .find(|(name, _)| *name == group)
        .map(|(_, permissions)| *permissions)
}

/// Returns true if any of `groups` grants `permission`, directly or through
/// the wildcard. Unknown groups grant nothing.
#[must_use]
pub fn groups_grant_permission<S: AsRef<str>>(groups: &[S], permission: &str) -> bool {
    groups.iter().any(|group| {
        permissions_for_group(group.as_ref())
            .is_some_and(|granted| granted.iter().any(|p| *p == WILDCARD || *p == permission))
    })
}

/// Parses the legacy comma-separated `x-groups` header.
#[must_use]
pub fn parse_groups_header(header: Option<&str>) -> Vec<String> {
    header
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Derives session groups from provider claims.
///
/// Scans the `groups`, `roles` and `realm_access.roles` claims for an
/// admin-like name (case-insensitive). Claim values are never copied into
/// the session: the result is `[odin_admins, odin_users]` for admins and
/// `[odin_users]` for everyone else.
#[must_use]
pub fn groups_from_claims(user: Option<&UserInfo>) -> Vec<String> {
    let admin = user.is_some_and(|user| {
        let realm_roles = user
            .realm_access
            .as_ref()
            .and_then(|realm| realm.roles.as_deref());
        [user.groups.as_deref(), user.roles.as_deref(), realm_roles]
            .into_iter()
            .flatten()
            .flatten()
            .any(|claim| ADMIN_CLAIMS.contains(&claim.to_lowercase().as_str()))
    });

    if admin {
        vec![ODIN_ADMINS.to_string(), ODIN_USERS.to_string()]
    } else {
        vec![ODIN_USERS.to_string()]
    }
}

/// Returns true if the groups include an admin group.
#[must_use]
pub fn is_admin_group_member<S: AsRef<str>>(groups: &[S]) -> bool {
    groups
        .iter()
        .any(|g| matches!(g.as_ref(), ODIN_ADMINS | "admin"))
}
