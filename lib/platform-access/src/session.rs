//! The session carried inside the encrypted `od_session` cookie.
//!
//! There is no server-side session table. A session is created once, at the
//! end of the OIDC callback, sealed into a cookie by
//! [`SessionCodec`](crate::codec::SessionCodec), and only ever read after
//! that. It is either absent or fully authenticated; there is no
//! partially-trusted state.
//!
//! Provider payloads (the token response and userinfo) are kept opaque:
//! the fields the gate needs are typed, everything else round-trips
//! untouched through `extra`.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token set returned by the provider's token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Every other member of the token response (`expires_in`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenSet {
    /// Returns the access token, if the provider issued a non-empty one.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Realm-level role claim (`realm_access.roles`, as issued by Keycloak).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(
        default,
        deserialize_with = "claim_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub roles: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Claims returned by the provider's userinfo endpoint.
///
/// Group-like claims are parsed leniently: a claim that is missing or has
/// an unexpected shape is `None`, never a parse failure of the whole
/// document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(
        default,
        deserialize_with = "claim_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub groups: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "claim_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub roles: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub realm_access: Option<RealmAccess>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserInfo {
    /// Returns the email claim, if present and non-empty.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }
}

/// Accepts a JSON array and keeps its string members; anything else is absent.
fn claim_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

/// Parses a nested claim object, treating a malformed claim as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// An authenticated session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque provider token set.
    #[serde(default)]
    tokens: TokenSet,
    /// Provider userinfo, `None` when it could not be fetched.
    #[serde(default)]
    user: Option<UserInfo>,
    /// Ordered group memberships derived from provider claims.
    #[serde(default)]
    groups: Vec<String>,
    /// Database-backed role names, present only after enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    roles: Option<Vec<String>>,
    /// Database-backed permission names, present only after enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<Vec<String>>,
}

impl Session {
    /// Creates a session from the outcome of a login.
    ///
    /// Duplicate group names are dropped; the first occurrence wins.
    #[must_use]
    pub fn new(tokens: TokenSet, user: Option<UserInfo>, groups: Vec<String>) -> Self {
        let mut ordered: Vec<String> = Vec::with_capacity(groups.len());
        for group in groups {
            if !ordered.contains(&group) {
                ordered.push(group);
            }
        }
        Self {
            tokens,
            user,
            groups: ordered,
            roles: None,
            permissions: None,
        }
    }

    /// Creates a session carrying only group memberships.
    #[must_use]
    pub fn with_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            TokenSet::default(),
            None,
            groups.into_iter().map(Into::into).collect(),
        )
    }

    /// Attaches database-backed roles and permissions.
    #[must_use]
    pub fn with_roles_and_permissions(mut self, roles: Vec<String>, permissions: Vec<String>) -> Self {
        self.roles = Some(roles);
        self.permissions = Some(permissions);
        self
    }

    /// Returns the provider token set.
    #[must_use]
    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    /// Returns the provider userinfo, if it was fetched.
    #[must_use]
    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// Returns the user's email claim, if known.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().and_then(UserInfo::email)
    }

    /// Returns the group memberships.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Returns the database-backed roles, if the session was enriched.
    #[must_use]
    pub fn roles(&self) -> Option<&[String]> {
        self.roles.as_deref()
    }

    /// Returns the database-backed permissions, if the session was enriched.
    #[must_use]
    pub fn permissions(&self) -> Option<&[String]> {
        self.permissions.as_deref()
    }
}
