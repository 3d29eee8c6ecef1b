//! Authentication and authorization core for odin.
//!
//! This crate is transport independent. It provides:
//! - The authenticated `Session` and its encrypted cookie form (`SessionCodec`)
//! - PKCE transaction state and OIDC configuration for the login flow
//! - Double-submit CSRF token primitives
//! - Group, role and permission resolution
//!
//! # Access Control Model
//!
//! Permissions come from one of two sources. Sessions enriched from the role
//! store carry explicit `permissions`, which are authoritative. Otherwise the
//! identity provider's group claims are mapped through a static table, with
//! `odin_admins` granting everything and `odin_users` present on every
//! session.
//!
//! # Example
//!
//! ```
//! use odin_platform_access::{CookieConfig, Session, SessionCodec, authorize};
//!
//! let codec = SessionCodec::new(
//!     &CookieConfig::new("correct horse battery staple").with_pbkdf2_iterations(1),
//! )
//! .expect("codec");
//!
//! let session = Session::with_groups(["odin_users", "triggers_editor"]);
//! let cookie = codec.seal(&session).expect("seal");
//! let opened = codec.open(&cookie).expect("open");
//!
//! assert!(authorize(&opened, None, "manage:triggers").is_granted());
//! assert!(!authorize(&opened, None, "manage:users").is_granted());
//! ```

pub mod codec;
pub mod csrf;
pub mod error;
pub mod group;
pub mod oidc;
pub mod permission;
pub mod pkce;
pub mod role;
pub mod session;

// Re-export main types at crate root
pub use codec::{CookieConfig, SessionCodec};
pub use csrf::{CSRF_COOKIE, CSRF_HEADER, CsrfViolation, generate_csrf_token, verify_double_submit};
pub use error::{CodecError, OidcConfigError, RoleStoreError};
pub use group::{
    ODIN_ADMINS, ODIN_USERS, groups_from_claims, groups_grant_permission, parse_groups_header,
};
pub use oidc::{LoginStage, OidcConfig, OidcConfigBuilder, ProviderMetadata};
pub use permission::{Decision, authorize, has_permission};
pub use pkce::{PkceTransaction, code_challenge_from_verifier};
pub use role::{RoleStore, RolesAndPermissions, enrich_session, roles_and_permissions_by_email};
pub use session::{RealmAccess, Session, TokenSet, UserInfo};
