//! Error types for the platform-access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `CodecError`: Session sealing failures and codec misconfiguration
//! - `OidcConfigError`: Identity-provider settings the login flow cannot run without
//! - `RoleStoreError`: Failures of the external role/permission store
//!
//! Trust-boundary failures (a forged cookie, a CSRF mismatch) are not errors
//! here. They are definite outcomes (`None`, `CsrfViolation`) so they can
//! never be mistaken for success further up the stack.

use std::fmt;

/// Errors from the session codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// No cookie secret configured. There is no default key.
    MissingSecret,
    /// The configured PBKDF2 iteration count cannot derive a key.
    InvalidIterations { iterations: u32 },
    /// The session could not be serialized.
    Serialize { details: String },
    /// The cipher refused to encrypt the payload.
    Encrypt,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSecret => {
                write!(f, "cookie secret must be set to seal or open sessions")
            }
            Self::InvalidIterations { iterations } => {
                write!(f, "invalid PBKDF2 iteration count: {iterations}")
            }
            Self::Serialize { details } => {
                write!(f, "failed to serialize session: {details}")
            }
            Self::Encrypt => write!(f, "failed to encrypt session"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Errors from OIDC client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcConfigError {
    /// No discovery URL configured.
    MissingDiscoveryUrl,
    /// No client id configured.
    MissingClientId,
}

impl fmt::Display for OidcConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDiscoveryUrl => write!(f, "OIDC discovery URL is not configured"),
            Self::MissingClientId => write!(f, "OIDC client id is not configured"),
        }
    }
}

impl std::error::Error for OidcConfigError {}

/// Errors from the role/permission store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleStoreError {
    /// The store could not be reached.
    Unavailable { details: String },
    /// A query against the store failed.
    QueryFailed {
        query: &'static str,
        details: String,
    },
}

impl fmt::Display for RoleStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => {
                write!(f, "role store unavailable: {details}")
            }
            Self::QueryFailed { query, details } => {
                write!(f, "role store query '{query}' failed: {details}")
            }
        }
    }
}

impl std::error::Error for RoleStoreError {}
