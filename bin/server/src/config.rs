//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from `OD_`-prefixed environment variables.
//! Nested keys use `__`, so `OD_COOKIE__SECRET` sets `cookie.secret`.
//!
//! See [`CookieConfig`](odin_platform_access::CookieConfig) and
//! [`OidcConfig`](odin_platform_access::OidcConfig) for the nested sections.

use odin_platform_access::{CookieConfig, OidcConfig};
use serde::Deserialize;
use std::fmt;

/// Server configuration composed from library configs.
#[derive(Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection URL. Absent disables role enrichment and the
    /// trigger API.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Session cookie sealing configuration.
    #[serde(default)]
    pub cookie: CookieConfig,

    /// OIDC authentication configuration.
    #[serde(default)]
    pub oidc: OidcConfig,

    /// Whether `x-forwarded-proto` from a fronting proxy is believed when
    /// deciding if a request arrived over HTTPS.
    #[serde(default)]
    pub trust_forwarded_proto: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("cookie", &self.cookie)
            .field("oidc", &self.oidc)
            .field("trust_forwarded_proto", &self.trust_forwarded_proto)
            .finish()
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(environment())
    }

    /// Loads configuration from an explicit set of variables instead of the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is present but invalid.
    pub fn from_vars(vars: config::Map<String, String>) -> Result<Self, config::ConfigError> {
        Self::load(environment().source(Some(vars)))
    }

    fn load(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("OD")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("cookie.previous_salts")
        .try_parsing(true)
}
