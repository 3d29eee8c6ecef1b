//! OIDC (OpenID Connect) configuration and provider metadata.
//!
//! This module holds the transport-independent half of the login flow:
//! client configuration and the subset of the discovery document the flow
//! needs.

use crate::error::OidcConfigError;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Configuration for the OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Full discovery URL
    /// (e.g. "https://auth.example.com/realms/main/.well-known/openid-configuration").
    #[serde(default)]
    discovery_url: Option<String>,
    /// The OAuth2 client ID registered with the provider.
    #[serde(default)]
    client_id: String,
    /// The OAuth2 client secret. Public clients leave this unset.
    #[serde(default)]
    client_secret: Option<String>,
    /// Fixed callback URI. When unset it is derived from the request host.
    #[serde(default)]
    redirect_uri: Option<String>,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,profile,email"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Timeout applied to every call to the provider.
    #[serde(default = "default_http_timeout_seconds")]
    http_timeout_seconds: u64,
}

fn default_scopes() -> String {
    "openid,profile,email".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    10
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("discovery_url", &self.discovery_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            discovery_url: None,
            client_id: String::new(),
            client_secret: None,
            redirect_uri: None,
            scopes: default_scopes(),
            http_timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

impl OidcConfig {
    /// Creates a new OIDC configuration with defaults for optional fields.
    #[must_use]
    pub fn new(discovery_url: String, client_id: String) -> Self {
        Self {
            discovery_url: Some(discovery_url),
            client_id,
            ..Self::default()
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(discovery_url: String, client_id: String) -> OidcConfigBuilder {
        OidcConfigBuilder::new(discovery_url, client_id)
    }

    /// Checks that the fields the login flow cannot work without are set.
    ///
    /// # Errors
    ///
    /// Returns `OidcConfigError::MissingDiscoveryUrl` or
    /// `OidcConfigError::MissingClientId`.
    pub fn validate(&self) -> Result<(), Report<OidcConfigError>> {
        if self.discovery_url().is_none() {
            return Err(OidcConfigError::MissingDiscoveryUrl.into());
        }
        if self.client_id.is_empty() {
            return Err(OidcConfigError::MissingClientId.into());
        }
        Ok(())
    }

    /// Returns the discovery URL, if configured and non-empty.
    #[must_use]
    pub fn discovery_url(&self) -> Option<&str> {
        self.discovery_url.as_deref().filter(|u| !u.is_empty())
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret, if configured and non-empty.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the fixed redirect URI, if configured.
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref().filter(|u| !u.is_empty())
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the provider call timeout.
    #[must_use]
    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_seconds)
    }
}

/// Builder for `OidcConfig`.
#[derive(Debug)]
pub struct OidcConfigBuilder {
    config: OidcConfig,
    scopes: Vec<String>,
}

impl OidcConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(discovery_url: String, client_id: String) -> Self {
        let config = OidcConfig::new(discovery_url, client_id);
        let scopes = config.scopes().into_iter().map(str::to_string).collect();
        Self { config, scopes }
    }

    /// Sets the client secret for confidential clients.
    #[must_use]
    pub fn client_secret(mut self, secret: String) -> Self {
        self.config.client_secret = Some(secret);
        self
    }

    /// Sets a fixed redirect URI.
    #[must_use]
    pub fn redirect_uri(mut self, uri: String) -> Self {
        self.config.redirect_uri = Some(uri);
        self
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Sets the provider call timeout in seconds.
    #[must_use]
    pub fn http_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.http_timeout_seconds = seconds;
        self
    }

    /// Builds the `OidcConfig`.
    #[must_use]
    pub fn build(self) -> OidcConfig {
        OidcConfig {
            scopes: self.scopes.join(","),
            ..self.config
        }
    }
}

/// The parts of the provider's discovery document the login flow uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Progress of a single login attempt, recorded on log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Initiated,
    Redirected,
    CallbackReceived,
    TokenExchanged,
    UserinfoFetched,
    SessionIssued,
    Failed,
}

impl LoginStage {
    /// Returns the stage name used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Redirected => "redirected",
            Self::CallbackReceived => "callback_received",
            Self::TokenExchanged => "token_exchanged",
            Self::UserinfoFetched => "userinfo_fetched",
            Self::SessionIssued => "session_issued",
            Self::Failed => "failed",
        }
    }

    /// Returns true for the two terminal stages.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::SessionIssued | Self::Failed)
    }
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
