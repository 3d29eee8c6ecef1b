//! OIDC client: provider discovery, code exchange and userinfo.
//!
//! The authorization redirect and the code exchange go through a typed
//! `oauth2` client built from the discovered endpoints. Discovery and
//! userinfo are plain JSON fetches so provider documents stay opaque.

use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, ExtraTokenFields, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use odin_platform_access::{OidcConfig, PkceTransaction, ProviderMetadata, TokenSet, UserInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

/// Token response members outside RFC 6749, `id_token` among them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl ExtraTokenFields for ProviderTokenFields {}

type ProviderTokenResponse = StandardTokenResponse<ProviderTokenFields, BasicTokenType>;

type ProviderClient = Client<
    BasicErrorResponse,
    ProviderTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Discovered metadata and the OAuth2 client built from it.
struct Provider {
    metadata: ProviderMetadata,
    client: ProviderClient,
}

/// OIDC client for authenticating users.
///
/// Provider metadata is fetched once and shared by every request. The first
/// callers to need it wait on a single in-flight fetch.
pub struct OidcClient {
    config: OidcConfig,
    http: reqwest::Client,
    provider: OnceCell<Provider>,
}

impl OidcClient {
    /// Creates a client without contacting the provider.
    pub fn new(config: OidcConfig) -> Result<Self, OidcError> {
        config
            .validate()
            .map_err(|e| OidcError::Configuration(e.to_string()))?;

        // Following redirects from the token endpoint would leak the code.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| {
                OidcError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            http,
            provider: OnceCell::new(),
        })
    }

    /// Creates a client and fetches the provider metadata up front.
    pub async fn discover(config: OidcConfig) -> Result<Self, OidcError> {
        let client = Self::new(config)?;
        client.provider().await?;
        Ok(client)
    }

    /// Returns the provider metadata, fetching it on first use.
    pub async fn provider_metadata(&self) -> Result<&ProviderMetadata, OidcError> {
        Ok(&self.provider().await?.metadata)
    }

    async fn provider(&self) -> Result<&Provider, OidcError> {
        self.provider
            .get_or_try_init(|| async {
                let metadata = self.fetch_metadata().await?;
                let client = self.oauth_client(&metadata)?;
                Ok::<_, OidcError>(Provider { metadata, client })
            })
            .await
    }

    #[instrument(skip(self))]
    async fn fetch_metadata(&self) -> Result<ProviderMetadata, OidcError> {
        let url = self.config.discovery_url().ok_or_else(|| {
            OidcError::Configuration("discovery URL is not configured".to_string())
        })?;

        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OidcError::Discovery(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(OidcError::Discovery(format!(
                "provider returned {}",
                response.status()
            )));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| OidcError::Discovery(format!("invalid discovery document: {}", e)))?;

        info!(
            authorization_endpoint = %metadata.authorization_endpoint,
            token_endpoint = %metadata.token_endpoint,
            userinfo = metadata.userinfo_endpoint.is_some(),
            "discovered OIDC provider"
        );
        Ok(metadata)
    }

    /// Builds the OAuth2 client for the discovered endpoints. Client
    /// credentials travel in the token request body.
    fn oauth_client(&self, metadata: &ProviderMetadata) -> Result<ProviderClient, OidcError> {
        let auth_url = AuthUrl::new(metadata.authorization_endpoint.clone()).map_err(|e| {
            OidcError::Discovery(format!("invalid authorization endpoint: {}", e))
        })?;
        let token_url = TokenUrl::new(metadata.token_endpoint.clone())
            .map_err(|e| OidcError::Discovery(format!("invalid token endpoint: {}", e)))?;

        let mut client: ProviderClient =
            Client::new(ClientId::new(self.config.client_id().to_string()))
                .set_auth_type(AuthType::RequestBody)
                .set_auth_uri(auth_url)
                .set_token_uri(token_url);
        if let Some(secret) = self.config.client_secret() {
            client = client.set_client_secret(ClientSecret::new(secret.to_string()));
        }
        Ok(client)
    }

    /// Builds the provider authorization URL for a login attempt.
    pub async fn authorization_url(
        &self,
        transaction: &PkceTransaction,
        redirect_uri: &str,
    ) -> Result<String, OidcError> {
        let provider = self.provider().await?;
        let redirect_uri = parse_redirect_uri(redirect_uri)?;
        let verifier = PkceCodeVerifier::new(transaction.code_verifier().to_string());
        let state = transaction.state().to_string();

        let (url, _state) = provider
            .client
            .authorize_url(|| CsrfToken::new(state))
            .add_scopes(
                self.config
                    .scopes()
                    .into_iter()
                    .map(|scope| Scope::new(scope.to_string())),
            )
            .set_pkce_challenge(PkceCodeChallenge::from_code_verifier_sha256(&verifier))
            .set_redirect_uri(Cow::Owned(redirect_uri))
            .url();
        Ok(url.to_string())
    }

    /// Exchanges an authorization code and PKCE verifier for tokens.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, OidcError> {
        let provider = self.provider().await?;
        let redirect_uri = parse_redirect_uri(redirect_uri)?;

        let response = provider
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(code_verifier.to_string()))
            .set_redirect_uri(Cow::Owned(redirect_uri))
            .request_async(&self.http)
            .await
            .map_err(|e| OidcError::TokenExchange(e.to_string()))?;

        Ok(token_set(response))
    }

    /// Fetches userinfo for the tokens of a completed exchange.
    ///
    /// Returns `Ok(None)` when there is no access token or the provider does
    /// not advertise a userinfo endpoint.
    #[instrument(skip_all)]
    pub async fn user_info(&self, tokens: &TokenSet) -> Result<Option<UserInfo>, OidcError> {
        let Some(access_token) = tokens.access_token() else {
            debug!("no access token, skipping userinfo");
            return Ok(None);
        };
        let metadata = self.provider_metadata().await?;
        let Some(endpoint) = metadata.userinfo_endpoint.as_deref() else {
            debug!("provider has no userinfo endpoint");
            return Ok(None);
        };

        let response = self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OidcError::UserInfo(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(OidcError::UserInfo(format!(
                "provider returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| OidcError::UserInfo(format!("invalid userinfo response: {}", e)))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }
}

fn parse_redirect_uri(uri: &str) -> Result<RedirectUrl, OidcError> {
    RedirectUrl::new(uri.to_string()).map_err(|e| OidcError::RedirectUri(e.to_string()))
}

/// Copies a token response into the session's opaque token set.
fn token_set(response: ProviderTokenResponse) -> TokenSet {
    let mut extra = response.extra_fields().other.clone();
    if let Some(expires_in) = response.expires_in() {
        extra.insert("expires_in".to_string(), expires_in.as_secs().into());
    }
    TokenSet {
        access_token: Some(response.access_token().secret().clone()),
        id_token: response.extra_fields().id_token.clone(),
        refresh_token: response.refresh_token().map(|t| t.secret().clone()),
        token_type: Some(response.token_type().as_ref().to_string()),
        scope: response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }),
        extra,
    }
}

/// OIDC-related errors.
#[derive(Debug)]
pub enum OidcError {
    /// Configuration error (missing discovery URL, client id, etc.)
    Configuration(String),
    /// Failed to discover provider metadata.
    Discovery(String),
    /// The callback URI is not an absolute URL.
    RedirectUri(String),
    /// Token exchange failed.
    TokenExchange(String),
    /// Userinfo fetch failed.
    UserInfo(String),
}

impl std::fmt::Display for OidcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "OIDC configuration error: {}", msg),
            Self::Discovery(msg) => write!(f, "OIDC discovery error: {}", msg),
            Self::RedirectUri(msg) => write!(f, "invalid redirect URI: {}", msg),
            Self::TokenExchange(msg) => write!(f, "Token exchange failed: {}", msg),
            Self::UserInfo(msg) => write!(f, "OIDC userinfo error: {}", msg),
        }
    }
}

impl std::error::Error for OidcError {}
