//! Client for the provider's OAuth endpoints.

use serde::Deserialize;
use url::Url;

use crate::credential::TokenResponse;
use crate::error::{AuthError, Result};

/// Default scopes requested by the authorization flow.
pub const DEFAULT_SCOPES: &[&str] = &[
    "moderator:read:followers",
    "channel:read:subscriptions",
    "bits:read",
];

/// Configuration for the OAuth endpoints.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Application client id
    pub client_id: String,

    /// Application client secret
    pub client_secret: String,

    /// Redirect target registered with the provider
    /// Default: http://localhost:3000/auth/callback
    pub redirect_uri: String,

    /// Scopes requested during authorization
    pub scopes: Vec<String>,

    /// Default: https://id.twitch.tv/oauth2/authorize
    pub authorize_url: String,

    /// Default: https://id.twitch.tv/oauth2/token
    pub token_url: String,

    /// Default: https://id.twitch.tv/oauth2/validate
    pub validate_url: String,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: "http://localhost:3000/auth/callback".to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            authorize_url: "https://id.twitch.tv/oauth2/authorize".to_string(),
            token_url: "https://id.twitch.tv/oauth2/token".to_string(),
            validate_url: "https://id.twitch.tv/oauth2/validate".to_string(),
        }
    }

    /// Point all three endpoints at a different host, e.g. a mock server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.authorize_url = format!("{base}/oauth2/authorize");
        self.token_url = format!("{base}/oauth2/token");
        self.validate_url = format!("{base}/oauth2/validate");
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Fail with a configuration error when client id or secret is missing.
    pub fn require_client_credentials(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Configuration("missing client id".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::Configuration("missing client secret".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Result of a successful token validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenValidation {
    pub client_id: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Seconds until the token expires
    pub expires_in: u64,
}

/// Thin client for the authorization, token and validate endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Share an existing reqwest client (and its connection pool).
    pub fn with_http_client(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// URL the user visits to start the authorization-code flow.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<String> {
        let mut url = Url::parse(&self.config.authorize_url).map_err(|e| {
            AuthError::Configuration(format!(
                "invalid authorize url {}: {e}",
                self.config.authorize_url
            ))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &self.config.scopes.join(" "));
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }

        Ok(url.into())
    }

    /// Exchange an authorization code for the initial token set.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.config.require_client_credentials()?;
        tracing::info!("exchanging authorization code for token");

        self.token_request(
            "authorization_code",
            &[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ],
        )
        .await
    }

    /// Run the refresh-token grant.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.config.require_client_credentials()?;

        self.token_request(
            "refresh_token",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ],
        )
        .await
    }

    /// Ask the provider whether an access token is still valid.
    ///
    /// Returns `Ok(None)` when the provider reports the token as invalid.
    pub async fn validate(&self, access_token: &str) -> Result<Option<TokenValidation>> {
        let response = self
            .http
            .get(&self.config.validate_url)
            .header(reqwest::header::AUTHORIZATION, format!("OAuth {access_token}"))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::debug!("access token reported invalid by provider");
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| AuthError::Parse(format!("invalid validate response: {e}")))
    }

    async fn token_request(&self, grant: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.http.post(&self.config.token_url).form(form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(grant, status = status.as_u16(), body = %body, "token request rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::Parse(format!("invalid {grant} response: {e}")))
    }
}
