//! HTTP implementation of the subscription operations.

use async_trait::async_trait;
use eventsub_auth::TokenRefresher;
use parking_lot::Mutex;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::api::SubscriptionApi;
use crate::error::{ApiError, Result};
use crate::types::{DeleteOutcome, Subscription, SubscriptionList, SubscriptionRequest};

/// Configuration for the subscription client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the provider's REST API
    /// Default: https://api.twitch.tv/helix
    pub base_url: String,

    /// Per-request timeout
    /// Default: 10 seconds
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitch.tv/helix".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn subscriptions_url(&self) -> String {
        format!("{}/eventsub/subscriptions", self.base_url)
    }

    fn users_url(&self) -> String {
        format!("{}/users", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    #[serde(default)]
    login: String,
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Subscription client backed by reqwest.
///
/// Every request carries the application client id and the current bearer token.
/// A 401 or 403 triggers exactly one token refresh followed by exactly one retry;
/// a second authorization failure is returned as [`ApiError::Unauthorized`].
pub struct SubscriptionClient {
    http: reqwest::Client,
    config: ApiConfig,
    refresher: TokenRefresher,
    user_id: Mutex<Option<String>>,
}

impl SubscriptionClient {
    pub fn new(config: ApiConfig, refresher: TokenRefresher) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(config, refresher, http))
    }

    pub fn with_http_client(config: ApiConfig, refresher: TokenRefresher, http: reqwest::Client) -> Self {
        Self {
            http,
            config,
            refresher,
            user_id: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    fn client_id(&self) -> &str {
        &self.refresher.oauth().config().client_id
    }

    /// Send a request built by `build`, refreshing and retrying once on an authorization failure.
    async fn send_authorized<F>(&self, operation: &'static str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.refresher.access_token()?;
        let response = self.send(operation, build(), &token).await?;
        if !is_auth_failure(response.status()) {
            return Ok(response);
        }

        tracing::warn!(
            operation,
            status = response.status().as_u16(),
            "request unauthorized, refreshing token and retrying once"
        );
        let token = self.refresher.refresh().await?;
        let response = self.send(operation, build(), &token).await?;
        let status = response.status();
        if is_auth_failure(status) {
            return Err(ApiError::Unauthorized {
                operation,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn send(&self, operation: &'static str, request: RequestBuilder, token: &str) -> Result<Response> {
        let response = request
            .header("Client-Id", self.client_id())
            .bearer_auth(token)
            .send()
            .await?;
        tracing::debug!(operation, status = response.status().as_u16(), "response received");
        Ok(response)
    }

    async fn unexpected(operation: &'static str, response: Response) -> ApiError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ApiError::UnexpectedStatus { operation, status, body }
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<SubscriptionList> {
        let url = self.config.subscriptions_url();
        let response = self
            .send_authorized("list", || {
                let request = self.http.get(&url);
                match cursor {
                    Some(cursor) => request.query(&[("after", cursor)]),
                    None => request,
                }
            })
            .await?;

        if !response.status().is_success() {
            return Err(Self::unexpected("list", response).await);
        }
        Ok(response.json::<SubscriptionList>().await?)
    }
}

#[async_trait]
impl SubscriptionApi for SubscriptionClient {
    async fn ensure_credentials(&self) -> Result<()> {
        self.refresher.valid_access_token().await?;
        Ok(())
    }

    async fn current_user_id(&self) -> Result<String> {
        if let Some(id) = self.user_id.lock().clone() {
            return Ok(id);
        }

        let url = self.config.users_url();
        let response = self.send_authorized("current_user", || self.http.get(&url)).await?;
        if !response.status().is_success() {
            return Err(Self::unexpected("current_user", response).await);
        }

        let user = response
            .json::<DataEnvelope<User>>()
            .await?
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Parse("user lookup returned no users".to_string()))?;

        tracing::info!(user_id = %user.id, login = %user.login, "resolved authenticated user");
        *self.user_id.lock() = Some(user.id.clone());
        Ok(user.id)
    }

    async fn register(&self, request: &SubscriptionRequest) -> Result<Subscription> {
        let url = self.config.subscriptions_url();
        let response = self
            .send_authorized("register", || self.http.post(&url).json(request))
            .await?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(Self::unexpected("register", response).await);
        }

        let subscription = response
            .json::<DataEnvelope<Subscription>>()
            .await?
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Parse("register response contained no subscription".to_string()))?;

        tracing::info!(
            subscription_id = %subscription.id,
            subscription_type = %subscription.subscription_type,
            status = %subscription.status,
            "subscription registered"
        );
        Ok(subscription)
    }

    async fn list(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.list_page(cursor.as_deref()).await?;
            let page_len = page.data.len();
            subscriptions.extend(page.data);

            match page.pagination.cursor.filter(|c| !c.is_empty()) {
                Some(next) if page_len > 0 => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(count = subscriptions.len(), "listed subscriptions");
        Ok(subscriptions)
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        let url = self.config.subscriptions_url();
        let response = self
            .send_authorized("delete", || self.http.delete(&url).query(&[("id", id)]))
            .await?;

        let outcome = DeleteOutcome::from_status(response.status().as_u16());
        match outcome {
            DeleteOutcome::Deleted => tracing::info!(subscription_id = %id, "subscription deleted"),
            DeleteOutcome::AlreadyGone => {
                tracing::debug!(subscription_id = %id, "subscription already gone")
            }
            DeleteOutcome::Failed(status) => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(subscription_id = %id, status, body = %body, "subscription delete failed");
            }
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for SubscriptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
