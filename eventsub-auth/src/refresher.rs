//! Single-flight token refresh.
//!
//! At most one refresh grant is in flight at a time. Callers that arrive while a
//! refresh is running await the same shared future and receive the same token (or
//! the same error) instead of issuing their own request.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::credential::Credential;
use crate::error::{AuthError, Result};
use crate::oauth::OAuthClient;
use crate::store::CredentialStore;

type RefreshFuture = Shared<BoxFuture<'static, Result<String>>>;

/// Minimum remaining lifetime for a stored token to be used without checking.
const FRESHNESS_MARGIN: Duration = Duration::from_secs(60);

struct Inner {
    store: Arc<CredentialStore>,
    oauth: OAuthClient,
    in_flight: Mutex<Option<RefreshFuture>>,
}

/// Exchanges stale access tokens for new ones and persists the result.
///
/// Cloning is cheap and every clone shares the same in-flight slot.
#[derive(Clone)]
pub struct TokenRefresher {
    inner: Arc<Inner>,
}

impl TokenRefresher {
    pub fn new(store: Arc<CredentialStore>, oauth: OAuthClient) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                oauth,
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.inner.oauth
    }

    /// The stored access token, without any validity check.
    pub fn access_token(&self) -> Result<String> {
        Ok(self.inner.store.require()?.access_token)
    }

    /// Refresh the access token using the refresh grant.
    ///
    /// Fails immediately with a configuration error when no credential, refresh
    /// token or client credentials are available.
    pub async fn refresh(&self) -> Result<String> {
        let flight = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(flight) => {
                    tracing::debug!("joining in-flight token refresh");
                    flight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let flight = async move { inner.refresh_once().await }.boxed().shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut slot = self.inner.in_flight.lock();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }

        result
    }

    /// Return an access token the provider is known to accept.
    ///
    /// A stored token with a known, comfortable expiry is returned as is. Otherwise
    /// the token is checked against the provider's validate endpoint and refreshed
    /// when the provider reports it invalid.
    pub async fn valid_access_token(&self) -> Result<String> {
        let credential = self.inner.store.require()?;
        if credential.is_fresh(Utc::now(), FRESHNESS_MARGIN) {
            return Ok(credential.access_token);
        }

        let checked = credential.access_token;
        match self.inner.oauth.validate(&checked).await {
            Ok(Some(validation)) => {
                // The credential may have been replaced while the validation was in flight.
                let current = self.inner.store.update(|current| {
                    if current.access_token != checked {
                        return false;
                    }
                    current.confirm_valid(validation.expires_in, Utc::now());
                    true
                })?;
                tracing::debug!(
                    login = validation.login.as_deref().unwrap_or("unknown"),
                    expires_in = validation.expires_in,
                    "access token confirmed valid"
                );
                Ok(current.access_token)
            }
            Ok(None) => {
                tracing::info!("access token expired, refreshing");
                self.refresh().await
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not validate access token, refreshing");
                self.refresh().await
            }
        }
    }

    /// Complete the authorization-code flow and persist the initial credential.
    pub async fn authorize(&self, code: &str) -> Result<Credential> {
        let response = self.inner.oauth.exchange_code(code).await?;
        let credential = Credential::from_response(response, Utc::now());
        self.inner.store.save(&credential)?;
        Ok(credential)
    }
}

impl Inner {
    async fn refresh_once(&self) -> Result<String> {
        tracing::info!("attempting to refresh token");

        let refresh_token = self
            .store
            .require()?
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Configuration("credential has no refresh token".to_string()))?;

        let response = match self.oauth.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "could not refresh token");
                return Err(e);
            }
        };

        let mut merged = false;
        let credential = self.store.update(|current| {
            if current.refresh_token.as_deref() != Some(refresh_token.as_str()) {
                return false;
            }
            current.merge(response, Utc::now());
            merged = true;
            true
        })?;

        if merged {
            tracing::info!("token refreshed");
        } else {
            tracing::info!("credential replaced during refresh, keeping the newer one");
        }
        Ok(credential.access_token)
    }
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("store", &self.inner.store.path())
            .field("in_flight", &self.inner.in_flight.lock().is_some())
            .finish()
    }
}
