//! Browser routes for the OAuth authorization-code flow.

use eventsub_auth::TokenRefresher;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use warp::http::{StatusCode, Uri};
use warp::reply::Response;
use warp::Reply;

/// Handlers for `GET /auth/twitch` and `GET /auth/callback`.
///
/// A successful callback stores the credential and wakes whoever is waiting in
/// [`wait_for_authorization`](AuthRoutes::wait_for_authorization).
#[derive(Clone)]
pub struct AuthRoutes {
    refresher: TokenRefresher,
    authorized: Arc<Notify>,
}

impl AuthRoutes {
    pub fn new(refresher: TokenRefresher) -> Self {
        Self {
            refresher,
            authorized: Arc::new(Notify::new()),
        }
    }

    /// Resolves after the next successful authorization callback.
    ///
    /// A callback that completed before this is called still counts once.
    pub async fn wait_for_authorization(&self) {
        self.authorized.notified().await;
    }

    pub(crate) fn redirect(&self) -> Response {
        let location = self
            .refresher
            .oauth()
            .authorization_url(None)
            .map_err(|e| e.to_string())
            .and_then(|url| url.parse::<Uri>().map_err(|e| e.to_string()));

        match location {
            Ok(uri) => {
                tracing::info!("redirecting browser to authorization page");
                warp::redirect::found(uri).into_response()
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot build authorization url");
                warp::reply::with_status("Authorization is not configured", StatusCode::INTERNAL_SERVER_ERROR)
                    .into_response()
            }
        }
    }

    pub(crate) async fn callback(&self, query: HashMap<String, String>) -> Response {
        if let Some(error) = query.get("error") {
            let description = query.get("error_description").map(String::as_str).unwrap_or("");
            tracing::warn!(%error, %description, "authorization denied");
            return warp::reply::with_status("Authorization was denied", StatusCode::BAD_REQUEST)
                .into_response();
        }

        let Some(code) = query.get("code").filter(|c| !c.is_empty()) else {
            return warp::reply::with_status("Missing authorization code", StatusCode::BAD_REQUEST)
                .into_response();
        };

        match self.refresher.authorize(code).await {
            Ok(_) => {
                tracing::info!("authorization complete, credential stored");
                self.authorized.notify_one();
                warp::reply::html("Authorization complete. You can close this window.").into_response()
            }
            Err(e) => {
                tracing::error!(error = %e, "authorization code exchange failed");
                warp::reply::with_status("Authorization failed", StatusCode::BAD_GATEWAY).into_response()
            }
        }
    }
}

impl std::fmt::Debug for AuthRoutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRoutes").finish_non_exhaustive()
    }
}
