//! # eventsub-auth
//!
//! Credential handling for the eventsub bridge.
//!
//! This crate owns the persisted OAuth token record and everything that mutates it:
//!
//! - [`CredentialStore`]: reads and rewrites the JSON credential file.
//! - [`OAuthClient`]: talks to the provider's OAuth endpoints (authorization URL,
//!   code exchange, refresh grant, token validation).
//! - [`TokenRefresher`]: exchanges a stale access token for a new one, merging the
//!   response into the stored record. Concurrent refresh requests are coalesced into
//!   a single outbound call.
//!
//! # Example
//!
//! ```no_run
//! use eventsub_auth::{CredentialStore, OAuthClient, OAuthConfig, TokenRefresher};
//! use std::sync::Arc;
//!
//! # async fn run() -> eventsub_auth::Result<()> {
//! let store = Arc::new(CredentialStore::open("tokens.json"));
//! let oauth = OAuthClient::new(OAuthConfig::new("client-id", "client-secret"));
//! let refresher = TokenRefresher::new(store, oauth);
//!
//! let token = refresher.refresh().await?;
//! println!("new access token has {} chars", token.len());
//! # Ok(())
//! # }
//! ```

mod credential;
mod error;
mod oauth;
mod refresher;
mod store;

pub use credential::{Credential, TokenResponse};
pub use error::{AuthError, Result};
pub use oauth::{OAuthClient, OAuthConfig, TokenValidation};
pub use refresher::TokenRefresher;
pub use store::CredentialStore;
