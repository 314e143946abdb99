//! # eventsub-api
//!
//! Thin, typed operations against the provider's EventSub subscription endpoints:
//! create, list and delete subscriptions, plus the user lookup needed to fill in
//! subscription conditions.
//!
//! The operations are exposed through the [`SubscriptionApi`] trait so the session
//! layer can be driven by a fake in tests. [`SubscriptionClient`] is the reqwest
//! implementation; it authenticates every call with the current bearer token and,
//! on an authorization failure, refreshes the token once and retries the call once.

mod api;
mod cleanup;
mod client;
mod error;
mod types;

pub use api::SubscriptionApi;
pub use cleanup::{cleanup_all, cleanup_session, CleanupReport};
pub use client::{ApiConfig, SubscriptionClient};
pub use error::{ApiError, Result};
pub use eventsub_auth::AuthError;
pub use types::{
    Condition, DeleteOutcome, EventKind, Subscription, SubscriptionList, SubscriptionRequest,
    TransportInfo, UnknownEventKind,
};
