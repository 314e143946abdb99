//! # relay-server
//!
//! Local side of the bridge: a websocket endpoint that fans normalized alert events
//! out to every connected listener, plus the two browser routes that complete the
//! OAuth authorization-code flow.
//!
//! [`NotificationRelay`] owns the listener set and can be used on its own;
//! [`RelayServer`] exposes it over HTTP with warp.

mod auth;
mod error;
mod relay;
mod server;

pub use auth::AuthRoutes;
pub use error::{RelayError, Result};
pub use relay::{ListenerId, NotificationRelay};
pub use server::RelayServer;
