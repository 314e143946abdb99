//! # eventsub-stream
//!
//! Owns the lifecycle of one EventSub websocket connection: connect, wait for the
//! welcome handshake, register subscriptions bound to the new session, track the
//! keepalive deadline, obey reconnect requests and tear everything down cleanly on
//! shutdown.
//!
//! ## Overview
//!
//! [`SessionManager::run`] drives a single state machine
//! (`Disconnected → Connecting → Welcomed → Active → Reconnecting → Closed`). Every
//! inbound frame is handled to completion before the next one is read, and the
//! keepalive deadline is a timer owned by the current [`Session`], so superseding a
//! session cancels its timer.
//!
//! Notifications are decoded into [`AlertEvent`]s and forwarded on an mpsc channel;
//! the relay layer fans them out to local listeners.
//!
//! The websocket and REST seams are traits ([`Connector`], [`Transport`] and
//! [`eventsub_api::SubscriptionApi`]) so the state machine can be exercised with
//! fakes under paused time.

mod config;
mod error;
mod events;
mod manager;
mod message;
mod session;
mod transport;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use events::AlertEvent;
pub use manager::{SessionHandle, SessionManager};
pub use message::{InboundMessage, SessionInfo};
pub use session::{Session, SessionStatus};
pub use transport::{Connector, Frame, Transport, WsConnector, WsTransport, NORMAL_CLOSURE};
