//! Configuration types for the eventsub-stream crate
//!
//! This module defines the configuration that controls the session manager:
//! where to connect, which events to subscribe to and the timing of the
//! keepalive, reconnect and shutdown phases.

use eventsub_api::EventKind;
use std::ops::RangeInclusive;
use std::time::Duration;
use url::Url;

use crate::error::{Result, SessionError};

/// Keepalive intervals the provider accepts, in seconds.
pub(crate) const KEEPALIVE_SECONDS: RangeInclusive<u32> = 10..=600;

/// Configuration for the SessionManager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// EventSub websocket endpoint
    /// Default: wss://eventsub.wss.twitch.tv/ws
    pub url: String,

    /// Event kinds registered on every new session
    /// Default: follow and subscribe
    pub event_kinds: Vec<EventKind>,

    /// Broadcaster the subscriptions are scoped to
    /// Default: None (the user owning the access token)
    pub broadcaster_id: Option<String>,

    /// Keepalive interval requested from the provider, 10 to 600 seconds
    /// Default: None (provider default)
    pub keepalive_timeout_seconds: Option<u32>,

    /// Slack added to the keepalive interval before the connection is declared dead
    /// Default: 2 seconds
    pub grace_period: Duration,

    /// Fixed delay before reconnecting after any non-clean closure
    /// Default: 5 seconds
    pub reconnect_delay: Duration,

    /// How long to wait for the welcome message after connecting
    /// Default: 10 seconds
    pub welcome_timeout: Duration,

    /// How long to wait for the provider to acknowledge a clean close
    /// Default: 5 seconds
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "wss://eventsub.wss.twitch.tv/ws".to_string(),
            event_kinds: vec![EventKind::Follow, EventKind::Subscribe],
            broadcaster_id: None,
            keepalive_timeout_seconds: None,
            grace_period: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(5),
            welcome_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Create a new SessionConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        self.connect_url()?;

        if self.event_kinds.is_empty() {
            return Err(SessionError::Configuration(
                "At least one event kind must be configured".to_string(),
            ));
        }

        if let Some(seconds) = self.keepalive_timeout_seconds {
            if !KEEPALIVE_SECONDS.contains(&seconds) {
                return Err(SessionError::Configuration(format!(
                    "Keepalive timeout must be between 10 and 600 seconds, got {seconds}"
                )));
            }
        }

        if matches!(self.broadcaster_id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(SessionError::Configuration(
                "Broadcaster id must not be empty".to_string(),
            ));
        }

        if self.reconnect_delay == Duration::ZERO {
            return Err(SessionError::Configuration(
                "Reconnect delay must be greater than 0".to_string(),
            ));
        }

        if self.welcome_timeout == Duration::ZERO {
            return Err(SessionError::Configuration(
                "Welcome timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Websocket URL including the requested keepalive interval, if any.
    pub fn connect_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| SessionError::Configuration(format!("Invalid websocket url {}: {e}", self.url)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(SessionError::Configuration(format!(
                "Websocket url must use ws or wss, got {}",
                url.scheme()
            )));
        }

        if let Some(seconds) = self.keepalive_timeout_seconds {
            url.query_pairs_mut()
                .append_pair("keepalive_timeout_seconds", &seconds.to_string());
        }
        Ok(url)
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_event_kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.event_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_broadcaster_id(mut self, broadcaster_id: impl Into<String>) -> Self {
        self.broadcaster_id = Some(broadcaster_id.into());
        self
    }

    pub fn with_keepalive_timeout(mut self, seconds: u32) -> Self {
        self.keepalive_timeout_seconds = Some(seconds);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }
}
