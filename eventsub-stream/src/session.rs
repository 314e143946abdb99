//! The live session and its keepalive deadline.

use eventsub_api::Subscription;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

use crate::message::SessionInfo;

/// Lifecycle state of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    /// Welcome received, no subscription accepted yet
    Welcomed,
    /// At least one subscription is live on the current session
    Active,
    Reconnecting,
    /// Shut down on request; the manager will not reconnect
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Welcomed => "welcomed",
            SessionStatus::Active => "active",
            SessionStatus::Reconnecting => "reconnecting",
            SessionStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One welcomed provider session.
///
/// Owns the keepalive deadline and the subscriptions registered against this
/// session id. Dropping the session cancels the deadline.
pub struct Session {
    id: String,
    keepalive_interval: Duration,
    grace_period: Duration,
    subscriptions: HashMap<String, Subscription>,
    deadline: Pin<Box<Sleep>>,
}

impl Session {
    /// Start a session and arm its keepalive deadline.
    pub fn new(info: SessionInfo, grace_period: Duration) -> Self {
        let timeout = info.keepalive_interval.saturating_add(grace_period);
        Self {
            id: info.id,
            keepalive_interval: info.keepalive_interval,
            grace_period,
            subscriptions: HashMap::new(),
            deadline: Box::pin(tokio::time::sleep(timeout)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// Silence tolerated before the connection is considered dead.
    pub fn keepalive_timeout(&self) -> Duration {
        self.keepalive_interval.saturating_add(self.grace_period)
    }

    /// Instant at which the keepalive deadline fires.
    pub fn deadline_at(&self) -> Instant {
        self.deadline.deadline()
    }

    /// Re-arm the keepalive deadline after any inbound traffic.
    pub fn touch(&mut self) {
        let timeout = self.keepalive_timeout();
        match Instant::now().checked_add(timeout) {
            Some(next) => self.deadline.as_mut().reset(next),
            None => self.deadline.set(tokio::time::sleep(timeout)),
        }
    }

    pub(crate) fn deadline(&mut self) -> &mut Pin<Box<Sleep>> {
        &mut self.deadline
    }

    pub fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id.clone(), subscription);
    }

    pub fn remove_subscription(&mut self, id: &str) -> Option<Subscription> {
        self.subscriptions.remove(id)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
