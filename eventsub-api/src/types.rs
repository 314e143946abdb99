//! Wire types for the subscription endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Subscription condition, e.g. `{"broadcaster_user_id": "1234"}`.
pub type Condition = BTreeMap<String, String>;

/// Event kinds the bridge knows how to subscribe to and relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `channel.follow` v2, requires moderator scope
    Follow,
    /// `channel.subscribe` v1
    Subscribe,
    /// `channel.cheer` v1
    Cheer,
    /// `channel.raid` v1, matched on the receiving channel
    Raid,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Follow,
        EventKind::Subscribe,
        EventKind::Cheer,
        EventKind::Raid,
    ];

    /// Provider subscription type name.
    pub fn subscription_type(&self) -> &'static str {
        match self {
            EventKind::Follow => "channel.follow",
            EventKind::Subscribe => "channel.subscribe",
            EventKind::Cheer => "channel.cheer",
            EventKind::Raid => "channel.raid",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            EventKind::Follow => "2",
            _ => "1",
        }
    }

    /// Look up a kind by its provider subscription type name.
    pub fn from_subscription_type(subscription_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.subscription_type() == subscription_type)
    }

    /// Condition for this kind, scoped to the given broadcaster.
    pub fn condition(&self, broadcaster_id: &str) -> Condition {
        let mut condition = Condition::new();
        match self {
            EventKind::Follow => {
                condition.insert("broadcaster_user_id".to_string(), broadcaster_id.to_string());
                condition.insert("moderator_user_id".to_string(), broadcaster_id.to_string());
            }
            EventKind::Subscribe | EventKind::Cheer => {
                condition.insert("broadcaster_user_id".to_string(), broadcaster_id.to_string());
            }
            EventKind::Raid => {
                condition.insert("to_broadcaster_user_id".to_string(), broadcaster_id.to_string());
            }
        }
        condition
    }

    /// Build the websocket-transport request for this kind.
    pub fn request(&self, broadcaster_id: &str, session_id: &str) -> SubscriptionRequest {
        SubscriptionRequest::websocket(
            self.subscription_type(),
            self.version(),
            self.condition(broadcaster_id),
            session_id,
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subscription_type())
    }
}

/// Error returned when parsing an unrecognized event kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    /// Accepts the short names (`follow`) as well as the provider type names (`channel.follow`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "follow" => Ok(EventKind::Follow),
            "subscribe" => Ok(EventKind::Subscribe),
            "cheer" => Ok(EventKind::Cheer),
            "raid" => Ok(EventKind::Raid),
            other => {
                EventKind::from_subscription_type(other).ok_or_else(|| UnknownEventKind(s.to_string()))
            }
        }
    }
}

/// Delivery transport attached to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

impl TransportInfo {
    pub fn websocket(session_id: impl Into<String>) -> Self {
        Self {
            method: "websocket".to_string(),
            session_id: Some(session_id.into()),
            callback: None,
        }
    }
}

/// Body of a create-subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub subscription_type: String,
    pub version: String,
    pub condition: Condition,
    pub transport: TransportInfo,
}

impl SubscriptionRequest {
    pub fn websocket(
        subscription_type: impl Into<String>,
        version: impl Into<String>,
        condition: Condition,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            subscription_type: subscription_type.into(),
            version: version.into(),
            condition,
            transport: TransportInfo::websocket(session_id),
        }
    }
}

/// A subscription as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,

    #[serde(default)]
    pub status: String,

    #[serde(rename = "type")]
    pub subscription_type: String,

    pub version: String,

    #[serde(default)]
    pub condition: Condition,

    pub transport: TransportInfo,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub cost: u32,
}

impl Subscription {
    /// Whether this subscription delivers to the given websocket session.
    pub fn is_bound_to(&self, session_id: &str) -> bool {
        self.transport.session_id.as_deref() == Some(session_id)
    }

    pub fn event_kind(&self) -> Option<EventKind> {
        EventKind::from_subscription_type(&self.subscription_type)
    }
}

/// One page of the subscription listing.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionList {
    #[serde(default)]
    pub data: Vec<Subscription>,

    #[serde(default)]
    pub total: u32,

    #[serde(default)]
    pub total_cost: u32,

    #[serde(default)]
    pub max_total_cost: u32,

    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Result of deleting one subscription.
///
/// Only 204 means deleted. A 404 counts as success so that deleting the same id
/// twice is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
    Failed(u16),
}

impl DeleteOutcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            204 => DeleteOutcome::Deleted,
            404 => DeleteOutcome::AlreadyGone,
            other => DeleteOutcome::Failed(other),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, DeleteOutcome::Failed(_))
    }
}
