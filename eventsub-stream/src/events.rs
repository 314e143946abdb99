//! Normalized alert events relayed to local listeners.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SessionError};

/// An alert in the local wire format, serialized as `{"type": "follow", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertEvent {
    Follow {
        user: String,
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        followed_at: Option<DateTime<Utc>>,
    },
    Subscribe {
        user: String,
        user_id: String,
        tier: String,
        is_gift: bool,
    },
    Cheer {
        /// `None` for anonymous cheers
        user: Option<String>,
        bits: u64,
        message: String,
        is_anonymous: bool,
    },
    Raid {
        from: String,
        from_id: String,
        viewers: u64,
    },
}

#[derive(Deserialize)]
struct FollowEvent {
    user_id: String,
    user_name: String,
    #[serde(default)]
    followed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SubscribeEvent {
    user_id: String,
    user_name: String,
    tier: String,
    #[serde(default)]
    is_gift: bool,
}

#[derive(Deserialize)]
struct CheerEvent {
    #[serde(default)]
    user_name: Option<String>,
    bits: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    is_anonymous: bool,
}

#[derive(Deserialize)]
struct RaidEvent {
    from_broadcaster_user_id: String,
    from_broadcaster_user_name: String,
    viewers: u64,
}

impl AlertEvent {
    /// Decode a notification's `event` object for the given subscription type.
    ///
    /// Unsupported subscription types yield `Ok(None)`; a supported type with a
    /// malformed event is a protocol error.
    pub fn decode(subscription_type: &str, event: &Value) -> Result<Option<Self>> {
        let alert = match subscription_type {
            "channel.follow" => {
                let e: FollowEvent = from_event(subscription_type, event)?;
                AlertEvent::Follow {
                    user: e.user_name,
                    user_id: e.user_id,
                    followed_at: e.followed_at,
                }
            }
            "channel.subscribe" => {
                let e: SubscribeEvent = from_event(subscription_type, event)?;
                AlertEvent::Subscribe {
                    user: e.user_name,
                    user_id: e.user_id,
                    tier: e.tier,
                    is_gift: e.is_gift,
                }
            }
            "channel.cheer" => {
                let e: CheerEvent = from_event(subscription_type, event)?;
                AlertEvent::Cheer {
                    user: if e.is_anonymous { None } else { e.user_name },
                    bits: e.bits,
                    message: e.message,
                    is_anonymous: e.is_anonymous,
                }
            }
            "channel.raid" => {
                let e: RaidEvent = from_event(subscription_type, event)?;
                AlertEvent::Raid {
                    from: e.from_broadcaster_user_name,
                    from_id: e.from_broadcaster_user_id,
                    viewers: e.viewers,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(alert))
    }

    /// The `type` tag of the serialized event.
    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::Follow { .. } => "follow",
            AlertEvent::Subscribe { .. } => "subscribe",
            AlertEvent::Cheer { .. } => "cheer",
            AlertEvent::Raid { .. } => "raid",
        }
    }
}

fn from_event<T: DeserializeOwned>(subscription_type: &str, event: &Value) -> Result<T> {
    T::deserialize(event)
        .map_err(|e| SessionError::Protocol(format!("malformed {subscription_type} event: {e}")))
}
