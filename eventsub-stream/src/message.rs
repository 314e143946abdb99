//! Inbound EventSub websocket messages.
//!
//! Every text frame is an envelope of `metadata` (message id, type and timestamp)
//! and a type-specific `payload`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::KEEPALIVE_SECONDS;
use crate::error::{Result, SessionError};

/// Session identity announced by the welcome message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub keepalive_interval: Duration,
    pub connected_at: Option<DateTime<Utc>>,
}

/// A decoded provider message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Welcome(SessionInfo),
    Keepalive,
    Notification {
        subscription_type: String,
        event: Value,
    },
    Reconnect {
        reconnect_url: Option<String>,
    },
    Revocation {
        subscription_id: String,
        subscription_type: String,
        status: String,
    },
    /// A message type this client does not handle
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    metadata: Metadata,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    message_type: String,
    #[serde(default)]
    subscription_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    session: RawSession,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    id: Option<String>,
    keepalive_timeout_seconds: Option<u64>,
    #[serde(default)]
    reconnect_url: Option<String>,
    #[serde(default)]
    connected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionPayload {
    subscription: RawSubscription,
    #[serde(default)]
    event: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    #[serde(rename = "type")]
    subscription_type: String,
    #[serde(default)]
    status: String,
}

impl InboundMessage {
    /// Parse one text frame.
    ///
    /// Returns a protocol error for invalid JSON and for known message types that
    /// lack a required field, such as a welcome without a session id.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| SessionError::Protocol(format!("invalid message envelope: {e}")))?;

        match envelope.metadata.message_type.as_str() {
            "session_welcome" => {
                let session = session_payload(envelope.payload)?;
                let id = session
                    .id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| SessionError::Protocol("welcome message without session id".to_string()))?;
                let seconds = session.keepalive_timeout_seconds.ok_or_else(|| {
                    SessionError::Protocol("welcome message without keepalive_timeout_seconds".to_string())
                })?;
                if !u32::try_from(seconds).is_ok_and(|s| KEEPALIVE_SECONDS.contains(&s)) {
                    return Err(SessionError::Protocol(format!(
                        "welcome message keepalive_timeout_seconds out of range: {seconds}"
                    )));
                }
                Ok(InboundMessage::Welcome(SessionInfo {
                    id,
                    keepalive_interval: Duration::from_secs(seconds),
                    connected_at: session.connected_at,
                }))
            }
            "session_keepalive" => Ok(InboundMessage::Keepalive),
            "session_reconnect" => {
                let session = session_payload(envelope.payload)?;
                Ok(InboundMessage::Reconnect {
                    reconnect_url: session.reconnect_url,
                })
            }
            "notification" => {
                let payload = subscription_payload(envelope.payload)?;
                let event = payload
                    .event
                    .ok_or_else(|| SessionError::Protocol("notification without event".to_string()))?;
                Ok(InboundMessage::Notification {
                    subscription_type: envelope
                        .metadata
                        .subscription_type
                        .unwrap_or(payload.subscription.subscription_type),
                    event,
                })
            }
            "revocation" => {
                let payload = subscription_payload(envelope.payload)?;
                Ok(InboundMessage::Revocation {
                    subscription_id: payload.subscription.id,
                    subscription_type: payload.subscription.subscription_type,
                    status: payload.subscription.status,
                })
            }
            other => Ok(InboundMessage::Unknown(other.to_string())),
        }
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Welcome(_) => "session_welcome",
            InboundMessage::Keepalive => "session_keepalive",
            InboundMessage::Notification { .. } => "notification",
            InboundMessage::Reconnect { .. } => "session_reconnect",
            InboundMessage::Revocation { .. } => "revocation",
            InboundMessage::Unknown(kind) => kind,
        }
    }
}

fn session_payload(payload: Value) -> Result<RawSession> {
    serde_json::from_value::<SessionPayload>(payload)
        .map(|p| p.session)
        .map_err(|e| SessionError::Protocol(format!("invalid session payload: {e}")))
}

fn subscription_payload(payload: Value) -> Result<SubscriptionPayload> {
    serde_json::from_value(payload)
        .map_err(|e| SessionError::Protocol(format!("invalid subscription payload: {e}")))
}
