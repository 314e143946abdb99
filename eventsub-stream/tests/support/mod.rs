//! In-memory fakes for the subscription API and the websocket transport.
#![allow(dead_code)]

use async_trait::async_trait;
use eventsub_api::{
    ApiError, AuthError, DeleteOutcome, Subscription, SubscriptionApi, SubscriptionRequest,
};
use eventsub_stream::{Connector, Frame, Result, Transport};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Subscription API
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ApiState {
    next_id: u32,
    /// What the provider reports from `list()`
    pub provider: Vec<Subscription>,
    pub registered: Vec<SubscriptionRequest>,
    pub rejected_types: HashSet<String>,
    pub delete_status: HashMap<String, u16>,
    pub deleted: Vec<String>,
    pub list_calls: usize,
    pub credentials_missing: bool,
    /// How long each `register()` call takes
    pub register_delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<ApiState>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap()
    }

    pub fn reject(&self, subscription_type: &str) {
        self.state().rejected_types.insert(subscription_type.to_string());
    }

    pub fn set_register_delay(&self, delay: Duration) {
        self.state().register_delay = Some(delay);
    }

    pub fn set_delete_status(&self, id: &str, status: u16) {
        self.state().delete_status.insert(id.to_string(), status);
    }

    pub fn add_provider_subscription(&self, id: &str, session_id: &str) {
        self.state().provider.push(subscription(id, "channel.follow", session_id));
    }

    pub fn registered_sessions(&self) -> Vec<String> {
        self.state()
            .registered
            .iter()
            .filter_map(|r| r.transport.session_id.clone())
            .collect()
    }
}

pub fn subscription(id: &str, subscription_type: &str, session_id: &str) -> Subscription {
    serde_json::from_value(json!({
        "id": id,
        "status": "enabled",
        "type": subscription_type,
        "version": "1",
        "condition": {"broadcaster_user_id": "1234"},
        "transport": {"method": "websocket", "session_id": session_id}
    }))
    .unwrap()
}

#[async_trait]
impl SubscriptionApi for FakeApi {
    async fn ensure_credentials(&self) -> eventsub_api::Result<()> {
        if self.state().credentials_missing {
            return Err(ApiError::Auth(AuthError::Configuration(
                "no credential stored".to_string(),
            )));
        }
        Ok(())
    }

    async fn current_user_id(&self) -> eventsub_api::Result<String> {
        Ok("1234".to_string())
    }

    async fn register(&self, request: &SubscriptionRequest) -> eventsub_api::Result<Subscription> {
        let delay = self.state().register_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.registered.push(request.clone());

        if state.rejected_types.contains(&request.subscription_type) {
            return Err(ApiError::UnexpectedStatus {
                operation: "register",
                status: 400,
                body: "rejected".to_string(),
            });
        }

        state.next_id += 1;
        let mut created = subscription(
            &format!("sub-{}", state.next_id),
            &request.subscription_type,
            request.transport.session_id.as_deref().unwrap_or_default(),
        );
        created.version = request.version.clone();
        created.condition = request.condition.clone();
        state.provider.push(created.clone());
        Ok(created)
    }

    async fn list(&self) -> eventsub_api::Result<Vec<Subscription>> {
        let mut state = self.state();
        state.list_calls += 1;
        Ok(state.provider.clone())
    }

    async fn delete(&self, id: &str) -> eventsub_api::Result<DeleteOutcome> {
        let mut state = self.state();
        state.deleted.push(id.to_string());
        let status = state.delete_status.get(id).copied().unwrap_or(204);
        if status == 204 {
            state.provider.retain(|s| s.id != id);
        }
        Ok(DeleteOutcome::from_status(status))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// What the client did to a connection, as seen from the fake provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Sent(Frame),
    Closed(u16),
    Terminated,
}

/// Provider side of one fake connection.
pub struct ServerConn {
    pub to_client: mpsc::UnboundedSender<Frame>,
    pub from_client: mpsc::UnboundedReceiver<ClientEvent>,
    pub url: String,
    pub connected_at: Instant,
}

impl ServerConn {
    pub fn send_text(&self, text: String) {
        let _ = self.to_client.send(Frame::Text(text));
    }

    pub fn welcome(&self, session_id: &str, keepalive_seconds: u64) {
        self.send_text(welcome_message(session_id, keepalive_seconds));
    }

    pub fn keepalive(&self) {
        self.send_text(envelope("session_keepalive", None, json!({})));
    }

    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.from_client.recv().await
    }

    pub fn try_event(&mut self) -> Option<ClientEvent> {
        self.from_client.try_recv().ok()
    }
}

pub struct FakeConnector {
    conns_tx: mpsc::UnboundedSender<ServerConn>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerConn>) {
        let (conns_tx, conns_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            conns_tx,
            connects: AtomicUsize::new(0),
        });
        (connector, conns_rx)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (events, from_client) = mpsc::unbounded_channel();

        let _ = self.conns_tx.send(ServerConn {
            to_client,
            from_client,
            url: url.to_string(),
            connected_at: Instant::now(),
        });

        Ok(Box::new(FakeTransport {
            incoming,
            events,
            terminated: false,
        }))
    }
}

struct FakeTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<ClientEvent>,
    terminated: bool,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        if self.terminated {
            return None;
        }
        self.incoming.recv().await.map(Ok)
    }

    async fn send(&mut self, frame: Frame) -> Result<()> {
        let _ = self.events.send(ClientEvent::Sent(frame));
        Ok(())
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        let _ = self.events.send(ClientEvent::Closed(code));
        Ok(())
    }

    async fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            let _ = self.events.send(ClientEvent::Terminated);
        }
    }
}

// ---------------------------------------------------------------------------
// Provider messages
// ---------------------------------------------------------------------------

pub fn envelope(message_type: &str, subscription_type: Option<&str>, payload: Value) -> String {
    let mut metadata = json!({
        "message_id": "befa7b53-d79d-478f-86b9-120f112b044e",
        "message_type": message_type,
        "message_timestamp": "2023-07-19T10:11:12.123Z"
    });
    if let Some(subscription_type) = subscription_type {
        metadata["subscription_type"] = json!(subscription_type);
        metadata["subscription_version"] = json!("1");
    }
    json!({"metadata": metadata, "payload": payload}).to_string()
}

pub fn welcome_message(session_id: &str, keepalive_seconds: u64) -> String {
    envelope(
        "session_welcome",
        None,
        json!({"session": {
            "id": session_id,
            "status": "connected",
            "connected_at": "2023-07-19T14:56:51.616329898Z",
            "keepalive_timeout_seconds": keepalive_seconds,
            "reconnect_url": null
        }}),
    )
}

pub fn reconnect_message(session_id: &str) -> String {
    envelope(
        "session_reconnect",
        None,
        json!({"session": {
            "id": session_id,
            "status": "reconnecting",
            "keepalive_timeout_seconds": null,
            "reconnect_url": "wss://eventsub.wss.twitch.tv/ws?reconnect=true"
        }}),
    )
}

pub fn follow_notification(user: &str) -> String {
    envelope(
        "notification",
        Some("channel.follow"),
        json!({
            "subscription": {"id": "sub-1", "type": "channel.follow", "status": "enabled"},
            "event": {
                "user_id": "999",
                "user_login": user.to_lowercase(),
                "user_name": user,
                "broadcaster_user_id": "1234",
                "followed_at": "2023-07-15T18:16:11.17106713Z"
            }
        }),
    )
}

pub fn revocation_message(subscription_id: &str) -> String {
    envelope(
        "revocation",
        Some("channel.follow"),
        json!({"subscription": {
            "id": subscription_id,
            "type": "channel.follow",
            "status": "authorization_revoked"
        }}),
    )
}
