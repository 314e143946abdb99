//! Fan-out of encoded events to local listeners.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Identifies one connected listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broadcasts events to every connected listener.
///
/// Each listener is represented by the sending half of a channel; the connection
/// task owns the receiving half and writes frames to its socket. Cloning the relay
/// shares the same listener set.
#[derive(Clone, Default)]
pub struct NotificationRelay {
    listeners: Arc<DashMap<ListenerId, mpsc::UnboundedSender<String>>>,
}

impl NotificationRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It receives every broadcast that starts after this call.
    pub fn add_listener(&self, sender: mpsc::UnboundedSender<String>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.insert(id, sender);
        id
    }

    /// Register a listener backed by a fresh channel.
    pub fn subscribe(&self) -> (ListenerId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.add_listener(tx), rx)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Encode `event` once and send it to every open listener.
    ///
    /// Iterates over a snapshot, so listeners joining or leaving mid-broadcast do
    /// not block it. Closed listeners are skipped, not removed; they leave through
    /// their own disconnect. Returns the number of listeners reached.
    pub fn broadcast<T: Serialize + ?Sized>(&self, event: &T) -> Result<usize> {
        let text = serde_json::to_string(event)?;
        Ok(self.broadcast_text(&text))
    }

    /// Send an already encoded frame to every open listener.
    pub fn broadcast_text(&self, text: &str) -> usize {
        let snapshot: Vec<_> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let delivered = snapshot
            .iter()
            .filter(|sender| sender.send(text.to_string()).is_ok())
            .count();

        tracing::debug!(delivered, listeners = snapshot.len(), "broadcast event");
        delivered
    }
}

impl fmt::Debug for NotificationRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRelay")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_reaches_every_listener() {
        let relay = NotificationRelay::new();
        let (_a, mut rx_a) = relay.subscribe();
        let (_b, mut rx_b) = relay.subscribe();

        let delivered = relay.broadcast(&json!({"type": "follow", "user": "viewer"})).unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap(), r#"{"type":"follow","user":"viewer"}"#);
        assert_eq!(rx_b.try_recv().unwrap(), r#"{"type":"follow","user":"viewer"}"#);
    }

    #[test]
    fn test_closed_listener_is_skipped_not_removed() {
        let relay = NotificationRelay::new();
        let (_open, mut rx_open) = relay.subscribe();
        let (_closed, rx_closed) = relay.subscribe();
        drop(rx_closed);

        assert_eq!(relay.broadcast(&json!({"type": "raid"})).unwrap(), 1);
        assert_eq!(relay.listener_count(), 2);
        assert!(rx_open.try_recv().is_ok());
    }

    #[test]
    fn test_removed_listener_gets_nothing() {
        let relay = NotificationRelay::new();
        let (id, mut rx) = relay.subscribe();

        assert!(relay.remove_listener(id));
        assert!(!relay.remove_listener(id));
        assert_eq!(relay.broadcast(&json!({"type": "cheer"})).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_without_listeners() {
        let relay = NotificationRelay::new();
        assert_eq!(relay.broadcast_text("{}"), 0);
    }

    #[test]
    fn test_clones_share_listeners() {
        let relay = NotificationRelay::new();
        let clone = relay.clone();
        let (_id, mut rx) = clone.subscribe();

        assert_eq!(relay.listener_count(), 1);
        relay.broadcast_text("hello");
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_membership_changes_during_concurrent_broadcasts() {
        let relay = NotificationRelay::new();
        let (_id, mut rx) = relay.subscribe();

        let churn = {
            let relay = relay.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let (id, _rx) = relay.subscribe();
                    tokio::task::yield_now().await;
                    relay.remove_listener(id);
                }
            })
        };
        let sender = {
            let relay = relay.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    relay.broadcast(&json!({"n": i})).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        churn.await.unwrap();
        sender.await.unwrap();

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 100);
        assert_eq!(relay.listener_count(), 1);
    }
}
