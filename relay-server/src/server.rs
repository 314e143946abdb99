//! HTTP server for local listeners and the authorization callback.

use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::ws::{Message, WebSocket, Ws};
use warp::{Filter, Reply};

use crate::auth::AuthRoutes;
use crate::error::{RelayError, Result};
use crate::relay::NotificationRelay;

/// Local HTTP server exposing the relay.
///
/// - `GET /` upgrades to a websocket that receives every broadcast event as a JSON text frame
/// - `GET /auth/twitch` redirects to the provider's authorization page (when auth routes are enabled)
/// - `GET /auth/callback?code=...` completes the authorization (when auth routes are enabled)
///
/// # Example
///
/// ```no_run
/// use relay_server::{NotificationRelay, RelayServer};
///
/// #[tokio::main]
/// async fn main() {
///     let relay = NotificationRelay::new();
///     let server = RelayServer::bind(([127, 0, 0, 1], 8080).into(), relay.clone(), None)
///         .await
///         .expect("Failed to start relay server");
///
///     relay.broadcast(&serde_json::json!({"type": "follow", "user": "viewer"})).unwrap();
///     server.shutdown().await.unwrap();
/// }
/// ```
pub struct RelayServer {
    /// The address the server is bound to
    local_addr: SocketAddr,
    relay: NotificationRelay,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RelayServer {
    /// Bind `addr` and start serving in a background task.
    ///
    /// Port 0 binds an ephemeral port; see [`local_addr`](RelayServer::local_addr).
    pub async fn bind(addr: SocketAddr, relay: NotificationRelay, auth: Option<AuthRoutes>) -> Result<Self> {
        let routes = Self::routes(relay.clone(), auth);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| RelayError::Bind(format!("{addr}: {e}")))?;

        let server_handle = tokio::spawn(server);
        tracing::info!(%local_addr, "relay server listening");

        Ok(Self {
            local_addr,
            relay,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn relay(&self) -> &NotificationRelay {
        &self.relay
    }

    /// Stop accepting connections and wait for the server task to finish.
    ///
    /// Open listener sockets are left to close on their own.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| RelayError::Shutdown(e.to_string()))?;
        }
        tracing::info!("relay server stopped");
        Ok(())
    }

    fn routes(relay: NotificationRelay, auth: Option<AuthRoutes>) -> BoxedFilter<(Response,)> {
        let listeners = warp::path::end()
            .and(warp::get())
            .and(warp::ws())
            .map(move |ws: Ws| {
                let relay = relay.clone();
                ws.on_upgrade(move |socket| serve_listener(socket, relay))
                    .into_response()
            });

        let Some(auth) = auth else {
            return listeners.boxed();
        };

        let login = warp::path!("auth" / "twitch").and(warp::get()).map({
            let auth = auth.clone();
            move || auth.redirect()
        });

        let callback = warp::path!("auth" / "callback")
            .and(warp::get())
            .and(warp::query::<HashMap<String, String>>())
            .then(move |query: HashMap<String, String>| {
                let auth = auth.clone();
                async move { auth.callback(query).await }
            });

        listeners.or(login).unify().or(callback).unify().boxed()
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

/// Pump broadcast frames into one listener socket until either side goes away.
async fn serve_listener(socket: WebSocket, relay: NotificationRelay) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = relay.add_listener(tx);
    tracing::info!(listener = %id, listeners = relay.listener_count(), "listener connected");

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        tracing::debug!(listener = %id, error = %e, "listener send failed");
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(message)) if message.is_close() => break,
                // listeners are receive-only
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(listener = %id, error = %e, "listener socket error");
                    break;
                }
                None => break,
            },
        }
    }

    relay.remove_listener(id);
    tracing::info!(listener = %id, listeners = relay.listener_count(), "listener disconnected");
}
