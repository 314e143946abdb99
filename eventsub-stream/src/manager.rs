//! Session lifecycle state machine.

use eventsub_api::{cleanup_session, SubscriptionApi};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::events::AlertEvent;
use crate::message::{InboundMessage, SessionInfo};
use crate::session::{Session, SessionStatus};
use crate::transport::{Connector, Frame, Transport, NORMAL_CLOSURE};

type ShutdownRequest = oneshot::Sender<()>;

/// How one connection attempt ended.
enum Exit {
    /// Shutdown was requested; carries the requester to acknowledge, if any
    Shutdown(Option<ShutdownRequest>),
    Reconnect(String),
    Fatal(SessionError),
}

/// Drives one EventSub websocket connection at a time.
///
/// Created together with a [`SessionHandle`]; [`run`](SessionManager::run) keeps
/// reconnecting until shutdown is requested or a fatal configuration error occurs.
pub struct SessionManager {
    config: SessionConfig,
    api: Arc<dyn SubscriptionApi>,
    connector: Arc<dyn Connector>,
    events_tx: mpsc::UnboundedSender<AlertEvent>,
    status_tx: watch::Sender<SessionStatus>,
    shutdown_rx: mpsc::Receiver<ShutdownRequest>,
}

/// Observes and stops a running [`SessionManager`].
///
/// Dropping every handle is treated as a shutdown request.
#[derive(Clone)]
pub struct SessionHandle {
    status_rx: watch::Receiver<SessionStatus>,
    shutdown_tx: mpsc::Sender<ShutdownRequest>,
}

impl SessionHandle {
    /// Receiver that sees every status transition.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    pub fn current_status(&self) -> SessionStatus {
        *self.status_rx.borrow()
    }

    /// Request a clean shutdown and wait until the manager has reached `Closed`.
    ///
    /// Returns immediately if the manager has already stopped.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.shutdown_tx.send(tx).await.is_err() {
            return;
        }
        let _ = rx.await;
    }
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        api: Arc<dyn SubscriptionApi>,
        connector: Arc<dyn Connector>,
        events_tx: mpsc::UnboundedSender<AlertEvent>,
    ) -> (Self, SessionHandle) {
        let (status_tx, status_rx) = watch::channel(SessionStatus::Disconnected);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(4);

        let manager = Self {
            config,
            api,
            connector,
            events_tx,
            status_tx,
            shutdown_rx,
        };
        let handle = SessionHandle {
            status_rx,
            shutdown_tx,
        };
        (manager, handle)
    }

    /// Run until shutdown.
    ///
    /// Returns an error only for configuration problems that make reconnecting
    /// pointless, such as an invalid url or a missing credential.
    pub async fn run(mut self) -> Result<()> {
        let mut waiters = Vec::new();

        let result = match self.config.validate().and_then(|()| self.config.connect_url()) {
            Ok(url) => self.reconnect_loop(url.as_str(), &mut waiters).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::error!(error = %e, "session manager stopped");
        }
        self.set_status(SessionStatus::Closed);

        self.shutdown_rx.close();
        while let Ok(request) = self.shutdown_rx.try_recv() {
            waiters.push(request);
        }
        for waiter in waiters {
            let _ = waiter.send(());
        }
        result
    }

    async fn reconnect_loop(&mut self, url: &str, waiters: &mut Vec<ShutdownRequest>) -> Result<()> {
        loop {
            self.set_status(SessionStatus::Connecting);
            match self.connect_and_serve(url).await {
                Exit::Shutdown(request) => {
                    waiters.extend(request);
                    return Ok(());
                }
                Exit::Fatal(e) => return Err(e),
                Exit::Reconnect(reason) => {
                    self.set_status(SessionStatus::Reconnecting);
                    tracing::warn!(
                        reason = %reason,
                        delay = ?self.config.reconnect_delay,
                        "connection lost, reconnecting after delay"
                    );
                    tokio::select! {
                        biased;
                        request = self.shutdown_rx.recv() => {
                            waiters.extend(request);
                            return Ok(());
                        }
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    fn set_status(&self, status: SessionStatus) {
        publish_status(&self.status_tx, status);
    }

    async fn connect_and_serve(&mut self, url: &str) -> Exit {
        tracing::info!(url, "connecting to EventSub");
        let connected = tokio::select! {
            biased;
            request = self.shutdown_rx.recv() => return Exit::Shutdown(request),
            result = self.connector.connect(url) => result,
        };
        let mut transport = match connected {
            Ok(transport) => transport,
            Err(e) => return Exit::Reconnect(e.to_string()),
        };

        let info = match self.await_welcome(transport.as_mut()).await {
            Ok(info) => info,
            Err(exit) => return exit,
        };

        let mut session = Session::new(info, self.config.grace_period);
        tracing::info!(
            session_id = %session.id(),
            keepalive = ?session.keepalive_interval(),
            "session welcomed"
        );
        self.set_status(SessionStatus::Welcomed);

        let registered = tokio::select! {
            biased;
            request = self.shutdown_rx.recv() => {
                return self.shutdown_session(&session, transport.as_mut(), request).await;
            }
            result = register_subscriptions(&self.config, self.api.as_ref(), &self.status_tx, &mut session) => result,
        };

        if let Err(e) = registered {
            if e.is_fatal() {
                transport.terminate().await;
                return Exit::Fatal(e);
            }
            tracing::error!(
                session_id = %session.id(),
                error = %e,
                "skipping subscription registration until the next session"
            );
        }

        self.serve(&mut session, transport.as_mut()).await
    }

    async fn await_welcome(&mut self, transport: &mut dyn Transport) -> std::result::Result<SessionInfo, Exit> {
        let timeout = tokio::time::sleep(self.config.welcome_timeout);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                biased;
                request = self.shutdown_rx.recv() => {
                    self.close_transport(transport).await;
                    return Err(Exit::Shutdown(request));
                }
                frame = transport.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => match InboundMessage::parse(&text) {
                        Ok(InboundMessage::Welcome(info)) => return Ok(info),
                        Ok(other) => tracing::debug!(kind = other.kind(), "ignoring message before welcome"),
                        Err(e) => {
                            transport.terminate().await;
                            return Err(Exit::Reconnect(e.to_string()));
                        }
                    },
                    Some(Ok(Frame::Ping(data))) => {
                        if let Err(e) = transport.send(Frame::Pong(data)).await {
                            transport.terminate().await;
                            return Err(Exit::Reconnect(e.to_string()));
                        }
                    }
                    Some(Ok(Frame::Pong(_))) => {}
                    Some(Ok(Frame::Close(code))) => return Err(Exit::Reconnect(closed_reason(code))),
                    Some(Err(e)) => {
                        transport.terminate().await;
                        return Err(Exit::Reconnect(e.to_string()));
                    }
                    None => return Err(Exit::Reconnect("connection closed before welcome".to_string())),
                },
                _ = &mut timeout => {
                    transport.terminate().await;
                    let e = SessionError::WelcomeTimeout(self.config.welcome_timeout);
                    return Err(Exit::Reconnect(e.to_string()));
                }
            }
        }
    }

    async fn serve(&mut self, session: &mut Session, transport: &mut dyn Transport) -> Exit {
        loop {
            tokio::select! {
                biased;
                request = self.shutdown_rx.recv() => {
                    return self.shutdown_session(session, transport, request).await;
                }
                frame = transport.next_frame() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            transport.terminate().await;
                            return Exit::Reconnect(e.to_string());
                        }
                        None => return Exit::Reconnect("connection closed by provider".to_string()),
                    };

                    match frame {
                        Frame::Text(text) => {
                            session.touch();
                            if let Some(exit) = self.handle_message(session, &text) {
                                transport.terminate().await;
                                return exit;
                            }
                        }
                        Frame::Ping(data) => {
                            session.touch();
                            if let Err(e) = transport.send(Frame::Pong(data)).await {
                                transport.terminate().await;
                                return Exit::Reconnect(e.to_string());
                            }
                        }
                        Frame::Pong(_) => session.touch(),
                        Frame::Close(code) => return Exit::Reconnect(closed_reason(code)),
                    }
                }
                _ = session.deadline() => {
                    tracing::warn!(
                        session_id = %session.id(),
                        timeout = ?session.keepalive_timeout(),
                        "keepalive deadline expired, terminating connection"
                    );
                    transport.terminate().await;
                    return Exit::Reconnect("keepalive timeout".to_string());
                }
            }
        }
    }

    /// Handle one text message. Returns an exit when the connection must be replaced.
    fn handle_message(&self, session: &mut Session, text: &str) -> Option<Exit> {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "ignoring malformed message");
                return None;
            }
        };

        match message {
            InboundMessage::Keepalive => tracing::trace!(session_id = %session.id(), "keepalive"),
            InboundMessage::Notification {
                subscription_type,
                event,
            } => match AlertEvent::decode(&subscription_type, &event) {
                Ok(Some(alert)) => {
                    tracing::info!(kind = alert.kind(), "relaying notification");
                    if self.events_tx.send(alert).is_err() {
                        tracing::debug!("no event consumer attached, dropping notification");
                    }
                }
                Ok(None) => tracing::debug!(%subscription_type, "ignoring unsupported notification"),
                Err(e) => tracing::warn!(%subscription_type, error = %e, "ignoring malformed notification"),
            },
            InboundMessage::Reconnect { reconnect_url } => {
                tracing::info!(
                    session_id = %session.id(),
                    reconnect_url = reconnect_url.as_deref().unwrap_or(""),
                    "provider requested reconnect"
                );
                return Some(Exit::Reconnect("provider requested reconnect".to_string()));
            }
            InboundMessage::Revocation {
                subscription_id,
                subscription_type,
                status,
            } => {
                session.remove_subscription(&subscription_id);
                tracing::warn!(
                    session_id = %session.id(),
                    %subscription_id,
                    %subscription_type,
                    %status,
                    "subscription revoked by provider"
                );
            }
            InboundMessage::Welcome(info) => {
                tracing::debug!(session_id = %info.id, "ignoring welcome on an established session")
            }
            InboundMessage::Unknown(kind) => tracing::info!(%kind, "ignoring unknown message type"),
        }
        None
    }

    /// Delete this session's subscriptions, then close the transport cleanly.
    async fn shutdown_session(
        &self,
        session: &Session,
        transport: &mut dyn Transport,
        request: Option<ShutdownRequest>,
    ) -> Exit {
        tracing::info!(session_id = %session.id(), "shutting down session");

        match cleanup_session(self.api.as_ref(), session.id()).await {
            Ok(report) if report.is_clean() => {}
            Ok(report) => tracing::warn!(
                session_id = %session.id(),
                failed = ?report.failed,
                "some subscriptions could not be deleted"
            ),
            Err(e) => tracing::warn!(
                session_id = %session.id(),
                error = %e,
                "could not list subscriptions for cleanup"
            ),
        }

        self.close_transport(transport).await;
        Exit::Shutdown(request)
    }

    /// Send a normal close and wait briefly for the provider to acknowledge it.
    async fn close_transport(&self, transport: &mut dyn Transport) {
        if let Err(e) = transport.close(NORMAL_CLOSURE).await {
            tracing::debug!(error = %e, "close handshake failed");
            transport.terminate().await;
            return;
        }

        let acknowledged = tokio::time::timeout(self.config.close_timeout, async {
            while let Some(frame) = transport.next_frame().await {
                if matches!(frame, Ok(Frame::Close(_)) | Err(_)) {
                    break;
                }
            }
        })
        .await;

        if acknowledged.is_err() {
            tracing::debug!(timeout = ?self.config.close_timeout, "provider did not acknowledge close");
        }
        transport.terminate().await;
    }
}

fn publish_status(status_tx: &watch::Sender<SessionStatus>, status: SessionStatus) {
    let previous = status_tx.send_replace(status);
    if previous != status {
        tracing::debug!(from = %previous, to = %status, "session status changed");
    }
}

/// Register every configured event kind against the session.
///
/// Failures are isolated per event kind; the first success moves the session to `Active`.
async fn register_subscriptions(
    config: &SessionConfig,
    api: &dyn SubscriptionApi,
    status_tx: &watch::Sender<SessionStatus>,
    session: &mut Session,
) -> Result<()> {
    api.ensure_credentials().await?;

    let broadcaster_id = match &config.broadcaster_id {
        Some(id) => id.clone(),
        None => api.current_user_id().await?,
    };

    for kind in &config.event_kinds {
        let request = kind.request(&broadcaster_id, session.id());
        match api.register(&request).await {
            Ok(subscription) => {
                tracing::info!(
                    session_id = %session.id(),
                    event_type = %kind,
                    subscription_id = %subscription.id,
                    "subscription live"
                );
                session.add_subscription(subscription);
                publish_status(status_tx, SessionStatus::Active);
            }
            Err(e) => tracing::warn!(
                session_id = %session.id(),
                event_type = %kind,
                error = %e,
                "subscription registration failed"
            ),
        }
    }

    if session.subscription_count() == 0 {
        tracing::warn!(session_id = %session.id(), "no subscription accepted on this session");
    }
    Ok(())
}

fn closed_reason(code: Option<u16>) -> String {
    match code {
        Some(code) => format!("provider closed the connection with code {code}"),
        None => "provider closed the connection".to_string(),
    }
}
