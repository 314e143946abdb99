//! Command implementations.

use anyhow::{Context, Result};
use eventsub_api::{cleanup_all, SubscriptionApi, SubscriptionClient};
use eventsub_auth::{CredentialStore, OAuthClient, TokenRefresher};
use eventsub_stream::{AlertEvent, SessionHandle, SessionManager, SessionStatus, WsConnector};
use relay_server::{AuthRoutes, NotificationRelay, RelayServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::shutdown::wait_for_stop;

/// Upper bound on the whole shutdown sequence.
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(5);

fn refresher(config: &BridgeConfig) -> TokenRefresher {
    let store = Arc::new(CredentialStore::open(&config.token_path));
    TokenRefresher::new(store, OAuthClient::new(config.oauth_config()))
}

fn api_client(config: &BridgeConfig) -> Result<SubscriptionClient> {
    if !config.has_client_credentials() {
        anyhow::bail!("TWITCH_CLIENT_ID and TWITCH_CLIENT_SECRET must be set");
    }
    SubscriptionClient::new(config.api_config(), refresher(config))
        .context("Failed to create subscription client")
}

/// Serve listeners and relay alerts until a stop signal arrives.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let relay = NotificationRelay::new();

    let refresher = config.has_client_credentials().then(|| refresher(&config));
    let auth = refresher.clone().map(AuthRoutes::new);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let server = RelayServer::bind(addr, relay.clone(), auth.clone())
        .await
        .context("Failed to start relay server")?;
    info!("Listeners can connect to ws://localhost:{}", server.local_addr().port());

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_events(events_rx, relay));

    let session = match (refresher, auth) {
        (Some(refresher), Some(auth)) => Some(start_session(&config, refresher, auth, events_tx)?),
        _ => {
            error!("TWITCH_CLIENT_ID and TWITCH_CLIENT_SECRET are not set; alerts are disabled");
            drop(events_tx);
            None
        }
    };

    // One stdin reader for the whole run, so no buffered line is lost between waits.
    let stop = wait_for_stop();
    tokio::pin!(stop);

    let reason = match session {
        Some((handle, mut task)) => {
            let reason = tokio::select! {
                reason = &mut stop => Some(reason),
                result = &mut task => {
                    report_session_exit(result);
                    None
                }
            };
            let reason = match reason {
                Some(reason) => reason,
                None => {
                    warn!("Session manager stopped; still serving listeners");
                    (&mut stop).await
                }
            };
            info!(?reason, "Stopping");
            if tokio::time::timeout(FORCE_EXIT_AFTER, stop_session(&handle, task))
                .await
                .is_err()
            {
                warn!("Session shutdown did not finish in {}s", FORCE_EXIT_AFTER.as_secs());
            }
            reason
        }
        None => stop.await,
    };

    if tokio::time::timeout(FORCE_EXIT_AFTER, server.shutdown()).await.is_err() {
        warn!("Relay server did not stop in {}s", FORCE_EXIT_AFTER.as_secs());
    }
    forwarder.abort();

    debug!(?reason, "Bridge stopped");
    Ok(())
}

fn start_session(
    config: &BridgeConfig,
    refresher: TokenRefresher,
    auth: AuthRoutes,
    events_tx: mpsc::UnboundedSender<AlertEvent>,
) -> Result<(SessionHandle, JoinHandle<eventsub_stream::Result<()>>)> {
    let store = refresher.store().clone();
    let authorization_url = refresher
        .oauth()
        .authorization_url(None)
        .context("Failed to build authorization URL")?;

    let api: Arc<dyn SubscriptionApi> = Arc::new(
        SubscriptionClient::new(config.api_config(), refresher)
            .context("Failed to create subscription client")?,
    );
    let (manager, handle) = SessionManager::new(
        config.session_config(),
        api,
        Arc::new(WsConnector),
        events_tx,
    );

    let local_auth = format!("http://localhost:{}/auth/twitch", config.port);
    let task = tokio::spawn(async move {
        if !store.exists() {
            warn!(path = %store.path().display(), "No stored credentials");
            info!("Authorize the bridge at {local_auth}");
            info!("or open {authorization_url}");
            auth.wait_for_authorization().await;
            info!("Authorization complete");
        }
        manager.run().await
    });

    Ok((handle, task))
}

/// Stop the session manager, cleaning up its subscriptions when it got far enough to have any.
async fn stop_session(handle: &SessionHandle, task: JoinHandle<eventsub_stream::Result<()>>) {
    if task.is_finished() {
        return;
    }
    if handle.current_status() == SessionStatus::Disconnected {
        // Still waiting for authorization, or about to connect with nothing registered.
        task.abort();
        return;
    }
    handle.shutdown().await;
    report_session_exit(task.await);
}

fn report_session_exit(result: std::result::Result<eventsub_stream::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => debug!("Session manager finished"),
        Ok(Err(e)) => error!("Session manager failed: {}", e),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("Session task failed: {}", e),
    }
}

async fn forward_events(mut events_rx: mpsc::UnboundedReceiver<AlertEvent>, relay: NotificationRelay) {
    while let Some(event) = events_rx.recv().await {
        match relay.broadcast(&event) {
            Ok(delivered) => debug!(kind = %event.kind(), delivered, "Relayed alert"),
            Err(e) => warn!("Failed to relay alert: {}", e),
        }
    }
}

/// Print every subscription the provider holds for this application.
pub async fn list(config: BridgeConfig) -> Result<()> {
    let client = api_client(&config)?;
    let subscriptions = client.list().await.context("Failed to list subscriptions")?;

    if subscriptions.is_empty() {
        println!("No subscriptions");
        return Ok(());
    }

    println!("{} subscription(s):", subscriptions.len());
    for subscription in &subscriptions {
        println!(
            "  {}  {:<20} {:<28} session={}",
            subscription.id,
            subscription.subscription_type,
            subscription.status,
            subscription.transport.session_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Delete every subscription the provider holds for this application.
pub async fn cleanup(config: BridgeConfig) -> Result<()> {
    let client = api_client(&config)?;
    let report = cleanup_all(&client).await.context("Failed to list subscriptions")?;

    println!(
        "Deleted {} of {} subscription(s) ({} already gone)",
        report.deleted, report.attempted, report.already_gone
    );
    for (id, reason) in &report.failed {
        println!("  failed to delete {id}: {reason}");
    }

    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} subscription(s) could not be deleted", report.failed.len())
    }
}

/// Print the URL that starts the authorization-code flow.
pub fn auth_url(config: BridgeConfig) -> Result<()> {
    if !config.has_client_credentials() {
        anyhow::bail!("TWITCH_CLIENT_ID and TWITCH_CLIENT_SECRET must be set");
    }
    let url = OAuthClient::new(config.oauth_config())
        .authorization_url(None)
        .context("Failed to build authorization URL")?;
    println!("{url}");
    Ok(())
}
