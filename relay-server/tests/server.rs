//! End-to-end tests for the relay server over real sockets.

use eventsub_auth::{CredentialStore, OAuthClient, OAuthConfig, TokenRefresher};
use futures::{SinkExt, StreamExt};
use relay_server::{AuthRoutes, NotificationRelay, RelayServer};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

fn any_port() -> SocketAddr {
    ([127, 0, 0, 1], 0).into()
}

async fn wait_for_listeners(relay: &NotificationRelay, expected: usize) {
    for _ in 0..200 {
        if relay.listener_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} listeners, have {}", relay.listener_count());
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_listener_receives_broadcast_and_is_removed_on_disconnect() {
    let relay = NotificationRelay::new();
    let server = RelayServer::bind(any_port(), relay.clone(), None).await.unwrap();

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.local_addr()))
        .await
        .unwrap();
    wait_for_listeners(&relay, 1).await;

    let delivered = relay.broadcast(&json!({"type": "follow", "user": "viewer"})).unwrap();
    assert_eq!(delivered, 1);

    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(frame, Message::Text(r#"{"type":"follow","user":"viewer"}"#.to_string()));

    socket.close(None).await.unwrap();
    wait_for_listeners(&relay, 0).await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_multiple_listeners_each_receive_event() {
    let relay = NotificationRelay::new();
    let server = RelayServer::bind(any_port(), relay.clone(), None).await.unwrap();
    let url = format!("ws://{}/", server.local_addr());

    let (mut first, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    wait_for_listeners(&relay, 2).await;

    assert_eq!(relay.broadcast(&json!({"type": "raid", "viewers": 3})).unwrap(), 2);

    for socket in [&mut first, &mut second] {
        let frame = socket.next().await.unwrap().unwrap();
        assert_eq!(frame.into_text().unwrap(), r#"{"type":"raid","viewers":3}"#);
    }

    first.send(Message::Text("ignored".to_string())).await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_auth_routes_absent_without_auth() {
    let server = RelayServer::bind(any_port(), NotificationRelay::new(), None)
        .await
        .unwrap();

    let response = http_client()
        .get(format!("http://{}/auth/twitch", server.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    server.shutdown().await.unwrap();
}

struct AuthFixture {
    _dir: tempfile::TempDir,
    store: Arc<CredentialStore>,
    auth: AuthRoutes,
}

fn auth_fixture(oauth_server: &mockito::Server) -> AuthFixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CredentialStore::open(dir.path().join("tokens.json")));
    let oauth = OAuthClient::new(
        OAuthConfig::new("client-id", "client-secret").with_base_url(&oauth_server.url()),
    );
    let auth = AuthRoutes::new(TokenRefresher::new(Arc::clone(&store), oauth));
    AuthFixture {
        _dir: dir,
        store,
        auth,
    }
}

#[tokio::test]
async fn test_login_redirects_to_authorization_page() {
    let oauth_server = mockito::Server::new_async().await;
    let fx = auth_fixture(&oauth_server);
    let server = RelayServer::bind(any_port(), NotificationRelay::new(), Some(fx.auth.clone()))
        .await
        .unwrap();

    let response = http_client()
        .get(format!("http://{}/auth/twitch", server.local_addr()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 302);
    let location = response.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with(&format!("{}/oauth2/authorize?", oauth_server.url())));
    assert!(location.contains("client_id=client-id"));
    assert!(location.contains("response_type=code"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_callback_stores_credential_and_notifies() {
    let mut oauth_server = mockito::Server::new_async().await;
    let token = oauth_server
        .mock("POST", "/oauth2/token")
        .match_body(mockito::Matcher::UrlEncoded("code".into(), "auth-code".into()))
        .with_status(200)
        .with_body(r#"{"access_token":"fresh","refresh_token":"r1","expires_in":14000,"token_type":"bearer"}"#)
        .expect(1)
        .create_async()
        .await;

    let fx = auth_fixture(&oauth_server);
    let server = RelayServer::bind(any_port(), NotificationRelay::new(), Some(fx.auth.clone()))
        .await
        .unwrap();

    let waiter = {
        let auth = fx.auth.clone();
        tokio::spawn(async move { auth.wait_for_authorization().await })
    };

    let response = http_client()
        .get(format!("http://{}/auth/callback?code=auth-code&scope=bits%3Aread", server.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter was not notified")
        .unwrap();

    let stored = fx.store.require().unwrap();
    assert_eq!(stored.access_token, "fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
    token.assert_async().await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_callback_rejects_missing_code_and_denied_access() {
    let oauth_server = mockito::Server::new_async().await;
    let fx = auth_fixture(&oauth_server);
    let server = RelayServer::bind(any_port(), NotificationRelay::new(), Some(fx.auth.clone()))
        .await
        .unwrap();
    let base = format!("http://{}", server.local_addr());

    let missing = http_client().get(format!("{base}/auth/callback")).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 400);

    let denied = http_client()
        .get(format!("{base}/auth/callback?error=access_denied&error_description=user+denied"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 400);
    assert!(!fx.store.exists());

    server.shutdown().await.unwrap();
}
