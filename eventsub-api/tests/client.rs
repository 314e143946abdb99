//! Integration tests for the subscription client against a mock provider.

use chrono::Utc;
use eventsub_api::{
    cleanup_all, cleanup_session, ApiConfig, ApiError, DeleteOutcome, EventKind, SubscriptionApi,
    SubscriptionClient,
};
use eventsub_auth::{Credential, CredentialStore, OAuthClient, OAuthConfig, TokenRefresher};
use mockito::Matcher;
use serde_json::{json, Map};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: Arc<CredentialStore>,
    client: SubscriptionClient,
}

fn fixture(server: &mockito::Server) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CredentialStore::open(dir.path().join("tokens.json")));
    store
        .save(&Credential {
            access_token: "old-token".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            token_type: Some("bearer".to_string()),
            scope: vec![],
            expires_in: Some(14_000),
            obtained_at: Some(Utc::now()),
            extra: Map::new(),
        })
        .unwrap();

    let oauth = OAuthClient::new(OAuthConfig::new("client-id", "client-secret").with_base_url(&server.url()));
    let refresher = TokenRefresher::new(Arc::clone(&store), oauth);
    let client = SubscriptionClient::new(ApiConfig::default().with_base_url(server.url()), refresher).unwrap();

    Fixture {
        _dir: dir,
        store,
        client,
    }
}

fn subscription_json(id: &str, kind: &str, session_id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "status": "enabled",
        "type": kind,
        "version": "1",
        "condition": {"broadcaster_user_id": "1234"},
        "created_at": "2024-01-01T00:00:00Z",
        "transport": {"method": "websocket", "session_id": session_id},
        "cost": 0
    })
}

#[tokio::test]
async fn test_register_accepted() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/eventsub/subscriptions")
        .match_header("authorization", "Bearer old-token")
        .match_header("client-id", "client-id")
        .match_body(Matcher::PartialJson(json!({
            "type": "channel.follow",
            "version": "2",
            "condition": {"broadcaster_user_id": "1234", "moderator_user_id": "1234"},
            "transport": {"method": "websocket", "session_id": "session-1"}
        })))
        .with_status(202)
        .with_body(json!({"data": [subscription_json("sub-1", "channel.follow", "session-1")]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let fx = fixture(&server);
    let subscription = fx
        .client
        .register(&EventKind::Follow.request("1234", "session-1"))
        .await
        .unwrap();

    assert_eq!(subscription.id, "sub-1");
    assert!(subscription.is_bound_to("session-1"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_register_rejected_status_is_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/eventsub/subscriptions")
        .with_status(400)
        .with_body(r#"{"error":"Bad Request","status":400,"message":"invalid condition"}"#)
        .create_async()
        .await;

    let fx = fixture(&server);
    let err = fx
        .client
        .register(&EventKind::Cheer.request("1234", "session-1"))
        .await
        .unwrap_err();

    match err {
        ApiError::UnexpectedStatus { operation, status, body } => {
            assert_eq!(operation, "register");
            assert_eq!(status, 400);
            assert!(body.contains("invalid condition"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_register_ok_status_other_than_accepted_is_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/eventsub/subscriptions")
        .with_status(200)
        .with_body(json!({"data": []}).to_string())
        .create_async()
        .await;

    let fx = fixture(&server);
    let err = fx
        .client
        .register(&EventKind::Raid.request("1234", "session-1"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(200));
}

#[tokio::test]
async fn test_unauthorized_refreshes_once_and_retries_with_new_token() {
    let mut server = mockito::Server::new_async().await;
    let rejected = server
        .mock("POST", "/eventsub/subscriptions")
        .match_header("authorization", "Bearer old-token")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let token = server
        .mock("POST", "/oauth2/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()))
        .with_status(200)
        .with_body(r#"{"access_token":"new-token","expires_in":14000}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("POST", "/eventsub/subscriptions")
        .match_header("authorization", "Bearer new-token")
        .with_status(202)
        .with_body(json!({"data": [subscription_json("sub-2", "channel.subscribe", "session-1")]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let fx = fixture(&server);
    let subscription = fx
        .client
        .register(&EventKind::Subscribe.request("1234", "session-1"))
        .await
        .unwrap();

    assert_eq!(subscription.id, "sub-2");
    rejected.assert_async().await;
    token.assert_async().await;
    accepted.assert_async().await;

    let stored = fx.store.require().unwrap();
    assert_eq!(stored.access_token, "new-token");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_second_unauthorized_is_fatal_without_third_attempt() {
    let mut server = mockito::Server::new_async().await;
    let register = server
        .mock("POST", "/eventsub/subscriptions")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let token = server
        .mock("POST", "/oauth2/token")
        .with_status(200)
        .with_body(r#"{"access_token":"new-token","expires_in":14000}"#)
        .expect(1)
        .create_async()
        .await;

    let fx = fixture(&server);
    let err = fx
        .client
        .register(&EventKind::Follow.request("1234", "session-1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Unauthorized {
            operation: "register",
            status: 401
        }
    ));
    register.assert_async().await;
    token.assert_async().await;
}

#[tokio::test]
async fn test_refresh_failure_propagates_as_auth_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/eventsub/subscriptions")
        .with_status(403)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("POST", "/oauth2/token")
        .with_status(400)
        .with_body(r#"{"message":"Invalid refresh token"}"#)
        .expect(1)
        .create_async()
        .await;

    let fx = fixture(&server);
    let err = fx.client.list().await.unwrap_err();
    assert!(matches!(err, ApiError::Auth(_)));
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_list_follows_pagination() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/eventsub/subscriptions")
        .match_query(Matcher::Missing)
        .with_status(200)
        .with_body(
            json!({
                "data": [subscription_json("sub-1", "channel.follow", "a")],
                "total": 2,
                "pagination": {"cursor": "page-2"}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/eventsub/subscriptions")
        .match_query(Matcher::UrlEncoded("after".into(), "page-2".into()))
        .with_status(200)
        .with_body(
            json!({
                "data": [subscription_json("sub-2", "channel.cheer", "b")],
                "total": 2,
                "pagination": {}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let fx = fixture(&server);
    let subscriptions = fx.client.list().await.unwrap();

    let ids: Vec<_> = subscriptions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["sub-1", "sub-2"]);
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_delete_outcomes_never_error_on_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("DELETE", "/eventsub/subscriptions")
        .match_query(Matcher::UrlEncoded("id".into(), "gone".into()))
        .with_status(204)
        .create_async()
        .await;
    server
        .mock("DELETE", "/eventsub/subscriptions")
        .match_query(Matcher::UrlEncoded("id".into(), "missing".into()))
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("DELETE", "/eventsub/subscriptions")
        .match_query(Matcher::UrlEncoded("id".into(), "broken".into()))
        .with_status(500)
        .create_async()
        .await;

    let fx = fixture(&server);
    assert_eq!(fx.client.delete("gone").await.unwrap(), DeleteOutcome::Deleted);
    assert_eq!(fx.client.delete("missing").await.unwrap(), DeleteOutcome::AlreadyGone);
    assert_eq!(fx.client.delete("broken").await.unwrap(), DeleteOutcome::Failed(500));
}

#[tokio::test]
async fn test_current_user_id_is_cached() {
    let mut server = mockito::Server::new_async().await;
    let users = server
        .mock("GET", "/users")
        .with_status(200)
        .with_body(r#"{"data":[{"id":"4321","login":"streamer"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let fx = fixture(&server);
    assert_eq!(fx.client.current_user_id().await.unwrap(), "4321");
    assert_eq!(fx.client.current_user_id().await.unwrap(), "4321");
    users.assert_async().await;
}

#[tokio::test]
async fn test_cleanup_all_deletes_every_listed_subscription() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/eventsub/subscriptions")
        .with_status(200)
        .with_body(
            json!({
                "data": [
                    subscription_json("sub-1", "channel.follow", "a"),
                    subscription_json("sub-2", "channel.follow", "b"),
                    subscription_json("sub-3", "channel.raid", "b")
                ],
                "pagination": {}
            })
            .to_string(),
        )
        .create_async()
        .await;
    let deletes = server
        .mock("DELETE", "/eventsub/subscriptions")
        .match_query(Matcher::Regex("id=sub-[12]".into()))
        .with_status(204)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("DELETE", "/eventsub/subscriptions")
        .match_query(Matcher::UrlEncoded("id".into(), "sub-3".into()))
        .with_status(404)
        .create_async()
        .await;

    let fx = fixture(&server);
    let report = cleanup_all(&fx.client).await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.deleted, 2);
    assert_eq!(report.already_gone, 1);
    assert!(report.is_clean());
    deletes.assert_async().await;
}

#[tokio::test]
async fn test_cleanup_session_only_touches_that_session() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/eventsub/subscriptions")
        .with_status(200)
        .with_body(
            json!({
                "data": [
                    subscription_json("mine", "channel.follow", "current"),
                    subscription_json("theirs", "channel.follow", "other")
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let mine = server
        .mock("DELETE", "/eventsub/subscriptions")
        .match_query(Matcher::UrlEncoded("id".into(), "mine".into()))
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    let theirs = server
        .mock("DELETE", "/eventsub/subscriptions")
        .match_query(Matcher::UrlEncoded("id".into(), "theirs".into()))
        .expect(0)
        .create_async()
        .await;

    let fx = fixture(&server);
    let report = cleanup_session(&fx.client, "current").await.unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, vec![("mine".to_string(), "status 500".to_string())]);
    mine.assert_async().await;
    theirs.assert_async().await;
}
