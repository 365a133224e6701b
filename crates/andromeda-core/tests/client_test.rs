#![allow(clippy::unwrap_used)]
// Client facade tests: wiremock for REST, the in-memory connector for
// realtime channels.

mod common;

use std::sync::Arc;
use std::time::Duration;

use andromeda_api::ApiRequest;
use andromeda_core::{
    ChannelState, Client, ClientConfig, Credentials, MemoryStorage, SessionStorage, StorageKey,
};
use common::MemoryConnector;
use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

fn client(
    server: &MockServer,
    storage: Arc<MemoryStorage>,
) -> (Client<MemoryConnector>, MemoryConnector) {
    let config = ClientConfig::new(
        Url::parse(&format!("{}/api/", server.uri())).unwrap(),
        Url::parse("ws://test.local/ws/").unwrap(),
    );
    let connector = MemoryConnector::new();
    let client = Client::with_connector(
        config,
        storage as Arc<dyn SessionStorage>,
        connector.clone(),
    )
    .unwrap();
    (client, connector)
}

fn restored_storage() -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage.store(StorageKey::AccessToken, "A1").unwrap();
    storage.store(StorageKey::RefreshToken, "R1").unwrap();
    storage
}

async fn mount_unread(server: &MockServer, count: u64) {
    Mock::given(method("GET"))
        .and(path("/api/notifications/unread-count/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unread_count": count })))
        .mount(server)
        .await;
}

async fn mount_blacklist(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/token/blacklist/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn wait_notifications(client: &Client<MemoryConnector>, state: ChannelState) {
    let mut rx = client.realtime().watch_notification_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .unwrap()
        .unwrap();
}

// ── Startup ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_with_restored_session() {
    let server = MockServer::start().await;
    mount_unread(&server, 3).await;
    let (client, connector) = client(&server, restored_storage());

    client.start().await;
    let socket = connector.accept().await;

    assert_eq!(socket.url.path(), "/ws/notifications/");
    assert_eq!(client.realtime().unread_count(), 3);
    wait_notifications(&client, ChannelState::Open).await;
}

#[tokio::test]
async fn test_start_logged_out_stays_idle() {
    let server = MockServer::start().await;
    let (client, connector) = client(&server, Arc::new(MemoryStorage::new()));

    client.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(connector.attempts().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Login / logout ──────────────────────────────────────────────────

#[tokio::test]
async fn test_login_connects_and_logout_disconnects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access": "A1", "refresh": "R1" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "username": "ada" })),
        )
        .mount(&server)
        .await;
    mount_unread(&server, 2).await;
    mount_blacklist(&server).await;
    let (client, connector) = client(&server, Arc::new(MemoryStorage::new()));
    client.start().await;

    let credentials = Credentials::new("ada", SecretString::from("engine".to_owned()));
    client.login(&credentials).await.unwrap();
    let _socket = connector.accept().await;
    wait_notifications(&client, ChannelState::Open).await;
    assert_eq!(client.realtime().unread_count(), 2);

    client.logout();

    assert_eq!(client.realtime().notification_state(), ChannelState::Closed);
    assert!(!client.session().is_authenticated());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.attempts().len(), 1);
}

#[tokio::test]
async fn test_login_over_existing_session_reconnects_with_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access": "B2", "refresh": "R2" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 2, "username": "bob" })),
        )
        .mount(&server)
        .await;
    mount_unread(&server, 1).await;
    let (client, connector) = client(&server, restored_storage());
    client.start().await;
    let mut first = connector.accept().await;
    wait_notifications(&client, ChannelState::Open).await;
    client.realtime().connect_chat(4);
    let mut chat = connector.accept().await;
    assert_eq!(first.url.query(), Some("token=A1"));

    let credentials = Credentials::new("bob", SecretString::from("builder".to_owned()));
    let session = client.login(&credentials).await.unwrap();
    let second = connector.accept().await;

    assert_eq!(session.access_token.expose_secret(), "B2");
    assert_eq!(second.url.path(), "/ws/notifications/");
    assert_eq!(second.url.query(), Some("token=B2"));
    assert_eq!(first.from_client.recv().await, None);
    assert_eq!(chat.from_client.recv().await, None);
    assert_eq!(client.realtime().chat_state(), ChannelState::Closed);
    wait_notifications(&client, ChannelState::Open).await;
    assert_eq!(connector.attempts().len(), 3);
}

#[tokio::test]
async fn test_repeated_start_opens_one_channel() {
    let server = MockServer::start().await;
    mount_unread(&server, 0).await;
    mount_blacklist(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/friends/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let (client, connector) = client(&server, restored_storage());

    client.start().await;
    client.clone().start().await;
    let _socket = connector.accept().await;
    wait_notifications(&client, ChannelState::Open).await;

    let _ = client.interceptor().send(&ApiRequest::get("friends/")).await;
    wait_notifications(&client, ChannelState::Closed).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.attempts().len(), 1);
}

#[tokio::test]
async fn test_unrecoverable_401_closes_channels() {
    let server = MockServer::start().await;
    mount_unread(&server, 0).await;
    mount_blacklist(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/friends/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let (client, connector) = client(&server, restored_storage());
    client.start().await;
    let _socket = connector.accept().await;
    wait_notifications(&client, ChannelState::Open).await;

    let err = client
        .interceptor()
        .send(&ApiRequest::get("friends/"))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    wait_notifications(&client, ChannelState::Closed).await;
    assert!(!client.session().is_authenticated());
}

// ── Unread counter ──────────────────────────────────────────────────

#[tokio::test]
async fn test_mark_all_read_zeroes_counter() {
    let server = MockServer::start().await;
    mount_unread(&server, 5).await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/mark-all-read/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let (client, _connector) = client(&server, restored_storage());

    assert_eq!(client.sync_unread_count().await.unwrap(), 5);
    assert_eq!(client.realtime().unread_count(), 5);

    client.mark_all_notifications_read().await.unwrap();
    assert_eq!(client.realtime().unread_count(), 0);

    client.realtime().reset_unread(4);
    client.notifications_viewed();
    assert_eq!(client.realtime().unread_count(), 0);
}
