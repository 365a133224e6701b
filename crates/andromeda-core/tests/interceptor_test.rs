#![allow(clippy::unwrap_used)]
// Auth interceptor tests: bearer attachment and the 401 refresh-retry.

use std::sync::Arc;

use andromeda_api::{ApiClient, ApiRequest, Error};
use andromeda_core::{
    AuthEvent, AuthInterceptor, MemoryStorage, SessionStorage, SessionStore, StorageKey,
};
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Interceptor over a session holding access `A1` and refresh `R1`.
async fn setup() -> (MockServer, AuthInterceptor) {
    let server = MockServer::start().await;
    let api = ApiClient::with_client(
        reqwest::Client::new(),
        Url::parse(&format!("{}/api/", server.uri())).unwrap(),
    );
    let storage = Arc::new(MemoryStorage::new());
    storage.store(StorageKey::AccessToken, "A1").unwrap();
    storage.store(StorageKey::RefreshToken, "R1").unwrap();
    let session = SessionStore::new(api, storage as Arc<dyn SessionStorage>);
    (server, AuthInterceptor::new(session))
}

async fn mount_refresh(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .and(body_json(json!({ "refresh": "R1" })))
        .respond_with(template)
        .expect(1)
        .mount(server)
        .await;
}

fn auth_header(request: &wiremock::Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .map(|v| v.to_str().unwrap().to_owned())
}

// ── Bearer attachment ───────────────────────────────────────────────

#[tokio::test]
async fn test_attaches_current_access_token() {
    let (server, interceptor) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/posts/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let body: serde_json::Value = interceptor
        .send_json(&ApiRequest::get("posts/"))
        .await
        .unwrap();
    assert_eq!(body, json!({ "results": [] }));
}

#[tokio::test]
async fn test_anonymous_request_has_no_bearer() {
    let (server, interceptor) = setup().await;
    interceptor.session().logout();
    Mock::given(method("GET"))
        .and(path("/api/posts/trending/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    interceptor
        .send(&ApiRequest::get("posts/trending/"))
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    let request = received
        .iter()
        .find(|r| r.url.path() == "/api/posts/trending/")
        .unwrap();
    assert_eq!(auth_header(request), None);
}

// ── Refresh and retry ───────────────────────────────────────────────

#[tokio::test]
async fn test_401_refreshes_and_retries_once() {
    let (server, interceptor) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Given token not valid for any token type"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "username": "ada" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "access": "A2" })),
    )
    .await;

    let user = interceptor.current_user().await.unwrap();

    assert_eq!(user.username, "ada");
    let session = interceptor.session();
    assert_eq!(session.access_token().unwrap().expose_secret(), "A2");
    assert_eq!(session.current_user().unwrap().id, 1);
}

#[tokio::test]
async fn test_failed_refresh_logs_out_and_returns_original_error() {
    let (server, interceptor) = setup().await;
    let mut events = interceptor.events();
    Mock::given(method("GET"))
        .and(path("/api/feed/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(401).set_body_json(json!({ "code": "token_not_valid" })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/blacklist/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = interceptor.send(&ApiRequest::get("feed/")).await.unwrap_err();

    match err {
        Error::Unauthorized { ref path } => assert_eq!(path, "feed/"),
        other => panic!("expected the original 401, got: {other:?}"),
    }
    assert!(!interceptor.session().is_authenticated());
    assert_eq!(events.try_recv().unwrap(), AuthEvent::LoginRequired);
}

#[tokio::test]
async fn test_second_401_is_not_retried_again() {
    let (server, interceptor) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/groups/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "access": "A2" })),
    )
    .await;

    let err = interceptor.send(&ApiRequest::get("groups/")).await.unwrap_err();

    assert!(err.is_unauthorized());
    let received = server.received_requests().await.unwrap();
    let bearers: Vec<_> = received
        .iter()
        .filter(|r| r.url.path() == "/api/groups/")
        .map(auth_header)
        .collect();
    assert_eq!(
        bearers,
        vec![Some("Bearer A1".to_owned()), Some("Bearer A2".to_owned())]
    );
}

#[tokio::test]
async fn test_refresh_endpoint_passes_through() {
    let (server, interceptor) = setup().await;
    mount_refresh(&server, ResponseTemplate::new(401)).await;

    let request = ApiRequest::post("auth/token/refresh/", json!({ "refresh": "R1" }));
    let err = interceptor.send(&request).await.unwrap_err();

    assert!(err.is_unauthorized());
    assert!(interceptor.session().is_authenticated());
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(auth_header(&received[0]), None);
}

#[tokio::test]
async fn test_other_errors_propagate_unchanged() {
    let (server, interceptor) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/marketplace/"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "detail": "You do not have permission to perform this action."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = interceptor
        .send(&ApiRequest::get("marketplace/"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Api { status: 403, .. }), "{err:?}");
    assert!(interceptor.session().is_authenticated());
}

// ── Typed helpers ───────────────────────────────────────────────────

#[tokio::test]
async fn test_notification_helpers() {
    let (server, interceptor) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/unread-count/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unread_count": 6 })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/mark-all-read/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(interceptor.unread_count().await.unwrap(), 6);
    interceptor.mark_all_notifications_read().await.unwrap();
}
