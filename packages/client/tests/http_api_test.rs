//! Integration tests for the chat HTTP API client
//!
//! Each test serves a small in-process backend on a random local port.

use axum::{
    Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::get,
};
use reqwest::Url;
use serde_json::{Value, json};
use stoop_client::api::{ChatApi, HttpChatApi};
use stoop_client::domain::UserId;
use stoop_client::error::ApiError;
use tokio::{net::TcpListener, task::JoinHandle};

const TOKEN: &str = "token-U1";

/// Backend served for the duration of a test
struct TestBackend {
    base_url: Url,
    handle: JoinHandle<()>,
}

impl TestBackend {
    async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            base_url: Url::parse(&format!("http://{addr}/")).unwrap(),
            handle,
        }
    }

    fn api(&self) -> HttpChatApi {
        HttpChatApi::new(reqwest::Client::new(), self.base_url.clone())
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn users(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!([
        {"id": "U1", "username": "alice", "firstName": "Alice", "lastName": "A", "status": "ONLINE"},
        {"id": "U2", "username": "bob", "status": "ONLINE"},
        {"id": "", "username": "ghost"}
    ])))
}

async fn history(
    headers: HeaderMap,
    Path((local, peer)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if (local.as_str(), peer.as_str()) != ("U1", "U2") {
        return Ok(Json(json!([])));
    }
    Ok(Json(json!([
        {"id": "m1", "chatId": "U1_U2", "senderId": "U1", "recipientId": "U2",
         "content": "hi", "timestamp": "2024-05-01T10:00:00.000+00:00"},
        {"id": "m2", "chatId": "U1_U2", "senderId": "U2", "recipientId": "U1",
         "content": "hello", "timestamp": 1714557660000_i64}
    ])))
}

fn backend_router() -> Router {
    Router::new()
        .route("/users", get(users))
        .route("/messages/{local}/{peer}", get(history))
}

#[tokio::test]
async fn test_connected_users_skips_invalid_entries() {
    // テスト項目: /users の応答が Peer に変換され、ID の無いエントリは除外される
    // given (前提条件):
    let backend = TestBackend::start(backend_router()).await;

    // when (操作):
    let peers = backend.api().connected_users(TOKEN).await.unwrap();

    // then (期待する結果):
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].display_name, "Alice A");
    assert_eq!(peers[1].username, "bob");
    assert_eq!(peers[1].display_name, "bob");
}

#[tokio::test]
async fn test_chat_history_in_server_order() {
    // テスト項目: 履歴がサーバーの順序のまま取得され、両方の時刻形式が解釈される
    // given (前提条件):
    let backend = TestBackend::start(backend_router()).await;
    let local = UserId::new("U1").unwrap();
    let peer = UserId::new("U2").unwrap();

    // when (操作):
    let messages = backend
        .api()
        .chat_history(TOKEN, &local, &peer)
        .await
        .unwrap();

    // then (期待する結果):
    let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi", "hello"]);
    assert!(messages.iter().all(|m| m.sent_at.is_some()));
    assert_eq!(messages[1].sender, peer);
}

#[tokio::test]
async fn test_wrong_token_is_unauthorized() {
    // テスト項目: 401 応答は ApiError::Unauthorized になる
    // given (前提条件):
    let backend = TestBackend::start(backend_router()).await;

    // when (操作):
    let result = backend.api().connected_users("stale").await;

    // then (期待する結果):
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_server_error_keeps_status() {
    // テスト項目: 401 以外の失敗ステータスはステータスコード付きのエラーになる
    // given (前提条件):
    let router = Router::new().route(
        "/users",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let backend = TestBackend::start(router).await;

    // when (操作):
    let result = backend.api().connected_users(TOKEN).await;

    // then (期待する結果):
    assert!(matches!(result, Err(ApiError::Status(500))));
}
