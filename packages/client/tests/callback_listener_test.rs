//! Integration tests for the loopback login callback listener

use reqwest::Url;
use stoop_client::auth::{CallbackListener, CallbackParams, spawn_callback_listener};
use tokio::sync::mpsc;

async fn start() -> (CallbackListener, mpsc::UnboundedReceiver<CallbackParams>) {
    let redirect_uri = Url::parse("http://127.0.0.1:0/callback").unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = spawn_callback_listener(&redirect_uri, tx).await.unwrap();
    (listener, rx)
}

#[tokio::test]
async fn test_redirect_parameters_are_forwarded() {
    // テスト項目: リダイレクトのクエリパラメータがイベントループへ転送される
    // given (前提条件):
    let (listener, mut rx) = start().await;
    let url = format!(
        "http://{}/callback?code=abc&state=xyz&session_state=ignored",
        listener.local_addr()
    );

    // when (操作):
    let resp = reqwest::get(&url).await.unwrap();

    // then (期待する結果):
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("Signed in"));
    let params = rx.recv().await.unwrap();
    assert_eq!(params.code.as_deref(), Some("abc"));
    assert_eq!(params.state.as_deref(), Some("xyz"));
}

#[tokio::test]
async fn test_post_logout_redirect_is_not_forwarded() {
    // テスト項目: パラメータのない (ログアウト後の) リダイレクトは転送されない
    // given (前提条件):
    let (listener, mut rx) = start().await;
    let url = format!("http://{}/callback", listener.local_addr());

    // when (操作):
    let resp = reqwest::get(&url).await.unwrap();

    // then (期待する結果):
    assert!(resp.text().await.unwrap().contains("Signed out"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_provider_error_is_forwarded() {
    // テスト項目: プロバイダーのエラー応答もそのまま転送される
    // given (前提条件):
    let (listener, mut rx) = start().await;
    let url = format!(
        "http://{}/callback?error=access_denied&state=xyz",
        listener.local_addr()
    );

    // when (操作):
    reqwest::get(&url).await.unwrap();

    // then (期待する結果):
    let params = rx.recv().await.unwrap();
    assert_eq!(params.error.as_deref(), Some("access_denied"));
    assert!(params.code.is_none());
}
