//! Loopback listener for the identity provider's redirect back.
//!
//! Serves the path of the configured redirect URI and forwards the query
//! parameters to the event loop.

use axum::{
    Router,
    extract::{Query, State},
    response::Html,
    routing::get,
};
use reqwest::Url;
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tower_http::trace::TraceLayer;

use crate::error::AuthError;

use super::session::CallbackParams;

const LOGIN_COMPLETE_PAGE: &str =
    "<html><body><p>Signed in to Stoop. You can return to the terminal.</p></body></html>";
const SIGNED_OUT_PAGE: &str =
    "<html><body><p>Signed out of Stoop. You can close this window.</p></body></html>";

#[derive(Clone)]
struct CallbackState {
    tx: mpsc::UnboundedSender<CallbackParams>,
}

/// Running callback listener; stops when dropped
pub struct CallbackListener {
    local_addr: std::net::SocketAddr,
    handle: JoinHandle<()>,
}

impl CallbackListener {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    if params.is_empty() {
        tracing::debug!("Redirect without login parameters (post-logout)");
        return Html(SIGNED_OUT_PAGE);
    }
    tracing::info!("Handling identity provider redirect callback...");
    if state.tx.send(params).is_err() {
        tracing::warn!("Callback received after the client stopped");
    }
    Html(LOGIN_COMPLETE_PAGE)
}

/// Build the callback router for a redirect path.
pub fn create_router(path: &str, tx: mpsc::UnboundedSender<CallbackParams>) -> Router {
    Router::new()
        .route(path, get(handle_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(CallbackState { tx })
}

/// Bind the redirect URI's host and port and start serving.
pub async fn spawn_callback_listener(
    redirect_uri: &Url,
    tx: mpsc::UnboundedSender<CallbackParams>,
) -> Result<CallbackListener, AuthError> {
    let host = redirect_uri
        .host_str()
        .ok_or_else(|| AuthError::Callback(format!("redirect URI has no host: {redirect_uri}")))?;
    let port = redirect_uri
        .port_or_known_default()
        .ok_or_else(|| AuthError::Callback(format!("redirect URI has no port: {redirect_uri}")))?;

    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|e| AuthError::Callback(format!("cannot listen on {host}:{port}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| AuthError::Callback(e.to_string()))?;
    let router = create_router(redirect_uri.path(), tx);

    tracing::info!("Listening for login callbacks on {}", local_addr);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("Callback listener stopped: {}", e);
        }
    });

    Ok(CallbackListener { local_addr, handle })
}
