//! Chat backend HTTP API.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use crate::domain::{ChatMessage, Peer, UserId};
use crate::dto::{ChatMessageDto, UserDto};
use crate::error::ApiError;

/// Authenticated read endpoints of the chat backend
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /users`: currently connected users.
    async fn connected_users(&self, bearer: &str) -> Result<Vec<Peer>, ApiError>;

    /// `GET /messages/{local}/{peer}`: history between two users.
    async fn chat_history(
        &self,
        bearer: &str,
        local: &UserId,
        peer: &UserId,
    ) -> Result<Vec<ChatMessage>, ApiError>;
}

/// [`ChatApi`] over reqwest
pub struct HttpChatApi {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpChatApi {
    /// `base_url` must end with '/' (see `Cli::into_config`).
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn users_url(&self) -> Result<Url, ApiError> {
        self.base_url
            .join("users")
            .map_err(|e| ApiError::Url(e.to_string()))
    }

    pub fn history_url(&self, local: &UserId, peer: &UserId) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(format!("cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["messages", local.as_str(), peer.as_str()]);
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url, bearer: &str) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        tracing::debug!("GET {}", url);
        let resp = self.http.get(url).bearer_auth(bearer).send().await?;
        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            status if !status.is_success() => Err(ApiError::Status(status.as_u16())),
            _ => Ok(resp.json::<T>().await?),
        }
    }
}

/// Keep the entries that convert, logging the rest.
fn convert_all<D, T>(items: Vec<D>, what: &str) -> Vec<T>
where
    T: TryFrom<D>,
    T::Error: std::fmt::Display,
{
    items
        .into_iter()
        .filter_map(|item| match T::try_from(item) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Skipping invalid {}: {}", what, e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn connected_users(&self, bearer: &str) -> Result<Vec<Peer>, ApiError> {
        let users: Vec<UserDto> = self.get_json(self.users_url()?, bearer).await?;
        Ok(convert_all(users, "user"))
    }

    async fn chat_history(
        &self,
        bearer: &str,
        local: &UserId,
        peer: &UserId,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let url = self.history_url(local, peer)?;
        let messages: Vec<ChatMessageDto> = self.get_json(url, bearer).await?;
        Ok(convert_all(messages, "message"))
    }
}
