//! REST client for the chat backend: message history, channel directory and
//! user roster.

pub use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use teachat_types::api::{CreateChannelRequest, MessagePageQuery};
use teachat_types::{Channel, ChannelId, Message, User};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /messages/{channel_id}?limit=&offset=`, newest-first page.
    pub async fn fetch_messages(
        &self,
        channel_id: ChannelId,
        query: MessagePageQuery,
    ) -> Result<Vec<Message>, ApiError> {
        let url = format!("{}/messages/{}", self.base_url, channel_id);
        let request = self.http.get(&url).query(&query);
        self.execute(url, request).await
    }

    /// `GET /channels`
    pub async fn list_channels(&self) -> Result<Vec<Channel>, ApiError> {
        let url = format!("{}/channels", self.base_url);
        let request = self.http.get(&url);
        self.execute(url, request).await
    }

    /// `GET /users`, with presence.
    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let url = format!("{}/users", self.base_url);
        let request = self.http.get(&url);
        self.execute(url, request).await
    }

    /// `POST /channels`
    pub async fn create_channel(&self, name: &str) -> Result<Channel, ApiError> {
        let url = format!("{}/channels", self.base_url);
        let body = CreateChannelRequest {
            name: name.to_string(),
            description: None,
        };
        let request = self.http.post(&url).json(&body);
        self.execute(url, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        url: String,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        debug!("REST {}", url);
        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => return Err(ApiError::Transport { url, source }),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { url, status });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::Decode { url, source })
    }
}
