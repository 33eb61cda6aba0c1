//! Posts: REST client and query cache for the public posts API.
//!
//! ARCHITECTURE
//! ============
//! [`PostsApi`] is the transport seam: [`PostsClient`] speaks HTTP, tests
//! substitute an in-memory mock. [`PostsQuery`] sits on top and adds the
//! stale-time cache, the retry policy and optimistic list updates.

pub mod cache;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use cache::{PostsQuery, QueryConfig};

use crate::config::{HttpTimeouts, PostsConfig};
use crate::error::ErrorCode;

const USER_AGENT: &str = concat!("tiny-session/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub user_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub user_id: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PostsError {
    #[error("posts http client build failed: {0}")]
    HttpClientBuild(String),
    #[error("posts request failed: {0}")]
    Request(String),
    #[error("posts api returned {status}")]
    Status { status: u16 },
    #[error("posts response parse failed: {0}")]
    Parse(String),
}

impl ErrorCode for PostsError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::HttpClientBuild(_) => "E_POSTS_CLIENT_BUILD",
            Self::Request(_) => "E_POSTS_REQUEST",
            Self::Status { .. } => "E_POSTS_STATUS",
            Self::Parse(_) => "E_POSTS_PARSE",
        }
    }

    /// Client errors (4xx) are final; everything else may succeed later.
    fn retryable(&self) -> bool {
        match self {
            Self::Status { status } => !(400..500).contains(status),
            Self::Request(_) | Self::Parse(_) => true,
            Self::HttpClientBuild(_) => false,
        }
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[async_trait::async_trait]
pub trait PostsApi: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`PostsError`] on transport, status or decode failure.
    async fn list_posts(&self) -> Result<Vec<Post>, PostsError>;

    /// # Errors
    ///
    /// Returns [`PostsError::Status`] with 404 for an unknown id.
    async fn get_post(&self, id: u64) -> Result<Post, PostsError>;

    /// # Errors
    ///
    /// Returns a [`PostsError`] if the server did not accept the post.
    async fn create_post(&self, post: &NewPost) -> Result<Post, PostsError>;
}

pub struct PostsClient {
    http: reqwest::Client,
    base_url: String,
}

impl PostsClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &PostsConfig) -> Result<Self, PostsError> {
        let timeouts = HttpTimeouts::default();
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| PostsError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, PostsError> {
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(PostsError::Status { status });
        }
        let text = response.text().await.map_err(|e| PostsError::Request(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| PostsError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PostsApi for PostsClient {
    async fn list_posts(&self) -> Result<Vec<Post>, PostsError> {
        let url = format!("{}/posts", self.base_url);
        debug!(%url, "fetching posts");
        let response = self.http.get(&url).send().await.map_err(|e| PostsError::Request(e.to_string()))?;
        Self::decode(response).await
    }

    async fn get_post(&self, id: u64) -> Result<Post, PostsError> {
        let url = format!("{}/posts/{id}", self.base_url);
        debug!(%url, "fetching post");
        let response = self.http.get(&url).send().await.map_err(|e| PostsError::Request(e.to_string()))?;
        Self::decode(response).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, PostsError> {
        let url = format!("{}/posts", self.base_url);
        debug!(%url, "creating post");
        let response = self
            .http
            .post(&url)
            .json(post)
            .send()
            .await
            .map_err(|e| PostsError::Request(e.to_string()))?;
        Self::decode(response).await
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
