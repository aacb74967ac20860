use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::PublisherConfig;

/// Fixed per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const REST_PREFIX: &str = "wp-json/wp/v2";

/// Why a single delivery attempt failed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to reach WordPress: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("WordPress request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("WordPress returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to encode post body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PublishError::Timeout(err)
        } else {
            PublishError::Transport(err)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Publish,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: Value,
}

/// Body of the post created for one state update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishRequest {
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<MetaEntry>,
}

impl PublishRequest {
    pub fn build(entity_id: &str, new_state: &str, custom_fields: &Map<String, Value>) -> Self {
        let meta = custom_fields
            .iter()
            .map(|(key, value)| MetaEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        Self {
            title: format!("Sensor Update: {entity_id}"),
            content: format!("New state: {new_state}"),
            status: PostStatus::Publish,
            meta,
        }
    }
}

/// REST collection URL for `post_type` on the site at `base_url`.
///
/// Exactly one trailing slash is trimmed from the base URL, and one leading and
/// one trailing slash from the post type.
pub fn endpoint(base_url: &str, post_type: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    let post_type = post_type.strip_prefix('/').unwrap_or(post_type);
    let post_type = post_type.strip_suffix('/').unwrap_or(post_type);
    format!("{base}/{REST_PREFIX}/{post_type}")
}

#[async_trait]
pub trait WordPressService: Send + Sync {
    /// Create one post. Returns the new post id when the response carries one.
    async fn create_post(&self, request: &PublishRequest) -> Result<Option<u64>, PublishError>;
}

#[derive(Clone)]
pub struct WordPressClient {
    http: Client,
    endpoint: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl fmt::Debug for WordPressClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordPressClient")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl WordPressClient {
    pub fn from_config(cfg: &PublisherConfig) -> Result<Self, PublishError> {
        Self::with_timeout(cfg, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(cfg: &PublisherConfig, timeout: Duration) -> Result<Self, PublishError> {
        let http = Client::builder()
            .user_agent("wp-publisher/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint(&cfg.base_url, &cfg.post_type),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn build_request(&self, body: &PublishRequest) -> Result<reqwest::Request, PublishError> {
        let payload = serde_json::to_vec(body)?;
        let request = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl WordPressService for WordPressClient {
    async fn create_post(&self, request: &PublishRequest) -> Result<Option<u64>, PublishError> {
        let http_request = self.build_request(request)?;
        debug!(url = %http_request.url(), title = %request.title, "sending WordPress request");

        let res = self.http.execute(http_request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %body, "WordPress rejected post");
            return Err(PublishError::Status { status, body });
        }

        let body = res.text().await?;
        debug!(%status, %body, "WordPress accepted post");
        Ok(serde_json::from_str::<CreatedPost>(&body).ok().map(|p| p.id))
    }
}

#[derive(Deserialize)]
struct CreatedPost {
    id: u64,
}
