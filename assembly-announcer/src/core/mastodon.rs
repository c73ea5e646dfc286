/*!
Minimal Mastodon REST client
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::core::config::MastodonConfig;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Direct,
}

/// A status to publish
#[derive(Debug, Clone, Serialize)]
pub struct Toot {
    pub status: String,
    pub sensitive: bool,
    pub visibility: Visibility,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Toot {
    pub fn new(status: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            status: status.into(),
            sensitive: false,
            visibility,
            language: "de".to_string(),
            in_reply_to_id: None,
            scheduled_at: None,
        }
    }
}

/// Answer to a post: a status, or a scheduled status when `scheduled_at` was set
#[derive(Debug, Clone, Deserialize)]
pub struct PostedStatus {
    pub id: String,
    #[serde(default)]
    pub scheduled_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub acct: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
    pub account: Account,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

/// Credentials returned when registering an application
#[derive(Debug, Clone, Deserialize)]
pub struct Application {
    pub client_id: String,
    pub client_secret: String,
}

/// Operations the announcer needs from a Mastodon server
#[async_trait]
pub trait SocialClient: Send + Sync {
    async fn post_status(&self, toot: &Toot) -> Result<PostedStatus, ClientError>;

    async fn notifications(&self, limit: u32) -> Result<Vec<Notification>, ClientError>;

    async fn favourite(&self, status_id: &str) -> Result<Status, ClientError>;

    async fn dismiss_notification(&self, notification_id: &str) -> Result<(), ClientError>;

    async fn clear_notifications(&self) -> Result<(), ClientError>;
}

pub struct MastodonClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl MastodonClient {
    pub fn new(config: &MastodonConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            base_url: config.server.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http,
        })
    }

    /// Register a new application on the configured server
    pub async fn register_app(&self, config: &MastodonConfig) -> Result<Application, ClientError> {
        let scopes = if config.scopes.is_empty() { "read write" } else { &config.scopes };
        let redirect_uris = if config.redirect_uri.is_empty() {
            "urn:ietf:wg:oauth:2.0:oob"
        } else {
            &config.redirect_uri
        };

        let body = serde_json::json!({
            "client_name": config.client_name,
            "redirect_uris": redirect_uris,
            "scopes": scopes,
            "website": config.website,
        });

        let response = self.http.post(self.url("/api/v1/apps")).json(&body).send().await?;
        handle_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_empty(&self, path: &str) -> Result<(), ClientError> {
        let response = self.http.post(self.url(path)).bearer_auth(&self.token).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SocialClient for MastodonClient {
    async fn post_status(&self, toot: &Toot) -> Result<PostedStatus, ClientError> {
        let response = self
            .http
            .post(self.url("/api/v1/statuses"))
            .bearer_auth(&self.token)
            .json(toot)
            .send()
            .await?;
        handle_response(response).await
    }

    async fn notifications(&self, limit: u32) -> Result<Vec<Notification>, ClientError> {
        let response = self
            .http
            .get(self.url("/api/v1/notifications"))
            .bearer_auth(&self.token)
            .query(&[("limit", limit)])
            .send()
            .await?;
        handle_response(response).await
    }

    async fn favourite(&self, status_id: &str) -> Result<Status, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/api/v1/statuses/{}/favourite", status_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        handle_response(response).await
    }

    async fn dismiss_notification(&self, notification_id: &str) -> Result<(), ClientError> {
        self.post_empty(&format!("/api/v1/notifications/{}/dismiss", notification_id))
            .await
    }

    async fn clear_notifications(&self) -> Result<(), ClientError> {
        self.post_empty("/api/v1/notifications/clear").await
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}
