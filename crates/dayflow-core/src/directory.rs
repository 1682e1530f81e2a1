//! User directory: user records and task storage behind the backend API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GatewayError;
use crate::session::SessionId;
use crate::storage::DirectoryConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub google_refresh_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl UserRecord {
    /// Refresh token, empty when the user never linked a calendar.
    pub fn refresh_token(&self) -> &str {
        self.google_refresh_token.as_deref().unwrap_or_default()
    }
}

/// A task as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub user_id: String,
    pub name: String,
    /// Minutes.
    pub duration: u32,
    /// `MMDD`.
    pub deadline: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` when the user is unknown.
    async fn user(&self, id: &SessionId) -> Result<Option<UserRecord>, GatewayError>;

    async fn add_task(&self, task: &TaskRecord) -> Result<(), GatewayError>;
}

/// Backend REST client.
pub struct HttpUserDirectory {
    client: Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn user(&self, id: &SessionId) -> Result<Option<UserRecord>, GatewayError> {
        let url = format!("{}/users/telegram/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(session = %id, "user not found in directory");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(GatewayError::Api(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }
        Ok(Some(response.json().await?))
    }

    async fn add_task(&self, task: &TaskRecord) -> Result<(), GatewayError> {
        let url = format!("{}/tasks", self.base_url);
        let response = self.client.post(&url).json(task).send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::Api(format!(
                "POST {url} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
