use crate::automation::schema::{AutomationRequest, AutomationStatus, LaunchAck};
use crate::config::BackendConfig;
use crate::error::{PilotError, Result};
use async_trait::async_trait;
use std::time::Duration;

pub const START_PATH: &str = "/torrent-automation/start-automation";
pub const STATUS_PATH: &str = "/torrent-automation/automation-status";

/// The two backend calls the panel depends on.
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    async fn start_automation(&self, request: &AutomationRequest) -> Result<LaunchAck>;
    async fn automation_status(&self) -> Result<AutomationStatus>;
}

/// `AutomationBackend` over HTTP.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PilotError::Backend(error_message(status, &body)));
        }
        Ok(response.json::<T>().await?)
    }
}

/// Pull a human message out of an error body: `detail`, then `error`, then `message`.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body).ok().and_then(|json| {
        ["detail", "error", "message"]
            .iter()
            .find_map(|key| match json.get(*key)? {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
    });

    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => format!("HTTP {}: {}", status.as_u16(), body.trim()),
        None => format!("HTTP {}", status),
    }
}

#[async_trait]
impl AutomationBackend for BackendClient {
    async fn start_automation(&self, request: &AutomationRequest) -> Result<LaunchAck> {
        let url = self.endpoint(START_PATH);
        tracing::info!("Starting automation via {}", url);
        let response = self.authorize(self.http.post(&url).json(request)).send().await?;
        Self::decode(response).await
    }

    async fn automation_status(&self) -> Result<AutomationStatus> {
        let url = self.endpoint(STATUS_PATH);
        let response = self.authorize(self.http.get(&url)).send().await?;
        Self::decode(response).await
    }
}
