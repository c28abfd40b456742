use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::error::{Result, ZimuError};
use crate::server::protocol::{CacheStatus, ChunkRequest, ChunkResponse};
use crate::server::ChunkOrchestrator;

/// Where the scheduler gets segment transcripts from.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn fetch(&self, request: &ChunkRequest) -> Result<ChunkResponse>;
}

/// Talks to a running `zimu serve` over HTTP.
pub struct HttpChunkSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChunkSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        Self::new(
            config.server_url.as_str(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chunk", self.base_url)
    }

    /// Asks the server whether a window is cached, without computing it.
    pub async fn status(&self, request: &ChunkRequest) -> Result<CacheStatus> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[
                ("videoUrl", request.video_url.clone()),
                ("startSec", request.start_sec.to_string()),
                ("endSec", request.end_sec.to_string()),
                ("fps", request.fps.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        let body = check_body(status, body)?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn fetch(&self, request: &ChunkRequest) -> Result<ChunkResponse> {
        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).map_err(|_| {
            ZimuError::Api(format!("HTTP {}: unexpected response body", status))
        })?;
        let body = check_body(status, body)?;
        Ok(serde_json::from_value(body)?)
    }
}

/// Non-success statuses and bodies carrying an `error` field are failures.
fn check_body(status: reqwest::StatusCode, body: Value) -> Result<Value> {
    let error = body.get("error").and_then(Value::as_str).map(str::to_string);

    match error {
        Some(message) => Err(ZimuError::Api(message)),
        None if !status.is_success() => Err(ZimuError::Api(format!("HTTP {}", status.as_u16()))),
        None => Ok(body),
    }
}

/// Drives an orchestrator in the same process.
pub struct LocalChunkSource {
    orchestrator: ChunkOrchestrator,
}

impl LocalChunkSource {
    pub fn new(orchestrator: ChunkOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ChunkSource for LocalChunkSource {
    async fn fetch(&self, request: &ChunkRequest) -> Result<ChunkResponse> {
        self.orchestrator.handle(request.clone()).await
    }
}
