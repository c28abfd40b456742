use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::transcript::DEFAULT_CHUNK_SECONDS;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZimuConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model provider: "gemini"
    #[serde(default = "default_provider")]
    pub provider: String,
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Override for the provider's REST endpoint
    pub base_url: Option<String>,
    #[serde(default = "default_media_resolution")]
    pub media_resolution: String,
    /// Attempts per segment, counting the first call
    #[serde(default = "default_model_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_model_backoff")]
    pub backoff_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model: default_model(),
            base_url: None,
            media_resolution: default_media_resolution(),
            max_attempts: default_model_attempts(),
            backoff_ms: default_model_backoff(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl From<&ModelConfig> for RetryPolicy {
    fn from(config: &ModelConfig) -> Self {
        RetryPolicy::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Base URL of a running `zimu serve`
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_chunk_seconds")]
    pub chunk_seconds: f64,
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Segment fetches allowed in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_scheduler_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_scheduler_backoff")]
    pub backoff_ms: u64,
    /// Per-request timeout for segment fetches; covers the server's own
    /// model retries
    #[serde(default = "default_segment_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            chunk_seconds: default_chunk_seconds(),
            fps: default_fps(),
            concurrency: default_concurrency(),
            max_attempts: default_scheduler_attempts(),
            backoff_ms: default_scheduler_backoff(),
            request_timeout_secs: default_segment_timeout(),
        }
    }
}

impl From<&SchedulerConfig> for RetryPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        RetryPolicy::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database
    pub database_path: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_media_resolution() -> String {
    "MEDIA_RESOLUTION_LOW".to_string()
}

fn default_model_attempts() -> u32 {
    3
}

fn default_model_backoff() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    120
}

fn default_segment_timeout() -> u64 {
    600
}

fn default_server_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_chunk_seconds() -> f64 {
    DEFAULT_CHUNK_SECONDS
}

fn default_fps() -> f64 {
    1.0
}

fn default_concurrency() -> usize {
    2
}

fn default_scheduler_attempts() -> u32 {
    3
}

fn default_scheduler_backoff() -> u64 {
    300
}
