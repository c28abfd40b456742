pub mod gemini;
pub mod normalize;
pub mod prompts;
pub mod transcriber;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::settings::ModelConfig;
use crate::error::{Result, ZimuError};

pub use transcriber::{RetryPolicy, Transcriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
}

impl LlmProvider {
    pub fn from_provider(provider: &str) -> Option<Self> {
        match provider.to_lowercase().as_str() {
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

/// One unit of remote work: a time window of a video at a sampling rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRequest {
    pub video_url: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub fps: f64,
}

/// A generative model able to transcribe one video segment.
///
/// Implementations return the model's raw output: usually a JSON-ish string,
/// sometimes already structured. Interpretation is left to the normalizer.
#[async_trait]
pub trait TranscriptionModel: Send + Sync {
    async fn generate(&self, request: &SegmentRequest) -> Result<Value>;
}

pub fn build_model(config: &ModelConfig) -> Result<Arc<dyn TranscriptionModel>> {
    let provider = LlmProvider::from_provider(&config.provider).ok_or_else(|| {
        ZimuError::Config(format!("Unknown model provider: {}", config.provider))
    })?;

    match provider {
        LlmProvider::Gemini => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                ZimuError::Config(
                    "Gemini API key not configured (set GEMINI_API_KEY or model.api_key)"
                        .to_string(),
                )
            })?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| provider.base_url().to_string());
            Ok(Arc::new(gemini::GeminiModel::new(
                base_url,
                api_key,
                config.model.clone(),
                config.media_resolution.clone(),
                config.request_timeout_secs,
            )?))
        }
    }
}
