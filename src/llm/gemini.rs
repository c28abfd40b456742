use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, ZimuError};
use crate::llm::prompts::{line_array_schema, segment_transcription_prompt};
use crate::llm::{SegmentRequest, TranscriptionModel};
use crate::time::to_offset_string;

const VIDEO_MIME_TYPE: &str = "video/mp4";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Video {
        #[serde(rename = "fileData")]
        file_data: FileData,
        #[serde(rename = "videoMetadata")]
        video_metadata: VideoMetadata,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoMetadata {
    start_offset: String,
    end_offset: String,
    fps: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_json_schema: Value,
    media_resolution: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, like the SDK's `.text`.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        Some(text)
    }
}

/// Gemini `generateContent` over REST, with the video passed by URI.
pub struct GeminiModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    media_resolution: String,
}

impl GeminiModel {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        media_resolution: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            media_resolution,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request(&self, request: &SegmentRequest) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Video {
                        file_data: FileData {
                            mime_type: VIDEO_MIME_TYPE.to_string(),
                            file_uri: request.video_url.clone(),
                        },
                        video_metadata: VideoMetadata {
                            start_offset: to_offset_string(request.start_sec),
                            end_offset: to_offset_string(request.end_sec),
                            fps: request.fps,
                        },
                    },
                    Part::Text {
                        text: segment_transcription_prompt(request.start_sec),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_json_schema: line_array_schema(),
                media_resolution: self.media_resolution.clone(),
            },
        }
    }

    async fn send(&self, body: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let url = self.endpoint();
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {}: {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse Gemini generateContent response")
    }
}

#[async_trait]
impl TranscriptionModel for GeminiModel {
    async fn generate(&self, request: &SegmentRequest) -> Result<Value> {
        let body = self.build_request(request);
        let response = self.send(&body).await?;

        response
            .text()
            .map(Value::String)
            .ok_or_else(|| ZimuError::Api("No candidates in Gemini response".to_string()))
    }
}
