use serde::{Deserialize, Serialize};

use crate::transcript::TranscriptLine;

fn default_fps() -> f64 {
    1.0
}

/// Body of `POST /api/chunk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    pub video_url: String,
    #[serde(default)]
    pub start_sec: f64,
    pub end_sec: f64,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub force: bool,
}

impl ChunkRequest {
    pub fn new(video_url: impl Into<String>, start_sec: f64, end_sec: f64, fps: f64) -> Self {
        Self {
            video_url: video_url.into(),
            start_sec,
            end_sec,
            fps,
            force: false,
        }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub cached: bool,
    pub video_id: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub lines: Vec<TranscriptLine>,
}

/// Query of `GET /api/chunk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub video_url: String,
    pub start_sec: f64,
    pub end_sec: f64,
    #[serde(default = "default_fps")]
    pub fps: f64,
}

impl From<StatusQuery> for ChunkRequest {
    fn from(query: StatusQuery) -> Self {
        ChunkRequest::new(query.video_url, query.start_sec, query.end_sec, query.fps)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub cached: bool,
    pub video_id: String,
    pub start_sec: f64,
    pub end_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<TranscriptLine>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: ChunkRequest =
            serde_json::from_value(json!({"videoUrl": "https://youtu.be/abc", "endSec": 60}))
                .unwrap();
        assert_eq!(request.start_sec, 0.0);
        assert_eq!(request.fps, 1.0);
        assert!(!request.force);
    }

    #[test]
    fn test_request_requires_end() {
        let result: Result<ChunkRequest, _> =
            serde_json::from_value(json!({"videoUrl": "https://youtu.be/abc"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_status_omits_missing_lines() {
        let status = CacheStatus {
            cached: false,
            video_id: "abc".to_string(),
            start_sec: 0.0,
            end_sec: 60.0,
            lines: None,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["videoId"], "abc");
        assert!(value.get("lines").is_none());
    }
}
