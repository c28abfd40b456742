use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use backon::Retryable;

use crate::error::{Result, ZimuError};
use crate::llm::normalize::normalize_response;
use crate::llm::{SegmentRequest, TranscriptionModel};
use crate::transcript::TranscriptLine;

pub use crate::retry::RetryPolicy;

/// Calls the model for one segment and normalizes its output, retrying
/// errors and empty results.
///
/// After the last attempt an error is propagated, while an empty result is
/// returned as-is: "could not reach the model" and "the model had nothing to
/// say" stay distinguishable. No caching happens here.
#[derive(Clone)]
pub struct Transcriber {
    model: Arc<dyn TranscriptionModel>,
    policy: RetryPolicy,
}

/// Why one attempt did not produce lines.
#[derive(Debug)]
enum AttemptError {
    Empty,
    Failed(ZimuError),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty result"),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl Transcriber {
    pub fn new(model: Arc<dyn TranscriptionModel>, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    async fn generate_once(
        &self,
        request: &SegmentRequest,
    ) -> std::result::Result<Vec<TranscriptLine>, AttemptError> {
        let raw = self
            .model
            .generate(request)
            .await
            .map_err(AttemptError::Failed)?;

        let normalized = normalize_response(&raw, request.start_sec);
        if normalized.discarded > 0 {
            tracing::info!(
                start = request.start_sec,
                end = request.end_sec,
                kept = normalized.lines.len(),
                discarded = normalized.discarded,
                "Dropped malformed candidate lines"
            );
        }

        if normalized.lines.is_empty() {
            Err(AttemptError::Empty)
        } else {
            Ok(normalized.lines)
        }
    }

    pub async fn generate_segment(&self, request: &SegmentRequest) -> Result<Vec<TranscriptLine>> {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let outcome = (move || {
            counter.fetch_add(1, Ordering::Relaxed);
            self.generate_once(request)
        })
        .retry(self.policy)
        .notify(|err, delay| {
            tracing::warn!(
                start = request.start_sec,
                end = request.end_sec,
                retry_delay_ms = delay.as_millis() as u64,
                "Segment attempt failed, retrying: {}",
                err
            );
        })
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match outcome {
            Ok(lines) => {
                if attempts > 1 {
                    tracing::info!(
                        "Segment {}-{} succeeded after attempt {}",
                        request.start_sec,
                        request.end_sec,
                        attempts
                    );
                }
                Ok(lines)
            }
            Err(AttemptError::Empty) => {
                tracing::warn!(
                    "Segment {}-{} still empty after {} attempts",
                    request.start_sec,
                    request.end_sec,
                    attempts
                );
                Ok(Vec::new())
            }
            Err(AttemptError::Failed(e)) => Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted model: pops one response per call, repeating the last one.
    pub(crate) struct ScriptedModel {
        responses: Mutex<VecDeque<std::result::Result<Value, String>>>,
        last: Mutex<Option<std::result::Result<Value, String>>>,
        pub calls: AtomicUsize,
        pub delay: Duration,
    }

    impl ScriptedModel {
        pub(crate) fn new(responses: Vec<std::result::Result<Value, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranscriptionModel for ScriptedModel {
        async fn generate(&self, _request: &SegmentRequest) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = {
                let mut queue = self.responses.lock().unwrap();
                let mut last = self.last.lock().unwrap();
                match queue.pop_front() {
                    Some(r) => {
                        *last = Some(r.clone());
                        r
                    }
                    None => last.clone().unwrap_or_else(|| Ok(json!([]))),
                }
            };
            next.map_err(ZimuError::Api)
        }
    }

    pub(crate) fn two_lines() -> Value {
        Value::String(
            r#"[{"start":"2.500","end":"4.000","transcription":"你好","pinyin":"nǐ hǎo","meaning":"hello"},
                {"start":"5.000","end":"6.000","transcription":"谢谢","pinyin":"xièxie","meaning":"thanks"}]"#
                .to_string(),
        )
    }

    fn request(start: f64, end: f64) -> SegmentRequest {
        SegmentRequest {
            video_url: "https://youtu.be/vvHuHgfxc7o".to_string(),
            start_sec: start,
            end_sec: end,
            fps: 1.0,
        }
    }

    fn fast(model: Arc<ScriptedModel>) -> Transcriber {
        Transcriber::new(model, RetryPolicy::new(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(two_lines())]));
        let lines = fast(model.clone())
            .generate_segment(&request(60.0, 120.0))
            .await
            .unwrap();

        assert_eq!(model.calls(), 1);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].start, "62.500");
        assert_eq!(lines[0].end, "64.000");
    }

    #[tokio::test]
    async fn test_retries_empty_then_succeeds() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(json!("[]")),
            Ok(json!("garbage")),
            Ok(two_lines()),
        ]));
        let lines = fast(model.clone())
            .generate_segment(&request(0.0, 60.0))
            .await
            .unwrap();

        assert_eq!(model.calls(), 3);
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_retries_error_then_succeeds() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err("503 unavailable".to_string()),
            Ok(two_lines()),
        ]));
        let lines = fast(model.clone())
            .generate_segment(&request(0.0, 60.0))
            .await
            .unwrap();

        assert_eq!(model.calls(), 2);
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_persistent_empty_returns_empty() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(json!([]))]));
        let lines = fast(model.clone())
            .generate_segment(&request(0.0, 60.0))
            .await
            .unwrap();

        assert_eq!(model.calls(), 3);
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_error_propagates() {
        let model = Arc::new(ScriptedModel::new(vec![Err("quota exceeded".to_string())]));
        let result = fast(model.clone())
            .generate_segment(&request(0.0, 60.0))
            .await;

        assert_eq!(model.calls(), 3);
        match result {
            Err(ZimuError::Api(message)) => assert_eq!(message, "quota exceeded"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_then_error_propagates_error() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(json!([])),
            Ok(json!([])),
            Err("boom".to_string()),
        ]));
        let result = fast(model.clone())
            .generate_segment(&request(0.0, 60.0))
            .await;
        assert!(result.is_err());
    }
}
