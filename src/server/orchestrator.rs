use std::sync::Arc;

use crate::error::{Result, ZimuError};
use crate::llm::{SegmentRequest, Transcriber};
use crate::server::cache::{Lookup, SegmentCache};
use crate::server::protocol::{CacheStatus, ChunkRequest, ChunkResponse};
use crate::transcript::CacheKey;
use crate::video::extract_video_id;

pub const MAX_FPS: f64 = 10.0;

/// Serves one segment at a time: cache first, then any pending computation
/// for the same key, then a fresh model call.
#[derive(Clone)]
pub struct ChunkOrchestrator {
    cache: Arc<SegmentCache>,
    transcriber: Transcriber,
}

impl ChunkOrchestrator {
    pub fn new(cache: Arc<SegmentCache>, transcriber: Transcriber) -> Self {
        Self { cache, transcriber }
    }

    pub fn cache(&self) -> &Arc<SegmentCache> {
        &self.cache
    }

    pub async fn handle(&self, request: ChunkRequest) -> Result<ChunkResponse> {
        validate(&request)?;

        let video_id = extract_video_id(&request.video_url);
        let key = CacheKey::new(&video_id, request.start_sec, request.end_sec, request.fps);

        let (lines, cached) = match self.cache.lookup(&key, request.force) {
            Lookup::Hit(lines) => {
                tracing::debug!(%key, "Segment cache hit");
                (lines, true)
            }
            Lookup::Joined(waiter) => {
                tracing::info!(%key, "Joining in-flight segment computation");
                (waiter.wait().await?, !request.force)
            }
            Lookup::Started(completion, waiter) => {
                tracing::info!(%key, force = request.force, "Starting segment computation");
                let transcriber = self.transcriber.clone();
                let segment = SegmentRequest {
                    video_url: request.video_url.clone(),
                    start_sec: request.start_sec,
                    end_sec: request.end_sec,
                    fps: request.fps,
                };

                // Detached so a disconnected caller never cancels the model call.
                tokio::spawn(async move {
                    let outcome = transcriber
                        .generate_segment(&segment)
                        .await
                        .map_err(|e| e.to_string());
                    if let Err(e) = &outcome {
                        tracing::warn!(key = %completion.key(), "Segment computation failed: {}", e);
                    }
                    completion.finish(outcome);
                });

                (waiter.wait().await?, false)
            }
        };

        Ok(ChunkResponse {
            cached,
            video_id,
            start_sec: request.start_sec,
            end_sec: request.end_sec,
            lines,
        })
    }

    /// Reports cache state for a window without starting any work.
    pub fn status(&self, request: &ChunkRequest) -> Result<CacheStatus> {
        validate(request)?;

        let video_id = extract_video_id(&request.video_url);
        let key = CacheKey::new(&video_id, request.start_sec, request.end_sec, request.fps);
        let lines = self.cache.get(&key);

        Ok(CacheStatus {
            cached: lines.is_some(),
            video_id,
            start_sec: request.start_sec,
            end_sec: request.end_sec,
            lines,
        })
    }
}

pub fn validate(request: &ChunkRequest) -> Result<()> {
    if url::Url::parse(&request.video_url).is_err() {
        return Err(ZimuError::Validation(format!(
            "videoUrl must be a valid URL, got {:?}",
            request.video_url
        )));
    }
    if !request.start_sec.is_finite() || request.start_sec < 0.0 {
        return Err(ZimuError::Validation(
            "startSec must be a non-negative number".to_string(),
        ));
    }
    if !request.end_sec.is_finite() || request.end_sec <= 0.0 {
        return Err(ZimuError::Validation(
            "endSec must be a positive number".to_string(),
        ));
    }
    if request.end_sec <= request.start_sec {
        return Err(ZimuError::Validation(
            "endSec must be greater than startSec".to_string(),
        ));
    }
    if !(request.fps > 0.0 && request.fps <= MAX_FPS) {
        return Err(ZimuError::Validation(format!(
            "fps must be in (0, {}]",
            MAX_FPS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::transcriber::tests::{two_lines, ScriptedModel};
    use crate::llm::RetryPolicy;
    use std::time::Duration;

    const URL: &str = "https://www.youtube.com/watch?v=kE3335DxlEw";

    fn orchestrator(model: Arc<ScriptedModel>) -> ChunkOrchestrator {
        let transcriber = Transcriber::new(model, RetryPolicy::new(3, Duration::from_millis(1)));
        ChunkOrchestrator::new(Arc::new(SegmentCache::in_memory()), transcriber)
    }

    #[tokio::test]
    async fn test_second_call_is_cached() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(two_lines())]));
        let orchestrator = orchestrator(model.clone());

        let first = orchestrator
            .handle(ChunkRequest::new(URL, 60.0, 120.0, 1.0))
            .await
            .unwrap();
        let second = orchestrator
            .handle(ChunkRequest::new(URL, 60.0, 120.0, 1.0))
            .await
            .unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.lines, second.lines);
        assert_eq!(first.video_id, "kE3335DxlEw");
        assert_eq!(first.lines[0].start, "62.500");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_coalesce() {
        let model = Arc::new(
            ScriptedModel::new(vec![Ok(two_lines())]).with_delay(Duration::from_millis(50)),
        );
        let orchestrator = orchestrator(model.clone());

        let (a, b) = tokio::join!(
            orchestrator.handle(ChunkRequest::new(URL, 0.0, 60.0, 1.0)),
            orchestrator.handle(ChunkRequest::new(URL, 0.0, 60.0, 1.0)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(model.calls(), 1);
        assert_eq!(a.lines, b.lines);
        assert!(a.cached != b.cached);
    }

    #[tokio::test]
    async fn test_force_recomputes() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(two_lines())]));
        let orchestrator = orchestrator(model.clone());

        orchestrator
            .handle(ChunkRequest::new(URL, 0.0, 60.0, 1.0))
            .await
            .unwrap();
        let forced = orchestrator
            .handle(ChunkRequest::new(URL, 0.0, 60.0, 1.0).forced(true))
            .await
            .unwrap();

        assert!(!forced.cached);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_leaves_no_registration() {
        let model = Arc::new(ScriptedModel::new(vec![Err("quota exceeded".to_string())]));
        let orchestrator = orchestrator(model.clone());
        let request = ChunkRequest::new(URL, 0.0, 60.0, 1.0);

        let err = orchestrator.handle(request.clone()).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let key = CacheKey::new("kE3335DxlEw", 0.0, 60.0, 1.0);
        assert!(orchestrator.cache().get_inflight(&key).is_none());
        assert!(!orchestrator.cache().has(&key));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_abandoned_request_still_completes() {
        let model = Arc::new(
            ScriptedModel::new(vec![Ok(two_lines())]).with_delay(Duration::from_millis(30)),
        );
        let orchestrator = orchestrator(model.clone());

        let pending = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .handle(ChunkRequest::new(URL, 0.0, 60.0, 1.0))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        pending.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let key = CacheKey::new("kE3335DxlEw", 0.0, 60.0, 1.0);
        assert!(orchestrator.cache().has(&key));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let orchestrator = orchestrator(Arc::new(ScriptedModel::new(vec![])));

        let cases = [
            ChunkRequest::new("not a url", 0.0, 60.0, 1.0),
            ChunkRequest::new(URL, 60.0, 60.0, 1.0),
            ChunkRequest::new(URL, 60.0, 30.0, 1.0),
            ChunkRequest::new(URL, -1.0, 30.0, 1.0),
            ChunkRequest::new(URL, 0.0, 30.0, 0.0),
            ChunkRequest::new(URL, 0.0, 30.0, 10.5),
        ];
        for request in cases {
            let err = orchestrator.handle(request).await.unwrap_err();
            assert!(matches!(err, ZimuError::Validation(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn test_status_never_computes() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(two_lines())]));
        let orchestrator = orchestrator(model.clone());
        let request = ChunkRequest::new(URL, 0.0, 60.0, 1.0);

        let before = orchestrator.status(&request).unwrap();
        assert!(!before.cached);
        assert!(before.lines.is_none());
        assert_eq!(model.calls(), 0);

        orchestrator.handle(request.clone()).await.unwrap();
        let after = orchestrator.status(&request).unwrap();
        assert!(after.cached);
        assert_eq!(after.lines.unwrap().len(), 2);
    }
}
