use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use backon::Retryable;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::client::source::ChunkSource;
use crate::config::SchedulerConfig;
use crate::error::{Result, ZimuError};
use crate::retry::RetryPolicy;
use crate::server::protocol::{ChunkRequest, ChunkResponse};
use crate::storage::DurableCache;
use crate::transcript::{plan_segments, MergedTranscript, SegmentWindow, TranscriptLine};
use crate::video::extract_video_id;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerOptions {
    pub chunk_seconds: f64,
    pub fps: f64,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Skip the durable cache on read and bypass the server cache
    pub force: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            chunk_seconds: config.chunk_seconds,
            fps: config.fps,
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy::from(config),
            force: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SegmentStatus {
    Idle,
    Pending,
    #[serde(rename_all = "camelCase")]
    Done { cached: bool, line_count: usize },
    Failed { error: String },
}

impl SegmentStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentState {
    pub window: SegmentWindow,
    pub status: SegmentStatus,
}

/// Snapshot published after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
    pub video_id: String,
    pub lines: Vec<TranscriptLine>,
    pub segments: Vec<SegmentState>,
    pub errors: Vec<SegmentError>,
    pub running: bool,
    pub aborted: bool,
    pub from_cache: bool,
}

impl ScheduleState {
    /// Share of segments done, in percent.
    pub fn progress(&self) -> f64 {
        if self.segments.is_empty() {
            return 0.0;
        }
        let done = self.segments.iter().filter(|s| s.status.is_done()).count();
        done as f64 / self.segments.len() as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub video_id: String,
    pub lines: Vec<TranscriptLine>,
    pub errors: Vec<SegmentError>,
    pub aborted: bool,
    pub from_cache: bool,
}

enum Event {
    Started(usize),
    Finished {
        index: usize,
        outcome: std::result::Result<ChunkResponse, String>,
    },
}

/// Covers a whole video with fixed-length segments fetched by a bounded
/// pool of workers, merging results into one ordered transcript.
pub struct Scheduler {
    source: Arc<dyn ChunkSource>,
    cache: Arc<DurableCache>,
    options: SchedulerOptions,
    merged: Mutex<MergedTranscript>,
    state: watch::Sender<ScheduleState>,
    abort: Arc<AtomicBool>,
    running: AtomicBool,
}

/// Holds the scheduler's running flag for the duration of one run.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn ChunkSource>,
        cache: Arc<DurableCache>,
        options: SchedulerOptions,
    ) -> Self {
        let (state, _) = watch::channel(ScheduleState::default());
        Self {
            source,
            cache,
            options,
            merged: Mutex::new(MergedTranscript::new()),
            state,
            abort: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScheduleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ScheduleState {
        self.state.borrow().clone()
    }

    /// Stops dispatching new segments and reports the run as stopped.
    /// Fetches already under way finish and are still merged, and a new run
    /// is refused until they have.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
        self.state.send_modify(|s| {
            s.aborted = true;
            s.running = false;
        });
        tracing::info!("Abort requested");
    }

    pub fn reset(&self) {
        self.lock_merged().clear();
        self.abort.store(false, Ordering::SeqCst);
        self.state.send_replace(ScheduleState::default());
    }

    fn lock_merged(&self) -> MutexGuard<'_, MergedTranscript> {
        self.merged.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn segment_request(&self, video_url: &str, window: &SegmentWindow) -> ChunkRequest {
        ChunkRequest::new(video_url, window.start_sec, window.end_sec, self.options.fps)
            .forced(self.options.force)
    }

    /// Covers the whole video. Fails with [`ZimuError::RunInProgress`] if
    /// another run on this scheduler has not finished yet.
    pub async fn run(&self, video_url: &str, duration_sec: f64) -> Result<RunReport> {
        let _guard = RunGuard::acquire(&self.running).ok_or(ZimuError::RunInProgress)?;
        let plan = plan_segments(duration_sec, self.options.chunk_seconds)?;
        let video_id = extract_video_id(video_url);
        self.abort.store(false, Ordering::SeqCst);

        if !self.options.force {
            if let Some(lines) = self
                .cache
                .get(&video_id, self.options.fps, self.options.chunk_seconds)
                .filter(|lines| !lines.is_empty())
            {
                tracing::info!(%video_id, lines = lines.len(), "Using stored transcript");
                return Ok(self.adopt_cached(video_id, plan, lines));
            }
        }

        *self.lock_merged() = MergedTranscript::new();
        self.state.send_replace(ScheduleState {
            video_id: video_id.clone(),
            segments: plan
                .iter()
                .map(|window| SegmentState {
                    window: *window,
                    status: SegmentStatus::Idle,
                })
                .collect(),
            running: true,
            ..ScheduleState::default()
        });

        tracing::info!(
            %video_id,
            segments = plan.len(),
            concurrency = self.options.concurrency,
            "Starting transcription run"
        );

        let queue = Arc::new(Mutex::new(plan.iter().copied().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for _ in 0..self.options.concurrency.max(1).min(plan.len()) {
            let worker = Worker {
                source: Arc::clone(&self.source),
                queue: Arc::clone(&queue),
                abort: Arc::clone(&self.abort),
                events: tx.clone(),
                retry: self.options.retry,
                video_url: video_url.to_string(),
                fps: self.options.fps,
                force: self.options.force,
            };
            workers.spawn(worker.run());
        }
        drop(tx);

        while let Some(event) = rx.recv().await {
            self.apply(event);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Segment worker panicked: {}", e);
            }
        }

        let aborted = self.abort.load(Ordering::SeqCst);
        let lines = self.lock_merged().lines().to_vec();

        if !aborted && !lines.is_empty() {
            self.cache
                .put(&video_id, self.options.fps, self.options.chunk_seconds, &lines);
        }

        self.state.send_modify(|s| {
            s.running = false;
            s.aborted = aborted;
        });

        let errors = self.state.borrow().errors.clone();
        tracing::info!(
            %video_id,
            lines = lines.len(),
            failed = errors.len(),
            aborted,
            "Transcription run finished"
        );

        Ok(RunReport {
            video_id,
            lines,
            errors,
            aborted,
            from_cache: false,
        })
    }

    /// Fetches one segment on demand and merges it into the current
    /// transcript.
    pub async fn fetch_segment(
        &self,
        video_url: &str,
        duration_sec: f64,
        index: usize,
    ) -> Result<ChunkResponse> {
        let window = SegmentWindow::compute(duration_sec, index, self.options.chunk_seconds)?;
        let video_id = extract_video_id(video_url);

        self.state.send_modify(|s| {
            if s.video_id != video_id || s.segments.is_empty() {
                let total = plan_segments(duration_sec, self.options.chunk_seconds)
                    .unwrap_or_default();
                s.video_id = video_id.clone();
                s.segments = total
                    .into_iter()
                    .map(|window| SegmentState {
                        window,
                        status: SegmentStatus::Idle,
                    })
                    .collect();
            }
        });
        self.apply(Event::Started(index));

        let request = self.segment_request(video_url, &window);
        let outcome = fetch_with_retry(self.source.as_ref(), &request, index, self.options.retry).await;
        self.apply(Event::Finished {
            index,
            outcome: outcome.clone(),
        });

        outcome.map_err(|message| ZimuError::SegmentFailed { index, message })
    }

    fn adopt_cached(
        &self,
        video_id: String,
        plan: Vec<SegmentWindow>,
        lines: Vec<TranscriptLine>,
    ) -> RunReport {
        *self.lock_merged() = MergedTranscript::from_lines(lines);
        let lines = self.lock_merged().lines().to_vec();

        let segments = plan
            .into_iter()
            .map(|window| {
                let line_count = lines
                    .iter()
                    .filter(|l| {
                        let start = l.start_secs();
                        start >= window.start_sec && start < window.end_sec
                    })
                    .count();
                SegmentState {
                    window,
                    status: SegmentStatus::Done {
                        cached: true,
                        line_count,
                    },
                }
            })
            .collect();

        self.state.send_replace(ScheduleState {
            video_id: video_id.clone(),
            lines: lines.clone(),
            segments,
            from_cache: true,
            ..ScheduleState::default()
        });

        RunReport {
            video_id,
            lines,
            errors: Vec::new(),
            aborted: false,
            from_cache: true,
        }
    }

    fn apply(&self, event: Event) {
        match event {
            Event::Started(index) => {
                self.state.send_modify(|s| {
                    if let Some(segment) = s.segments.get_mut(index) {
                        segment.status = SegmentStatus::Pending;
                    }
                });
            }
            Event::Finished {
                index,
                outcome: Ok(response),
            } => {
                let line_count = response.lines.len();
                let lines = {
                    let mut merged = self.lock_merged();
                    let added = merged.merge(response.lines);
                    tracing::debug!(index, line_count, added, "Segment merged");
                    merged.lines().to_vec()
                };
                self.state.send_modify(|s| {
                    s.lines = lines;
                    s.errors.retain(|e| e.index != index);
                    if let Some(segment) = s.segments.get_mut(index) {
                        segment.status = SegmentStatus::Done {
                            cached: response.cached,
                            line_count,
                        };
                    }
                });
            }
            Event::Finished {
                index,
                outcome: Err(message),
            } => {
                tracing::warn!(index, "Segment failed permanently: {}", message);
                self.state.send_modify(|s| {
                    if let Some(segment) = s.segments.get_mut(index) {
                        segment.status = SegmentStatus::Failed {
                            error: message.clone(),
                        };
                    }
                    s.errors.retain(|e| e.index != index);
                    s.errors.push(SegmentError { index, message });
                    s.errors.sort_by_key(|e| e.index);
                });
            }
        }
    }
}

struct Worker {
    source: Arc<dyn ChunkSource>,
    queue: Arc<Mutex<VecDeque<SegmentWindow>>>,
    abort: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<Event>,
    retry: RetryPolicy,
    video_url: String,
    fps: f64,
    force: bool,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.abort.load(Ordering::SeqCst) {
                break;
            }
            let next = self
                .queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            let Some(window) = next else {
                break;
            };

            let _ = self.events.send(Event::Started(window.index));

            let request = ChunkRequest::new(&self.video_url, window.start_sec, window.end_sec, self.fps)
                .forced(self.force);
            let outcome =
                fetch_with_retry(self.source.as_ref(), &request, window.index, self.retry).await;

            if self
                .events
                .send(Event::Finished {
                    index: window.index,
                    outcome,
                })
                .is_err()
            {
                break;
            }
        }
    }
}

async fn fetch_with_retry(
    source: &dyn ChunkSource,
    request: &ChunkRequest,
    index: usize,
    retry: RetryPolicy,
) -> std::result::Result<ChunkResponse, String> {
    (move || source.fetch(request))
        .retry(retry)
        .notify(|err, delay| {
            tracing::warn!(
                index,
                retry_delay_ms = delay.as_millis() as u64,
                "Segment fetch failed, retrying: {}",
                err
            );
        })
        .await
        .map_err(|e| e.to_string())
}
