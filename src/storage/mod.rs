use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;
use crate::transcript::TranscriptLine;

pub mod database;
pub mod migrations;

pub use database::Database;

/// Composite key of one full-video transcript:
/// `<videoId>::fps=<fps>::chunk=<chunkSeconds>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubtitleKey(String);

impl SubtitleKey {
    pub fn new(video_id: &str, fps: f64, chunk_seconds: f64) -> Self {
        Self(format!(
            "{}::fps={}::chunk={}",
            video_id, fps, chunk_seconds
        ))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubtitleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A merged transcript persisted for reuse across runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSubtitles {
    pub id: SubtitleKey,
    pub video_id: String,
    pub fps: f64,
    pub chunk_seconds: f64,
    pub subtitles: Vec<TranscriptLine>,
    pub updated_at: DateTime<Utc>,
}

impl CachedSubtitles {
    pub fn new(video_id: &str, fps: f64, chunk_seconds: f64, subtitles: Vec<TranscriptLine>) -> Self {
        Self {
            id: SubtitleKey::new(video_id, fps, chunk_seconds),
            video_id: video_id.to_string(),
            fps,
            chunk_seconds,
            subtitles,
            updated_at: Utc::now(),
        }
    }
}

/// Best-effort persistent transcript cache.
///
/// Read and write failures are logged and reported as a miss or a no-op.
/// When the database cannot be opened at all the cache stays usable and
/// simply never hits.
pub struct DurableCache {
    db: Option<Mutex<Database>>,
}

impl DurableCache {
    pub fn new(db: Database) -> Self {
        Self {
            db: Some(Mutex::new(db)),
        }
    }

    pub fn disabled() -> Self {
        Self { db: None }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Database::open(path) {
            Ok(db) => Self::new(db),
            Err(e) => {
                tracing::warn!("Subtitle cache unavailable at {}: {}", path.display(), e);
                Self::disabled()
            }
        }
    }

    pub fn in_memory() -> Self {
        match Database::open_in_memory() {
            Ok(db) => Self::new(db),
            Err(e) => {
                tracing::warn!("Subtitle cache unavailable: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.db.is_some()
    }

    fn with_db<T>(&self, op: impl FnOnce(&Database) -> Result<T>) -> Option<Result<T>> {
        let db = self.db.as_ref()?;
        let guard = db.lock().unwrap_or_else(|e| e.into_inner());
        Some(op(&guard))
    }

    pub fn get(&self, video_id: &str, fps: f64, chunk_seconds: f64) -> Option<Vec<TranscriptLine>> {
        let key = SubtitleKey::new(video_id, fps, chunk_seconds);
        match self.with_db(|db| db.get_subtitles(&key))? {
            Ok(entry) => entry.map(|e| e.subtitles),
            Err(e) => {
                tracing::warn!(%key, "Subtitle cache read failed: {}", e);
                None
            }
        }
    }

    pub fn put(&self, video_id: &str, fps: f64, chunk_seconds: f64, lines: &[TranscriptLine]) {
        let entry = CachedSubtitles::new(video_id, fps, chunk_seconds, lines.to_vec());
        if let Some(Err(e)) = self.with_db(|db| db.put_subtitles(&entry)) {
            tracing::warn!(key = %entry.id, "Subtitle cache write failed: {}", e);
        }
    }

    pub fn list(&self) -> Result<Vec<CachedSubtitles>> {
        self.with_db(|db| db.list_subtitles())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    pub fn delete_video(&self, video_id: &str) -> Result<usize> {
        self.with_db(|db| db.delete_video(video_id)).unwrap_or(Ok(0))
    }

    pub fn clear(&self) -> Result<usize> {
        self.with_db(|db| db.clear_subtitles()).unwrap_or(Ok(0))
    }
}
