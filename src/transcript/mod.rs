use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ZimuError};
use crate::time::{format_time, parse_time_string};

pub mod merge;

pub use merge::MergedTranscript;

/// Default nominal segment length in seconds.
pub const DEFAULT_CHUNK_SECONDS: f64 = 60.0;

/// One subtitle unit with absolute, 3-decimal timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub start: String,
    pub end: String,
    pub transcription: String,
    pub pinyin: String,
    pub meaning: String,
}

impl TranscriptLine {
    pub fn new(start: f64, end: f64, transcription: &str, pinyin: &str, meaning: &str) -> Self {
        Self {
            start: format_time(start),
            end: format_time(end),
            transcription: transcription.to_string(),
            pinyin: pinyin.to_string(),
            meaning: meaning.to_string(),
        }
    }

    /// Numeric start, with unparseable values sorting first.
    pub fn start_secs(&self) -> f64 {
        parse_time_string(&self.start).unwrap_or(0.0)
    }

    pub fn end_secs(&self) -> f64 {
        parse_time_string(&self.end).unwrap_or_else(|| self.start_secs())
    }
}

/// Half-open absolute window `[start_sec, end_sec)` of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentWindow {
    pub index: usize,
    pub start_sec: f64,
    pub end_sec: f64,
}

impl SegmentWindow {
    /// Window for `index` when a video of `duration_sec` is cut into
    /// `chunk_seconds` pieces. The final window is clamped to the duration.
    pub fn compute(duration_sec: f64, index: usize, chunk_seconds: f64) -> Result<Self> {
        validate_plan(duration_sec, chunk_seconds)?;

        let start_sec = index as f64 * chunk_seconds;
        if start_sec >= duration_sec {
            return Err(ZimuError::Validation(format!(
                "segment index {} out of range for duration {}s",
                index, duration_sec
            )));
        }

        Ok(Self {
            index,
            start_sec,
            end_sec: (start_sec + chunk_seconds).min(duration_sec),
        })
    }

    pub fn duration(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// Number of segments needed to cover `duration_sec`.
pub fn total_segments(duration_sec: f64, chunk_seconds: f64) -> Result<usize> {
    validate_plan(duration_sec, chunk_seconds)?;
    Ok((duration_sec / chunk_seconds).ceil() as usize)
}

/// Every window covering `[0, duration_sec)`, in index order.
pub fn plan_segments(duration_sec: f64, chunk_seconds: f64) -> Result<Vec<SegmentWindow>> {
    let total = total_segments(duration_sec, chunk_seconds)?;
    (0..total)
        .map(|index| SegmentWindow::compute(duration_sec, index, chunk_seconds))
        .collect()
}

fn validate_plan(duration_sec: f64, chunk_seconds: f64) -> Result<()> {
    if !duration_sec.is_finite() || duration_sec <= 0.0 {
        return Err(ZimuError::Validation(format!(
            "duration must be positive, got {}",
            duration_sec
        )));
    }
    if !chunk_seconds.is_finite() || chunk_seconds <= 0.0 {
        return Err(ZimuError::Validation(format!(
            "chunk length must be positive, got {}",
            chunk_seconds
        )));
    }
    Ok(())
}

/// Identity of one unit of remote work.
///
/// Times and fps are rendered at fixed 3-decimal precision so equal requests
/// always produce byte-identical keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(video_id: &str, start_sec: f64, end_sec: f64, fps: f64) -> Self {
        Self(format!(
            "{}:{:.3}-{:.3}:fps{:.3}",
            video_id, start_sec, end_sec, fps
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_covers_duration() {
        let windows = plan_segments(125.0, 60.0).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!((windows[0].start_sec, windows[0].end_sec), (0.0, 60.0));
        assert_eq!((windows[1].start_sec, windows[1].end_sec), (60.0, 120.0));
        assert_eq!((windows[2].start_sec, windows[2].end_sec), (120.0, 125.0));
        assert_eq!(windows[2].duration(), 5.0);
    }

    #[test]
    fn test_plan_exact_multiple() {
        assert_eq!(total_segments(180.0, 60.0).unwrap(), 3);
        assert_eq!(total_segments(1.0, 60.0).unwrap(), 1);
    }

    #[test]
    fn test_window_out_of_range() {
        assert!(SegmentWindow::compute(120.0, 2, 60.0).is_err());
        assert!(SegmentWindow::compute(120.0, 1, 60.0).is_ok());
    }

    #[test]
    fn test_invalid_plan() {
        assert!(plan_segments(0.0, 60.0).is_err());
        assert!(plan_segments(-5.0, 60.0).is_err());
        assert!(plan_segments(100.0, 0.0).is_err());
        assert!(plan_segments(f64::NAN, 60.0).is_err());
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = CacheKey::new("abc", 60.0, 120.0, 1.0);
        let b = CacheKey::new("abc", 60.0000001, 120.0, 1.0);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "abc:60.000-120.000:fps1.000");
        assert_ne!(a, CacheKey::new("abc", 60.0, 120.0, 2.0));
    }

    #[test]
    fn test_line_seconds() {
        let line = TranscriptLine::new(62.5, 64.0, "你好", "nǐ hǎo", "hello");
        assert_eq!(line.start, "62.500");
        assert_eq!(line.end, "64.000");
        assert_eq!(line.start_secs(), 62.5);
        assert_eq!(line.end_secs(), 64.0);
    }
}
