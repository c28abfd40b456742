//! Timestamp helpers shared by the model client, the orchestrator and the CLI.
//!
//! Absolute timestamps travel on the wire as fixed 3-decimal strings
//! (`"62.500"`), while the model's segment window is expressed as an offset
//! string (`"60s"`).

use regex::Regex;
use std::sync::OnceLock;

fn leading_float() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("valid float regex")
    })
}

/// Render seconds as a model offset, e.g. `60` -> `"60s"`, `62.5` -> `"62.5s"`.
pub fn to_offset_string(seconds: f64) -> String {
    format!("{}s", seconds)
}

/// Parse a possibly suffixed time string (`"2.5"`, `" 2.5s "`).
///
/// Returns `None` when no finite number can be read, so callers can tell an
/// absent value apart from zero. Like a lenient float parser, trailing junk
/// after the numeric prefix is ignored.
pub fn parse_time_string(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned = trimmed.strip_suffix('s').unwrap_or(trimmed);

    let number = leading_float().find(cleaned)?;
    number
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Canonical wire format for absolute timestamps: seconds with 3 decimals.
pub fn format_time(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

/// Human-readable `MM:SS.mmm` clock used when printing transcripts.
pub fn format_clock(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let total_ms = (seconds * 1000.0).floor() as u64;
    let minutes = total_ms / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    format!("{:02}:{:02}.{:03}", minutes, secs, millis)
}
