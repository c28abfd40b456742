//! Turns unreliable model output into strict transcript lines.
//!
//! Text responses go through an ordered list of parser strategies; the first
//! one that yields JSON wins. The parsed value is then coerced into a list of
//! candidates, each of which is either accepted under a lenient line schema or
//! rejected and counted. Nothing in here returns an error: a hopeless response
//! degrades to zero lines.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::time::parse_time_string;
use crate::transcript::TranscriptLine;

const WRAPPER_KEYS: &[&str] = &["lines", "result", "results", "data", "items"];

/// Which step produced the parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The response was already structured JSON.
    Structured,
    Direct,
    BracketSlice,
    TrailingCommas,
    /// Individual `{ … start … end … }` fragments salvaged by regex.
    Fragments,
}

type TextParser = fn(&str) -> Option<Value>;

/// Text strategies in precedence order.
pub const TEXT_STRATEGIES: &[(Strategy, TextParser)] = &[
    (Strategy::Direct, parse_direct),
    (Strategy::BracketSlice, parse_bracket_slice),
    (Strategy::TrailingCommas, parse_without_trailing_commas),
];

/// A line candidate under the lenient schema: every field optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LooseLine {
    pub start: Option<String>,
    pub end: Option<String>,
    pub transcription: Option<String>,
    pub pinyin: Option<String>,
    pub meaning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Accepted(LooseLine),
    Rejected(String),
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub lines: Vec<LooseLine>,
    pub discarded: usize,
    pub strategy: Option<Strategy>,
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub lines: Vec<TranscriptLine>,
    pub discarded: usize,
}

fn fence_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^```(?:json)?").expect("valid fence regex"))
}

fn fence_close() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```$").expect("valid fence regex"))
}

fn trailing_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid comma regex"))
}

fn fragment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*start[^{}]*end[^{}]*\}").expect("valid fragment regex"))
}

pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let opened = fence_open().replace(trimmed, "");
    fence_close().replace(&opened, "").trim().to_string()
}

fn parse_direct(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn parse_bracket_slice(text: &str) -> Option<Value> {
    let first = text.find('[')?;
    let last = text.rfind(']')?;
    if last <= first {
        return None;
    }
    serde_json::from_str(&text[first..=last]).ok()
}

fn parse_without_trailing_commas(text: &str) -> Option<Value> {
    let repaired = trailing_comma().replace_all(text, "$1");
    serde_json::from_str(&repaired).ok()
}

fn parse_text(text: &str) -> Option<(Strategy, Value)> {
    let cleaned = strip_code_fences(text);
    TEXT_STRATEGIES
        .iter()
        .find_map(|(strategy, parse)| parse(&cleaned).map(|value| (*strategy, value)))
}

/// Resolve the raw response into a JSON value, unwrapping one level of
/// string-encoded JSON.
fn parse_value(raw: &Value) -> Option<(Strategy, Value)> {
    match raw {
        Value::Array(_) | Value::Object(_) => Some((Strategy::Structured, raw.clone())),
        Value::String(text) => match parse_text(text)? {
            (strategy, Value::String(inner)) => parse_text(&inner)
                .map(|(_, value)| (strategy, value))
                .or(Some((strategy, Value::String(inner)))),
            parsed => Some(parsed),
        },
        _ => None,
    }
}

/// Find the list of line items inside whatever the model returned.
pub fn coerce_to_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(_)) = obj.get(*key) {
                    if let Some(Value::Array(items)) = obj.remove(*key) {
                        return items;
                    }
                }
            }
            obj.into_iter()
                .find_map(|(_, v)| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn fragments(text: &str) -> Vec<Option<Value>> {
    fragment()
        .find_iter(text)
        .map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .collect()
}

fn loose_field(obj: &Map<String, Value>, key: &str, allow_number: bool) -> Result<Option<String>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) if allow_number => Ok(Some(n.to_string())),
        Some(other) => Err(format!("field `{}` has unexpected value {}", key, other)),
    }
}

/// Check one item against the lenient schema. Extra fields are ignored.
pub fn classify(item: &Value) -> Candidate {
    let Value::Object(obj) = item else {
        return Candidate::Rejected(format!("not an object: {}", item));
    };

    let line = (|| {
        Ok::<_, String>(LooseLine {
            start: loose_field(obj, "start", true)?,
            end: loose_field(obj, "end", true)?,
            transcription: loose_field(obj, "transcription", false)?,
            pinyin: loose_field(obj, "pinyin", false)?,
            meaning: loose_field(obj, "meaning", false)?,
        })
    })();

    match line {
        Ok(line) => Candidate::Accepted(line),
        Err(reason) => Candidate::Rejected(reason),
    }
}

/// Best-effort extraction of line candidates from a raw model response.
pub fn robust_parse(raw: &Value) -> ParseOutcome {
    let parsed = parse_value(raw);
    let mut strategy = parsed.as_ref().map(|(s, _)| *s);
    let mut items: Vec<Option<Value>> = parsed
        .map(|(_, value)| coerce_to_array(value).into_iter().map(Some).collect())
        .unwrap_or_default();

    if items.is_empty() {
        if let Value::String(text) = raw {
            let salvaged = fragments(text);
            if !salvaged.is_empty() {
                strategy = Some(Strategy::Fragments);
                items = salvaged;
            }
        }
    }

    let mut outcome = ParseOutcome {
        strategy,
        ..Default::default()
    };
    for item in items {
        let candidate = match item {
            Some(value) => classify(&value),
            None => Candidate::Rejected("fragment is not valid JSON".to_string()),
        };
        match candidate {
            Candidate::Accepted(line) => outcome.lines.push(line),
            Candidate::Rejected(reason) => {
                tracing::trace!("Discarding candidate line: {}", reason);
                outcome.discarded += 1;
            }
        }
    }
    outcome
}

/// Convert segment-relative candidates into absolute, sorted transcript lines.
/// Times that land before the start of the video are clamped to zero.
///
/// Returns an empty list if the result would violate the strict line shape.
pub fn to_absolute_lines(candidates: Vec<LooseLine>, segment_start: f64) -> Vec<TranscriptLine> {
    let mut lines: Vec<TranscriptLine> = candidates
        .into_iter()
        .filter(|c| c.start.is_some() || c.end.is_some())
        .map(|c| {
            let rel_start = parse_time_string(c.start.as_deref().unwrap_or("0")).unwrap_or(0.0);
            let rel_end = parse_time_string(c.end.as_deref().or(c.start.as_deref()).unwrap_or("0"))
                .unwrap_or(rel_start);

            TranscriptLine::new(
                (segment_start + rel_start).max(0.0),
                (segment_start + rel_end).max(0.0),
                c.transcription.as_deref().unwrap_or_default().trim(),
                c.pinyin.as_deref().unwrap_or_default().trim(),
                c.meaning.as_deref().unwrap_or_default().trim(),
            )
        })
        .collect();

    lines.sort_by(|a, b| a.start_secs().total_cmp(&b.start_secs()));

    if !lines.iter().all(is_strict) {
        tracing::warn!("Normalized lines failed strict validation, dropping segment output");
        return Vec::new();
    }
    lines
}

/// Shape check only: both timestamps must read back as finite numbers.
fn is_strict(line: &TranscriptLine) -> bool {
    [&line.start, &line.end]
        .iter()
        .all(|t| parse_time_string(t).is_some())
}

/// Full pipeline: robust parse, then absolute-time normalization.
pub fn normalize_response(raw: &Value, segment_start: f64) -> Normalized {
    let outcome = robust_parse(raw);
    if outcome.discarded > 0 {
        tracing::debug!(
            "Normalizer kept {} candidates, discarded {} (strategy: {:?})",
            outcome.lines.len(),
            outcome.discarded,
            outcome.strategy
        );
    }

    Normalized {
        lines: to_absolute_lines(outcome.lines, segment_start),
        discarded: outcome.discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BARE: &str = r#"[
        {"start": "0.126", "end": "2.046", "transcription": "小米首款AI眼鏡。", "pinyin": "Xiǎomǐ shǒukuǎn AI yǎnjìng.", "meaning": "Xiaomi's first AI glasses."},
        {"start": "2.100", "end": "3.500", "transcription": "很好", "pinyin": "hěn hǎo", "meaning": "very good"}
    ]"#;

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_bare_json() {
        let outcome = robust_parse(&text(BARE));
        assert_eq!(outcome.strategy, Some(Strategy::Direct));
        assert_eq!(outcome.lines.len(), 2);
        assert_eq!(outcome.discarded, 0);
    }

    #[test]
    fn test_code_fences_match_bare() {
        let fenced = format!("```json\n{}\n```", BARE);
        let bare = robust_parse(&text(BARE));
        let wrapped = robust_parse(&text(&fenced));
        assert_eq!(bare.lines, wrapped.lines);

        let upper = format!("```JSON\n{}\n```", BARE);
        assert_eq!(robust_parse(&text(&upper)).lines, bare.lines);
    }

    #[test]
    fn test_array_embedded_in_prose() {
        let prose = format!("Sure! Here is the transcript:\n{}\nLet me know if you need more.", BARE);
        let outcome = robust_parse(&text(&prose));
        assert_eq!(outcome.strategy, Some(Strategy::BracketSlice));
        assert_eq!(outcome.lines, robust_parse(&text(BARE)).lines);
    }

    #[test]
    fn test_trailing_commas() {
        let broken = r#"{"lines": [{"start": "1.000", "end": "2.000", "pinyin": "a",},],}"#;
        let outcome = robust_parse(&text(broken));
        assert_eq!(outcome.strategy, Some(Strategy::TrailingCommas));
        assert_eq!(outcome.lines.len(), 1);
        assert_eq!(outcome.lines[0].pinyin.as_deref(), Some("a"));
    }

    #[test]
    fn test_fragments_salvaged() {
        let broken = r#"[{"start": "1.0", "end": "2.0", "pinyin": "a"}, {"start": "3.0", "end": oops}, {"start": "4.0", "end": "5.0", "pinyin": "c"} and then"#;
        let outcome = robust_parse(&text(broken));
        assert_eq!(outcome.strategy, Some(Strategy::Fragments));
        assert_eq!(outcome.lines.len(), 2);
        assert_eq!(outcome.discarded, 1);
    }

    #[test]
    fn test_garbage_yields_empty() {
        for raw in [
            text("I'm sorry, I can't help with that."),
            text(""),
            text("[[[{{{"),
            json!(42),
            Value::Null,
        ] {
            let outcome = robust_parse(&raw);
            assert!(outcome.lines.is_empty(), "{raw:?}");
            assert!(normalize_response(&raw, 0.0).lines.is_empty());
        }
    }

    #[test]
    fn test_structured_input_used_as_is() {
        let raw = json!([{"start": "1.000", "end": "2.000"}]);
        let outcome = robust_parse(&raw);
        assert_eq!(outcome.strategy, Some(Strategy::Structured));
        assert_eq!(outcome.lines.len(), 1);
    }

    #[test]
    fn test_wrapper_keys() {
        let raw = json!({"note": "ok", "results": [{"start": "1.0"}], "lines": [{"start": "2.0"}, {"start": "3.0"}]});
        let outcome = robust_parse(&raw);
        assert_eq!(outcome.lines.len(), 2);

        let raw = json!({"comment": "x", "subtitles": [{"start": "5.0"}]});
        let outcome = robust_parse(&raw);
        assert_eq!(outcome.lines[0].start.as_deref(), Some("5.0"));
    }

    #[test]
    fn test_double_encoded_string() {
        let raw = text(&serde_json::to_string(BARE).unwrap());
        assert_eq!(robust_parse(&raw).lines.len(), 2);
    }

    #[test]
    fn test_lenient_schema() {
        let raw = json!([
            {"start": 1.5, "end": "2.0", "extra": true},
            {"start": null, "end": "3.0"},
            {"start": "4.0", "pinyin": 7},
            "not an object"
        ]);
        let outcome = robust_parse(&raw);
        assert_eq!(outcome.lines.len(), 2);
        assert_eq!(outcome.discarded, 2);
        assert_eq!(outcome.lines[0].start.as_deref(), Some("1.5"));
        assert_eq!(outcome.lines[1].start, None);
    }

    #[test]
    fn test_classify() {
        assert!(matches!(classify(&json!({})), Candidate::Accepted(_)));
        assert!(matches!(classify(&json!([])), Candidate::Rejected(_)));
        assert!(matches!(
            classify(&json!({"meaning": ["a"]})),
            Candidate::Rejected(_)
        ));
    }

    #[test]
    fn test_absolute_time() {
        let raw = json!([{"start": "2.500", "end": "4.000", "transcription": " 你好 ", "pinyin": "nǐ hǎo", "meaning": "hello"}]);
        let normalized = normalize_response(&raw, 60.0);
        assert_eq!(normalized.lines.len(), 1);
        let line = &normalized.lines[0];
        assert_eq!(line.start, "62.500");
        assert_eq!(line.end, "64.000");
        assert_eq!(line.transcription, "你好");
    }

    #[test]
    fn test_missing_fields_default() {
        let candidates = vec![
            LooseLine { end: Some("3s".into()), ..Default::default() },
            LooseLine { start: Some("1.000".into()), ..Default::default() },
            LooseLine { transcription: Some("no timing".into()), ..Default::default() },
        ];
        let lines = to_absolute_lines(candidates, 10.0);
        assert_eq!(lines.len(), 2);
        // start absent -> "0", end present
        assert_eq!(lines[0].start, "10.000");
        assert_eq!(lines[0].end, "13.000");
        // end absent -> end = start
        assert_eq!(lines[1].start, "11.000");
        assert_eq!(lines[1].end, "11.000");
        assert_eq!(lines[1].pinyin, "");
    }

    #[test]
    fn test_sorted_by_start() {
        let raw = json!([
            {"start": "5.0", "end": "6.0"},
            {"start": "1.0", "end": "2.0"},
            {"start": "3.0", "end": "4.0"}
        ]);
        let lines = normalize_response(&raw, 0.0).lines;
        let starts: Vec<&str> = lines.iter().map(|l| l.start.as_str()).collect();
        assert_eq!(starts, vec!["1.000", "3.000", "5.000"]);
    }

    #[test]
    fn test_strict_shape() {
        assert!(is_strict(&TranscriptLine::new(0.0, 1.0, "", "", "")));

        let mut line = TranscriptLine::new(0.0, 1.0, "", "", "");
        line.start = "soon".to_string();
        assert!(!is_strict(&line));
    }

    #[test]
    fn test_early_line_in_first_segment_is_clamped() {
        let raw = json!([
            {"start": "-0.200", "end": "1.000", "pinyin": "a"},
            {"start": "2.000", "end": "3.000", "pinyin": "b"},
            {"start": "4.000", "end": "5.000", "pinyin": "c"}
        ]);

        let first = normalize_response(&raw, 0.0).lines;
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].start, "0.000");
        assert_eq!(first[0].end, "1.000");

        let later = normalize_response(&raw, 60.0).lines;
        assert_eq!(later.len(), 3);
        assert_eq!(later[0].start, "59.800");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  []  "), "[]");
    }
}
