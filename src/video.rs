use regex::Regex;
use std::sync::OnceLock;
use url::Url;

const SHORT_LINK_HOST: &str = "youtu.be";
const FALLBACK_MAX_LEN: usize = 40;

fn id_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11,15}$").expect("valid id regex"))
}

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid non-word regex"))
}

/// Derive a stable identifier for a video URL or bare id.
///
/// Precedence: `youtu.be/<id>`, then the `v` query parameter, then a last path
/// segment that looks like an id (`/shorts/<id>`, `/embed/<id>`), and finally
/// the input with all non-word characters stripped, truncated to 40 chars.
/// Never fails; the result is only used to build cache keys.
pub fn extract_video_id(input: &str) -> String {
    if let Ok(url) = Url::parse(input.trim()) {
        if let Some(id) = id_from_url(&url) {
            return id;
        }
    }
    sanitize(input)
}

fn id_from_url(url: &Url) -> Option<String> {
    if url
        .host_str()
        .is_some_and(|host| host.contains(SHORT_LINK_HOST))
    {
        let id = url.path().trim_start_matches('/');
        let id = id.split('/').next().unwrap_or_default();
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    if let Some((_, v)) = url.query_pairs().find(|(key, _)| key == "v") {
        if !v.is_empty() {
            return Some(v.into_owned());
        }
    }

    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .filter(|segment| id_token().is_match(segment))
        .map(str::to_string)
}

fn sanitize(input: &str) -> String {
    non_word()
        .replace_all(input, "")
        .chars()
        .take(FALLBACK_MAX_LEN)
        .collect()
}
