use serde_json::{json, Value};

/// Instruction sent alongside one video segment.
///
/// Timestamps are requested relative to the segment so the model never has to
/// know where the segment sits in the full video.
pub fn segment_transcription_prompt(start_sec: f64) -> String {
    format!(
        r#"please provide transcription with pinyin and meaning with second.millisecond precise timestamp. Return ONLY a JSON array where each item has exactly these keys (all strings): start, end, transcription, pinyin, meaning. Example format:
[
  {{
    "start": "0.126",
    "end": "2.046",
    "transcription": "小米首款AI眼鏡。",
    "pinyin": "Xiǎomǐ shǒukuǎn AI yǎnjìng.",
    "meaning": "Xiaomi's first AI glasses."
  }}
]
Rules:
- start and end are RELATIVE to this segment (segment start = {}s)
- Use seconds with exactly 3 decimal places (e.g. 0.126)
- JSON only. No commentary, markdown, code fences, or explanations. Important: And Every Transcription must be a full sentence."#,
        start_sec
    )
}

/// JSON schema describing the strict line array, used to constrain output.
pub fn line_array_schema() -> Value {
    let string = json!({ "type": "string" });
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "start": string,
                "end": string,
                "transcription": string,
                "pinyin": string,
                "meaning": string
            },
            "required": ["start", "end", "transcription", "pinyin", "meaning"]
        }
    })
}
