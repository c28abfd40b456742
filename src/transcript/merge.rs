use std::collections::HashSet;

use crate::transcript::TranscriptLine;

/// Identity used to drop repeated lines when segments are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    start: String,
    end: String,
    pinyin: String,
    meaning: String,
}

impl From<&TranscriptLine> for LineKey {
    fn from(line: &TranscriptLine) -> Self {
        Self {
            start: line.start.clone(),
            end: line.end.clone(),
            pinyin: line.pinyin.clone(),
            meaning: line.meaning.clone(),
        }
    }
}

/// Whole-video transcript assembled from segment results.
///
/// Always sorted by start time and free of lines sharing a [`LineKey`],
/// whatever order segments arrive in.
#[derive(Debug, Clone, Default)]
pub struct MergedTranscript {
    lines: Vec<TranscriptLine>,
    seen: HashSet<LineKey>,
}

impl MergedTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines(lines: Vec<TranscriptLine>) -> Self {
        let mut merged = Self::new();
        merged.merge(lines);
        merged
    }

    /// Append unseen lines and restore ordering. Returns how many were added.
    pub fn merge(&mut self, incoming: Vec<TranscriptLine>) -> usize {
        let mut added = 0;
        for line in incoming {
            if self.seen.insert(LineKey::from(&line)) {
                self.lines.push(line);
                added += 1;
            }
        }

        if added > 0 {
            // stable sort keeps arrival order for equal starts
            self.lines
                .sort_by(|a, b| a.start_secs().total_cmp(&b.start_secs()));
        }
        added
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.seen.clear();
    }
}
