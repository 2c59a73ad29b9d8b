//! Core types for capline-asr

use serde::{Deserialize, Serialize};

/// Single transcribed word with timestamps in seconds.
///
/// Produced by the provider and never renormalized: entries may overlap or have zero length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl Word {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// Shift both timestamps by `secs`.
    pub fn offset(&mut self, secs: f64) {
        self.start += secs;
        self.end += secs;
    }
}

/// Caption cue: a timed piece of display text.
///
/// Downstream text stages may only replace `text`; `start` and `end` are carried over
/// unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Display text
    pub text: String,
    /// Source words (only on freshly segmented cues)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

impl Cue {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            words: Vec::new(),
        }
    }

    /// Same timing, replaced text, no word list.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self::new(text, self.start, self.end)
    }

    /// Shift timestamps (including words) by `secs`.
    pub fn offset(&mut self, secs: f64) {
        self.start += secs;
        self.end += secs;
        self.words.iter_mut().for_each(|w| w.offset(secs));
    }
}

/// Provider transcription of one file or of a merged multi-chunk input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Full plain text
    pub text: String,
    /// Provider segments (kept for reference, not used for display)
    pub segments: Vec<Cue>,
    /// Word-level timestamps
    pub words: Vec<Word>,
}

impl Transcript {
    /// End of the last word in seconds (0 when empty).
    pub fn duration(&self) -> f64 {
        self.words.last().map_or(0.0, |w| w.end)
    }

    /// Shift every timestamp by `secs`.
    pub fn offset(&mut self, secs: f64) {
        self.segments.iter_mut().for_each(|s| s.offset(secs));
        self.words.iter_mut().for_each(|w| w.offset(secs));
    }

    /// Append `other` after `self`, joining text with a single space.
    pub fn append(&mut self, other: Transcript) {
        let text = other.text.trim();
        if !text.is_empty() {
            if !self.text.is_empty() {
                self.text.push(' ');
            }
            self.text.push_str(text);
        }
        self.segments.extend(other.segments);
        self.words.extend(other.words);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_text_keeps_timing_and_drops_words() {
        let mut cue = Cue::new("hello there", 1.25, 2.5);
        cue.words = vec![Word::new("hello", 1.25, 1.8), Word::new("there", 1.9, 2.5)];

        let replaced = cue.with_text("Hello there.");

        assert_eq!(replaced.start, 1.25);
        assert_eq!(replaced.end, 2.5);
        assert_eq!(replaced.text, "Hello there.");
        assert!(replaced.words.is_empty());
    }

    #[test]
    fn append_joins_text_and_keeps_order() {
        let mut first = Transcript {
            text: "one two".to_string(),
            segments: vec![],
            words: vec![Word::new("one", 0.0, 0.4), Word::new("two", 0.5, 0.9)],
        };
        let mut second = Transcript {
            text: " three ".to_string(),
            segments: vec![],
            words: vec![Word::new("three", 0.1, 0.6)],
        };
        second.offset(600.0);

        first.append(second);

        assert_eq!(first.text, "one two three");
        assert_eq!(first.words.len(), 3);
        assert!((first.words[2].start - 600.1).abs() < 1e-9);
        assert!((first.duration() - 600.6).abs() < 1e-9);
    }

    #[test]
    fn cue_serialization_omits_empty_words() {
        let cue = Cue::new("Hi.", 0.0, 0.5);
        let json = serde_json::to_value(&cue).unwrap();

        assert!(json.get("words").is_none());

        let back: Cue = serde_json::from_value(json).unwrap();
        assert_eq!(back, cue);
    }
}
