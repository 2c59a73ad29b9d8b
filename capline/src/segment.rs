//! Regroups word timestamps into short caption bursts.

use capline_asr::types::{Cue, Word};
use regex::Regex;
use std::sync::LazyLock;

/// Whitespace before closing punctuation ("word ." → "word.")
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([.,!?;:])").expect("valid regex"));

/// Greedy word grouping configuration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segmenter {
    /// Maximum words per cue (default: 3)
    pub max_words: usize,

    /// Maximum projected characters per cue (default: 20)
    /// A single word longer than this still gets its own cue
    pub max_chars: usize,

    /// Maximum silence between consecutive words in seconds (default: 1.5s)
    pub max_gap: f64,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::SHORT_BURSTS
    }
}

impl Segmenter {
    /// Preset for short, tightly timed caption bursts
    ///
    /// At most three words and about 20 characters per cue, breaking at any pause longer
    /// than 1.5 seconds.
    pub const SHORT_BURSTS: Self = Self {
        max_words: 3,
        max_chars: 20,
        max_gap: 1.5,
    };

    /// Group `words` into cues in a single greedy pass.
    ///
    /// A word joins the open cue while the cue has fewer than `max_words` words, the projected
    /// length stays within `max_chars`, and the gap to the previous word is at most `max_gap`.
    /// The first word of a cue is always accepted. Words with blank text are skipped.
    pub fn resegment(&self, words: &[Word]) -> Vec<Cue> {
        let mut cues = Vec::new();
        let mut current: Vec<&Word> = Vec::new();
        let mut chars = 0;

        for word in words {
            let text = word.text.trim();
            if text.is_empty() {
                continue;
            }
            let len = text.chars().count();

            if let Some(last) = current.last() {
                let gap = word.start - last.end;
                let projected = chars + len + 1;

                if current.len() >= self.max_words || projected > self.max_chars || gap > self.max_gap
                {
                    cues.extend(close_cue(&current));
                    current.clear();
                    chars = 0;
                }
            }

            current.push(word);
            chars += len;
        }

        cues.extend(close_cue(&current));
        cues
    }
}

/// Build a cue spanning `words`, joining their text with single spaces.
fn close_cue(words: &[&Word]) -> Option<Cue> {
    let (first, last) = (words.first()?, words.last()?);

    let joined = words
        .iter()
        .map(|w| w.text.trim())
        .collect::<Vec<_>>()
        .join(" ");

    let mut cue = Cue::new(join_punctuation(&joined), first.start, last.end);
    cue.words = words.iter().map(|&w| w.clone()).collect();
    Some(cue)
}

/// Remove whitespace in front of closing punctuation.
pub fn join_punctuation(text: &str) -> String {
    SPACE_BEFORE_PUNCT.replace_all(text, "$1").trim().to_string()
}
