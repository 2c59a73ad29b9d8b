//! Position-preserving batch rewriting of cue text through a language model.
//!
//! Cues are sent in batches as numbered lines (`[0] text`, `[1] text`, ...). The reply must
//! contain every number of the batch exactly once; anything else is a mismatch and the whole
//! batch is retried. Output cue `k` always carries the timing of input cue `k`.

use crate::language::Language;
use crate::llm::{LlmError, TextModel};
use capline_asr::types::Cue;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d+)\]\s*(.+)$").expect("valid regex"));

const POLISH_INSTRUCTION: &str = "You are a professional transcription editor. Fix grammar, \
punctuation, and capitalization in the following transcription segments.

Rules:
- Keep the meaning exactly the same
- Fix obvious transcription errors
- Add proper punctuation
- Fix capitalization
- Do NOT change timestamps or segment numbers
- Return exactly one line per input segment, in the same format: [number] corrected text
- Never merge, split, drop, or reorder segments";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(
        "batch {batch}: expected {expected} numbered lines, missing {missing:?}, unexpected {unexpected:?}"
    )]
    Mismatch {
        batch: usize,
        expected: usize,
        missing: Vec<usize>,
        unexpected: Vec<usize>,
    },

    #[error("batch {batch}: {source}")]
    Model {
        batch: usize,
        #[source]
        source: LlmError,
    },
}

/// Text rewrite applied to each batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Task {
    /// Grammar, punctuation and capitalization pass
    Polish,
    /// Translation from English into the given language
    Translate(Language),
}

impl Task {
    pub fn instruction(&self) -> String {
        match self {
            Task::Polish => POLISH_INSTRUCTION.to_string(),
            Task::Translate(language) => format!(
                "You are a professional translator. Translate the following transcription \
segments from English to {name}.

Rules:
- Provide accurate, natural-sounding translations
- Keep the segment numbers and format exactly the same
- Preserve any names, brands, or technical terms that shouldn't be translated
- Return exactly one line per input segment, in the same format: [number] translated text
- Never merge, split, drop, or reorder segments",
                name = language.name
            ),
        }
    }

    fn label(&self) -> &str {
        match self {
            Task::Polish => "polish",
            Task::Translate(language) => language.code.as_str(),
        }
    }
}

/// Batching policy for [`Task`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchProcessor {
    /// Cues per model call (default: 10)
    pub batch_size: usize,
    /// Attempts per batch before a mismatch is returned (default: 3)
    pub max_attempts: usize,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_attempts: 3,
        }
    }
}

impl BatchProcessor {
    /// Rewrite the text of every cue, keeping count, order, and timing.
    pub async fn process<M: TextModel + ?Sized>(
        &self,
        model: &M,
        cues: &[Cue],
        task: &Task,
    ) -> Result<Vec<Cue>, BatchError> {
        let instruction = task.instruction();
        let batch_size = self.batch_size.max(1);
        let mut out = Vec::with_capacity(cues.len());

        for (batch, chunk) in cues.chunks(batch_size).enumerate() {
            let texts = self.process_batch(model, &instruction, chunk, batch, task).await?;
            out.extend(chunk.iter().zip(texts).map(|(cue, text)| cue.with_text(text)));
        }

        Ok(out)
    }

    async fn process_batch<M: TextModel + ?Sized>(
        &self,
        model: &M,
        instruction: &str,
        cues: &[Cue],
        batch: usize,
        task: &Task,
    ) -> Result<Vec<String>, BatchError> {
        let prompt = render_batch(cues);
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(task = task.label(), batch, attempt, cues = cues.len(), "sending batch");

            let reply = model
                .complete(instruction, &prompt)
                .await
                .map_err(|source| BatchError::Model { batch, source })?;

            match reconcile(&reply, cues.len(), batch) {
                Ok(texts) => return Ok(texts),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        task = task.label(),
                        batch,
                        attempt,
                        error = %e,
                        "batch reply mismatch, retrying"
                    );
                    attempt += 1;
                }
            }
        }
    }
}

/// Render cues as `[i] text` lines with batch-local 0-based numbers.
pub fn render_batch(cues: &[Cue]) -> String {
    cues.iter()
        .enumerate()
        .map(|(i, cue)| format!("[{i}] {}", cue.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Match reply lines to batch positions.
///
/// Lines not of the form `[number] text` are ignored. Every position `0..expected` must appear
/// exactly once with non-blank text; order in the reply does not matter.
pub fn reconcile(reply: &str, expected: usize, batch: usize) -> Result<Vec<String>, BatchError> {
    let mut texts: BTreeMap<usize, String> = BTreeMap::new();
    let mut unexpected = Vec::new();

    for line in reply.lines() {
        let Some(caps) = NUMBERED_LINE.captures(line.trim()) else {
            continue;
        };
        let Ok(index) = caps[1].parse::<usize>() else {
            continue;
        };
        let text = caps[2].trim();

        if index >= expected || texts.contains_key(&index) {
            unexpected.push(index);
        } else if !text.is_empty() {
            texts.insert(index, text.to_string());
        }
    }

    let missing: Vec<usize> = (0..expected).filter(|i| !texts.contains_key(i)).collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(BatchError::Mismatch {
            batch,
            expected,
            missing,
            unexpected,
        });
    }

    Ok(texts.into_values().collect())
}
