//! Job documents: the work descriptor and resumable checkpoint of one video.

use crate::language::SOURCE_LANGUAGE;
use capline_asr::types::Cue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline status of a job, in stage order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    /// Fetch, transcode, split and transcription
    Processing,
    /// Polish stage
    Cleaning,
    /// Per-language translation and upload
    Translating,
    /// Source-language captions
    Uploading,
    Ready,
    /// Finished with some languages missing
    ReadyIncomplete,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Cleaning => "cleaning",
            JobStatus::Translating => "translating",
            JobStatus::Uploading => "uploading",
            JobStatus::Ready => "ready",
            JobStatus::ReadyIncomplete => "ready_incomplete",
            JobStatus::Error => "error",
        }
    }

    /// Whether the pipeline has finished with this job.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Ready | JobStatus::ReadyIncomplete | JobStatus::Error
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_language() -> String {
    SOURCE_LANGUAGE.to_string()
}

/// Persisted state of one video's caption job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDocument {
    pub video_id: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub caption_status: JobStatus,
    /// Resume checkpoint: present once the polish stage has completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polished_segments: Option<Vec<Cue>>,
    /// Language code → VTT storage key
    #[serde(default)]
    pub vtt_files: BTreeMap<String, String>,
    /// Language code → SRT storage key
    #[serde(default)]
    pub srt_files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl JobDocument {
    pub fn new(video_id: impl Into<String>, video_url: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            video_url: video_url.into(),
            language: default_language(),
            caption_status: JobStatus::Queued,
            polished_segments: None,
            vtt_files: BTreeMap::new(),
            srt_files: BTreeMap::new(),
            full_transcript: None,
            error_message: None,
            queued_at: None,
            updated_at: None,
            processed_at: None,
        }
    }

    /// Expected language codes without a VTT artifact.
    pub fn missing_languages(&self, expected: &[String]) -> Vec<String> {
        expected
            .iter()
            .filter(|code| !self.vtt_files.contains_key(*code))
            .cloned()
            .collect()
    }
}

/// Pending work item: the in-memory counterpart of a queued job document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub video_id: String,
    pub video_url: String,
}

impl QueueEntry {
    pub fn new(video_id: impl Into<String>, video_url: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            video_url: video_url.into(),
        }
    }
}

/// Partial update merged into a stored [`JobDocument`].
///
/// Absent fields are left untouched. `Some(None)` on a double option removes the field.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption_status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polished_segments: Option<Option<Vec<Cue>>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub vtt_files: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub srt_files: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_transcript: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<Option<DateTime<Utc>>>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            caption_status: Some(status),
            ..Self::default()
        }
    }

    /// (Re)submission: back to `queued`, clearing a previous failure.
    pub fn submit(video_url: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            video_url: Some(video_url.into()),
            language: Some(language.into()),
            caption_status: Some(JobStatus::Queued),
            error_message: Some(None),
            queued_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Terminal failure with the triggering error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            caption_status: Some(JobStatus::Error),
            error_message: Some(Some(message.into())),
            ..Self::default()
        }
    }

    pub fn with_polished_segments(mut self, cues: Vec<Cue>) -> Self {
        self.polished_segments = Some(Some(cues));
        self
    }

    pub fn with_artifacts(mut self, lang: &str, vtt_key: String, srt_key: String) -> Self {
        self.vtt_files.insert(lang.to_string(), vtt_key);
        self.srt_files.insert(lang.to_string(), srt_key);
        self
    }

    pub fn with_transcript(mut self, transcript: String) -> Self {
        self.full_transcript = Some(Some(transcript));
        self
    }

    pub fn processed_now(mut self) -> Self {
        self.processed_at = Some(Some(Utc::now()));
        self
    }
}
