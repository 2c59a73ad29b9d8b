//! OpenAI-compatible Whisper transcription client.

use crate::error::{ConfigError, ProviderError, Result};
use crate::retry::RetryPolicy;
use crate::traits::Transcriber;
use crate::types::{Cue, Transcript, Word};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "whisper-1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Whisper `audio/transcriptions` client requesting word and segment timestamps.
#[derive(Clone, Debug)]
pub struct WhisperClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    language: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl WhisperClient {
    /// Create a client for the public OpenAI endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey("transcription provider").into());
        }

        let client = Client::builder()
            .user_agent(concat!("capline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            language: Some("en".to_string()),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Spoken language hint (ISO-639-1); `None` lets the provider detect it.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }

    fn form(&self, file_name: &str, bytes: Vec<u8>) -> std::result::Result<Form, ProviderError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("timestamp_granularities[]", "segment");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }
        Ok(form)
    }

    async fn request(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> std::result::Result<VerboseTranscription, ProviderError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .multipart(self.form(file_name, bytes)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe_file(&self, path: &Path) -> std::result::Result<Transcript, ProviderError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ProviderError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        tracing::debug!(file = %file_name, bytes = bytes.len(), model = %self.model, "uploading audio");

        let response = self
            .retry
            .run("transcribe", || self.request(&file_name, bytes.clone()))
            .await?;

        let transcript = Transcript::from(response);
        tracing::debug!(
            file = %file_name,
            words = transcript.words.len(),
            segments = transcript.segments.len(),
            "transcription received"
        );
        Ok(transcript)
    }
}

/// Upload content type for an audio file name.
pub fn mime_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// `verbose_json` response body.
#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<ProviderSegment>,
    #[serde(default)]
    words: Option<Vec<ProviderWord>>,
}

#[derive(Debug, Deserialize)]
struct ProviderSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ProviderWord {
    word: String,
    start: f64,
    end: f64,
}

impl From<VerboseTranscription> for Transcript {
    fn from(response: VerboseTranscription) -> Self {
        let segments: Vec<Cue> = response
            .segments
            .into_iter()
            .map(|s| Cue::new(s.text.trim(), s.start, s.end))
            .collect();

        let words: Vec<Word> = match response.words {
            Some(words) if !words.is_empty() => words
                .into_iter()
                .map(|w| Word::new(w.word, w.start, w.end))
                .collect(),
            // no word timestamps: segments stand in as coarse pseudo-words
            _ => segments
                .iter()
                .map(|s| Word::new(s.text.clone(), s.start, s.end))
                .collect(),
        };

        Self {
            text: response.text.trim().to_string(),
            segments,
            words,
        }
    }
}
