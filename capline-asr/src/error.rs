//! Error types for capline-asr organized by processing stage.

use std::path::PathBuf;
use thiserror::Error;

/// Provider setup errors returned by client constructors.
///
/// Stage operations return their own error type ([`TranscodeError`], [`SplitError`],
/// [`ProviderError`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Configuration errors (chunking, provider setup).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid chunk duration
    #[error("invalid chunk duration: {duration}s (minimum {min}s)")]
    InvalidChunkDuration { duration: f64, min: f64 },

    /// Invalid size ceiling
    #[error("invalid chunk size ceiling: {0} bytes")]
    InvalidChunkSize(u64),

    /// Missing provider credential
    #[error("missing api key for {0}")]
    MissingApiKey(&'static str),
}

/// External tool invocation failures.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Program could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Program exited unsuccessfully
    #[error("{program} exited with status {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Transcoding errors.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("transcode failed: {0}")]
    Tool(#[from] ToolError),
}

/// Chunk splitting errors.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("split failed: {0}")]
    Tool(#[from] ToolError),

    /// Splitter produced no output files
    #[error("split produced no chunks for {0:?}")]
    NoChunks(PathBuf),

    /// IO error while inspecting input or chunk directory
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Transcription provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport error (connect, timeout, body)
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider answered with an error status
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Audio file could not be read for upload
    #[error("failed to read audio {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A chunk of a multi-chunk input failed
    #[error("chunk {index} ({path:?}) failed: {source}")]
    Chunk {
        index: usize,
        path: PathBuf,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures (including timeouts), 408, 429 and 5xx are transient; malformed
    /// responses and other 4xx statuses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !(e.is_decode() || e.is_builder()),
            Self::Status { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::Io { .. } => false,
            Self::Chunk { source, .. } => source.is_transient(),
        }
    }
}

/// Result type alias for client construction.
pub type Result<T> = std::result::Result<T, Error>;

// reqwest::Error → ProviderError → Error
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(ProviderError::Request(e))
    }
}
