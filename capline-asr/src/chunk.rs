//! Splitting of oversized audio into fixed-duration chunks.
//!
//! Chunks are cut with stream copy at fixed time boundaries. Boundaries are not aligned to
//! silence, so a word spoken across a boundary may appear truncated in both neighbours.

use crate::audio::Ffmpeg;
use crate::error::{ConfigError, SplitError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default upload ceiling in bytes (25 MiB)
const DEFAULT_MAX_BYTES: u64 = 25 * 1024 * 1024;

/// Default chunk duration in seconds (10 minutes)
const DEFAULT_CHUNK_DURATION: f64 = 600.0;

/// Shortest accepted chunk duration in seconds
const MIN_CHUNK_DURATION: f64 = 1.0;

/// Chunk file name prefix inside the chunk directory.
const CHUNK_PREFIX: &str = "chunk_";

/// Configuration for audio chunking.
#[derive(clap::Args, Clone, Copy, Debug, PartialEq)]
pub struct ChunkConfig {
    /// Split audio files at or above this size in bytes
    #[arg(long = "chunk-max-bytes", env = "CAPLINE_CHUNK_MAX_BYTES", default_value_t = DEFAULT_MAX_BYTES)]
    pub max_bytes: u64,

    /// Chunk duration in seconds for oversized audio
    #[arg(long = "chunk-duration", env = "CAPLINE_CHUNK_DURATION", default_value_t = DEFAULT_CHUNK_DURATION)]
    pub duration: f64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            duration: DEFAULT_CHUNK_DURATION,
        }
    }
}

impl ChunkConfig {
    /// Create a new chunk configuration.
    pub fn new(max_bytes: u64, duration_sec: f64) -> Self {
        Self {
            max_bytes,
            duration: duration_sec,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.is_nan() || self.duration < MIN_CHUNK_DURATION {
            return Err(ConfigError::InvalidChunkDuration {
                duration: self.duration,
                min: MIN_CHUNK_DURATION,
            });
        }
        if self.max_bytes == 0 {
            return Err(ConfigError::InvalidChunkSize(self.max_bytes));
        }
        Ok(())
    }

    /// Whether a file of `size` bytes must be split before upload.
    pub fn needs_split(&self, size: u64) -> bool {
        size >= self.max_bytes
    }

    /// Start time of chunk `index` on the merged timeline.
    pub fn offset(&self, index: usize) -> f64 {
        index as f64 * self.duration
    }

    /// Number of chunks produced for audio of `total_secs`.
    pub fn expected_chunks(&self, total_secs: f64) -> usize {
        ((total_secs / self.duration).ceil() as usize).max(1)
    }
}

/// Ordered audio files to transcribe.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunks {
    pub paths: Vec<PathBuf>,
    /// Whether `paths` are split chunks owned by the caller (deleted after transcription)
    pub split: bool,
}

impl Chunks {
    /// The whole input as a single, unsplit chunk.
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            split: false,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Split `path` into `config.duration` chunks under `dir` when it reaches `config.max_bytes`.
///
/// Returns the input unchanged when it is under the ceiling. Otherwise chunks are written as
/// `dir/chunk_000.<ext>`, `dir/chunk_001.<ext>`, ... and returned in name order.
pub async fn split_if_oversized(
    ffmpeg: &Ffmpeg,
    path: &Path,
    config: &ChunkConfig,
    dir: &Path,
) -> Result<Chunks, SplitError> {
    let size = tokio::fs::metadata(path)
        .await
        .map_err(|source| SplitError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    if !config.needs_split(size) {
        tracing::debug!(size, max_bytes = config.max_bytes, "audio under upload ceiling");
        return Ok(Chunks::single(path));
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SplitError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp3".to_string());
    let pattern = dir.join(format!("{CHUNK_PREFIX}%03d.{ext}"));

    tracing::info!(
        size,
        max_bytes = config.max_bytes,
        duration = config.duration,
        "splitting oversized audio"
    );

    let args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        path.into(),
        "-f".into(),
        "segment".into(),
        "-segment_time".into(),
        config.duration.to_string().into(),
        "-c".into(),
        "copy".into(),
        pattern.into(),
    ];
    ffmpeg.run(args).await?;

    let paths = list_chunks(dir).await?;
    if paths.is_empty() {
        return Err(SplitError::NoChunks(path.to_path_buf()));
    }

    tracing::info!(chunks = paths.len(), "audio split");

    Ok(Chunks { paths, split: true })
}

/// Chunk files in `dir`, sorted by name.
async fn list_chunks(dir: &Path) -> Result<Vec<PathBuf>, SplitError> {
    let io_err = |source| SplitError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        let is_chunk = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(CHUNK_PREFIX));
        if is_chunk {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_25_mib_and_10_minutes() {
        let config = ChunkConfig::default();

        assert_eq!(config.max_bytes, 26_214_400);
        assert_eq!(config.duration, 600.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ceiling_is_inclusive() {
        let config = ChunkConfig::new(100, 600.0);

        assert!(!config.needs_split(99));
        assert!(config.needs_split(100));
        assert!(config.needs_split(101));
    }

    #[test]
    fn offsets_are_multiples_of_duration() {
        let config = ChunkConfig::default();

        assert_eq!(config.offset(0), 0.0);
        assert_eq!(config.offset(1), 600.0);
        assert_eq!(config.offset(3), 1800.0);
    }

    #[test]
    fn expected_chunks_rounds_up() {
        let config = ChunkConfig::default();

        assert_eq!(config.expected_chunks(0.0), 1);
        assert_eq!(config.expected_chunks(599.0), 1);
        assert_eq!(config.expected_chunks(600.0), 1);
        assert_eq!(config.expected_chunks(601.0), 2);
        // 40 MB of 48 kbit/s audio is roughly 111 minutes
        assert_eq!(config.expected_chunks(6_667.0), 12);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(matches!(
            ChunkConfig::new(100, 0.0).validate(),
            Err(ConfigError::InvalidChunkDuration { .. })
        ));
        assert!(matches!(
            ChunkConfig::new(100, f64::NAN).validate(),
            Err(ConfigError::InvalidChunkDuration { .. })
        ));
        assert!(matches!(
            ChunkConfig::new(0, 600.0).validate(),
            Err(ConfigError::InvalidChunkSize(0))
        ));
    }

    #[tokio::test]
    async fn small_file_is_not_split() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.mp3");
        std::fs::write(&audio, vec![0u8; 64]).unwrap();

        // ffmpeg is never invoked for files under the ceiling
        let ffmpeg = Ffmpeg::new("/nonexistent/ffmpeg");
        let config = ChunkConfig::new(1024, 600.0);
        let chunks = split_if_oversized(&ffmpeg, &audio, &config, &dir.path().join("chunks"))
            .await
            .unwrap();

        assert_eq!(chunks, Chunks::single(&audio));
    }

    #[tokio::test]
    async fn missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChunkConfig::default();

        let result = split_if_oversized(
            &Ffmpeg::default(),
            &dir.path().join("missing.mp3"),
            &config,
            dir.path(),
        )
        .await;

        assert!(matches!(result, Err(SplitError::Io { .. })));
    }

    #[tokio::test]
    async fn list_chunks_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["chunk_002.mp3", "chunk_000.mp3", "other.txt", "chunk_001.mp3"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let paths = list_chunks(dir.path()).await.unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();

        assert_eq!(names, ["chunk_000.mp3", "chunk_001.mp3", "chunk_002.mp3"]);
    }
}
