//! Audio transcoding presets: compact mono extraction via ffmpeg.
//!
//! **Formats:** [`AudioFormat::Mp3`] (48 kbit/s, default), [`AudioFormat::Pcm16`] (16-bit WAV, lossless)
//!
//! Transcoding only reduces upload size; a failure falls back to the original input, which the
//! provider accepts as well (larger upload, same transcript).

use crate::error::{ToolError, TranscodeError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Number of stderr lines kept in tool error messages.
const STDERR_TAIL_LINES: usize = 10;

/// 16kHz mono audio format.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AudioFormat {
    /// MP3 at 48 kbit/s (small uploads)
    #[default]
    Mp3,
    /// 16-bit PCM WAV (lossless, ~5x larger)
    Pcm16,
}

impl AudioFormat {
    /// File extension of the encoded output.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Pcm16 => "wav",
        }
    }
}

/// Encoder arguments passed to ffmpeg after the input.
#[derive(Clone, Debug, Default)]
pub struct EncoderArgs {
    pub args: Vec<String>,
}

impl From<AudioFormat> for EncoderArgs {
    /// FFmpeg args: `-ar 16000 -ac 1 -c:a libmp3lame -b:a 48k` (Mp3) or `-c:a pcm_s16le` (Pcm16)
    fn from(format: AudioFormat) -> Self {
        let codec: &[&str] = match format {
            AudioFormat::Mp3 => &["-c:a", "libmp3lame", "-b:a", "48k"],
            AudioFormat::Pcm16 => &["-c:a", "pcm_s16le"],
        };

        let args = ["-ar", "16000", "-ac", "1"]
            .iter()
            .chain(codec)
            .map(|s| s.to_string())
            .collect();

        Self { args }
    }
}

/// ffmpeg executable.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    pub program: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run ffmpeg quietly with `args`, failing on a non-zero exit.
    pub async fn run<I, S>(&self, args: I) -> Result<(), ToolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let program = self.program.display().to_string();
        let args: Vec<OsString> = ["-hide_banner", "-nostdin", "-loglevel", "error"]
            .into_iter()
            .map(OsString::from)
            .chain(args.into_iter().map(Into::into))
            .collect();

        tracing::debug!(program = %program, ?args, "running ffmpeg");

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(ToolError::Failed {
            program,
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

/// Last few lines of a tool's stderr.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Output path for a compact encode of `input`: `{stem}.compact.{ext}` next to the input.
fn compact_path(input: &Path, format: AudioFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    input.with_file_name(format!("{stem}.compact.{}", format.extension()))
}

/// Transcode `input` to a compact mono audio file.
pub async fn transcode(
    ffmpeg: &Ffmpeg,
    input: &Path,
    format: AudioFormat,
) -> Result<PathBuf, TranscodeError> {
    let output = compact_path(input, format);
    let encoder = EncoderArgs::from(format);

    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into(), "-vn".into()];
    args.extend(encoder.args.into_iter().map(OsString::from));
    args.push(output.clone().into());

    if let Err(e) = ffmpeg.run(args).await {
        tokio::fs::remove_file(&output).await.ok();
        return Err(e.into());
    }

    Ok(output)
}

/// Audio ready for transcription.
#[derive(Clone, Debug)]
pub struct CompactAudio {
    pub path: PathBuf,
    /// Whether `path` is a transcoded copy (false when falling back to the input)
    pub transcoded: bool,
}

/// Transcode `input`, falling back to the input itself when transcoding fails.
///
/// The fallback is logged at warn level with the underlying error.
pub async fn to_compact_audio(ffmpeg: &Ffmpeg, input: &Path, format: AudioFormat) -> CompactAudio {
    match transcode(ffmpeg, input, format).await {
        Ok(path) => {
            tracing::info!(input = %input.display(), output = %path.display(), "audio transcoded");
            CompactAudio {
                path,
                transcoded: true,
            }
        }
        Err(e) => {
            tracing::warn!(
                input = %input.display(),
                error = %e,
                "audio transcode failed, falling back to original input"
            );
            CompactAudio {
                path: input.to_path_buf(),
                transcoded: false,
            }
        }
    }
}
