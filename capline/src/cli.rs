//! CLI argument definitions using clap.

use capline_asr::audio::AudioFormat;
use capline_asr::chunk::ChunkConfig;
use clap::{Parser, Subcommand};
use eyre::Result;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "capline")]
#[command(about = "Caption pipeline: transcribe, polish and translate media into VTT/SRT")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the caption worker and HTTP API
    Serve(crate::serve::Args),

    /// Caption a single media URL or local file
    Cap(crate::cap::Args),
}

/// Transcription and chat provider arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct ProviderArgs {
    /// API key for the transcription and chat endpoints
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "CAPLINE_API_BASE", default_value = capline_asr::whisper::DEFAULT_BASE_URL)]
    pub api_base: String,

    /// Speech-to-text model
    #[arg(long, env = "CAPLINE_WHISPER_MODEL", default_value = capline_asr::whisper::DEFAULT_MODEL)]
    pub whisper_model: String,

    /// Chat model for polish and translation
    #[arg(long, env = "CAPLINE_CHAT_MODEL", default_value = crate::llm::DEFAULT_MODEL)]
    pub chat_model: String,

    /// Transcription request timeout in seconds
    #[arg(long, default_value_t = 300)]
    pub transcribe_timeout: u64,

    /// Chat request timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub chat_timeout: u64,

    /// Attempts per transcription request on transient failures
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
}

/// Media preparation arguments shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Parent directory of per-job scratch directories (default: system temp dir)
    #[arg(long, env = "CAPLINE_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Compact audio encoding uploaded for transcription
    #[arg(long, value_enum, default_value = "mp3")]
    pub audio_format: AudioFormat,

    /// ffmpeg executable
    #[arg(long, env = "CAPLINE_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Whole-download timeout in seconds
    #[arg(long, default_value_t = 1800)]
    pub download_timeout: u64,

    #[command(flatten)]
    pub chunk_config: ChunkConfig,
}

/// Execute CLI command - separated for testing.
pub async fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Serve(args) => crate::serve::execute(args.try_into()?).await,
        Commands::Cap(args) => crate::cap::execute(args.try_into()?).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn assert_default_chunk_config(config: &ChunkConfig) {
        assert_eq!(config.max_bytes, 26_214_400);
        assert!((config.duration - 600.0).abs() < 0.001);
    }

    #[test]
    fn parses_cap_command() {
        let cli = Cli::parse_from(["capline", "cap", "talk.mp4"]);

        match &cli.command {
            Commands::Cap(crate::cap::Args {
                input,
                output: None,
                polish: false,
                languages,
                pipeline,
                ..
            }) if input == "talk.mp4" && languages.is_empty() => {
                assert_default_chunk_config(&pipeline.chunk_config);
                assert_eq!(pipeline.audio_format, AudioFormat::Mp3);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_cap_with_languages() {
        let cli = Cli::parse_from([
            "capline",
            "cap",
            "https://cdn.example.com/v.mp4",
            "-o",
            "out/talk",
            "--polish",
            "--lang",
            "es",
            "--lang",
            "nl=Dutch",
            "--chunk-duration",
            "300",
        ]);

        match &cli.command {
            Commands::Cap(crate::cap::Args {
                output: Some(output),
                polish: true,
                languages,
                pipeline,
                ..
            }) if output.to_str() == Some("out/talk") => {
                assert_eq!(
                    languages,
                    &[Language::new("es", "Spanish"), Language::new("nl", "Dutch")]
                );
                assert!((pipeline.chunk_config.duration - 300.0).abs() < 0.001);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn rejects_unknown_language_code() {
        let result = Cli::try_parse_from(["capline", "cap", "talk.mp4", "--lang", "xx"]);

        assert!(result.is_err());
    }

    #[test]
    fn parses_serve_command() {
        let cli = Cli::parse_from(["capline", "serve", "--bind", "127.0.0.1:8080"]);

        match &cli.command {
            Commands::Serve(crate::serve::Args {
                bind,
                data_dir: None,
                languages,
                ..
            }) if bind.port() == 8080 && languages.is_empty() => {}
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }
}
