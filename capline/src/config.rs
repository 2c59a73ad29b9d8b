//! Configuration types for resolved CLI arguments.
//!
//! This module contains Config structs and their TryFrom implementations.
//! Args structs (for CLI parsing) remain in cli.rs and the subcommand modules.

use crate::cli::{PipelineArgs, ProviderArgs};
use crate::language::Language;
use crate::llm::ChatClient;
use crate::pipeline::{Captioner, PipelineConfig};
use capline_asr::audio::Ffmpeg;
use capline_asr::retry::RetryPolicy;
use capline_asr::whisper::WhisperClient;
use color_eyre::Section;
use eyre::{Context, Result, eyre};
use std::sync::Arc;
use std::time::Duration;

/// Resolved provider configuration.
#[derive(Clone)]
pub struct ProviderConfig {
    api_key: String,
    pub api_base: String,
    pub whisper_model: String,
    pub chat_model: String,
    pub transcribe_timeout: Duration,
    pub chat_timeout: Duration,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("whisper_model", &self.whisper_model)
            .field("chat_model", &self.chat_model)
            .field("transcribe_timeout", &self.transcribe_timeout)
            .field("chat_timeout", &self.chat_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl TryFrom<ProviderArgs> for ProviderConfig {
    type Error = eyre::Error;

    fn try_from(args: ProviderArgs) -> Result<Self> {
        let api_key = args
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| eyre!("no provider API key configured"))
            .suggestion("set OPENAI_API_KEY (a .env file works) or pass --api-key")?;

        Ok(Self {
            api_key,
            api_base: args.api_base,
            whisper_model: args.whisper_model,
            chat_model: args.chat_model,
            transcribe_timeout: Duration::from_secs(args.transcribe_timeout),
            chat_timeout: Duration::from_secs(args.chat_timeout),
            retry: RetryPolicy {
                attempts: args.retries.max(1),
                ..RetryPolicy::default()
            },
        })
    }
}

impl ProviderConfig {
    pub fn transcriber(&self) -> Result<WhisperClient> {
        Ok(WhisperClient::new(self.api_key.clone())?
            .with_base_url(&self.api_base)
            .with_model(&self.whisper_model)
            .with_timeout(self.transcribe_timeout)
            .with_retry(self.retry))
    }

    pub fn text_model(&self) -> Result<ChatClient> {
        Ok(ChatClient::new(self.api_key.clone())?
            .with_base_url(&self.api_base)
            .with_model(&self.chat_model)
            .with_timeout(self.chat_timeout))
    }
}

/// Resolved media and stage configuration.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub pipeline: PipelineConfig,
    pub ffmpeg: Ffmpeg,
}

impl TryFrom<PipelineArgs> for StageConfig {
    type Error = eyre::Error;

    fn try_from(args: PipelineArgs) -> Result<Self> {
        args.chunk_config
            .validate()
            .wrap_err("invalid chunk configuration")?;

        let mut pipeline = PipelineConfig {
            audio_format: args.audio_format,
            chunk: args.chunk_config,
            download_timeout: Duration::from_secs(args.download_timeout),
            ..PipelineConfig::default()
        };
        if let Some(dir) = args.scratch_dir {
            pipeline.scratch_dir = dir;
        }

        Ok(Self {
            pipeline,
            ffmpeg: Ffmpeg::new(args.ffmpeg),
        })
    }
}

impl StageConfig {
    /// Build the caption stages translating into `languages`.
    pub fn captioner(self, provider: &ProviderConfig, languages: Vec<Language>) -> Result<Captioner> {
        let http = capline_dl::dl::http_client().wrap_err("failed to build download client")?;

        let config = PipelineConfig {
            languages,
            ..self.pipeline
        };

        Ok(Captioner::new(
            config,
            http,
            self.ffmpeg,
            Arc::new(provider.transcriber()?),
            Arc::new(provider.text_model()?),
        ))
    }
}
