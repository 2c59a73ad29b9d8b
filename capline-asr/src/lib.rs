//! capline-asr: audio preparation and speech-to-text for caption pipelines.
//!
//! This crate turns an arbitrary media file into a single time-continuous transcript with
//! word-level timestamps, staying under a provider's per-request upload ceiling.
//!
//! # Architecture
//!
//! - [`audio`]: transcodes input media to a compact mono audio file via ffmpeg
//! - [`chunk`]: splits oversized audio into fixed-duration chunks (stream copy)
//! - [`traits::Transcriber`]: speech-to-text provider seam; [`traits::transcribe_chunks`]
//!   merges per-chunk results onto one timeline
//! - [`whisper`]: OpenAI-compatible Whisper client with retry/backoff
//!
//! # Quick Start
//!
//! ```ignore
//! use capline_asr::audio::{AudioFormat, Ffmpeg, to_compact_audio};
//! use capline_asr::chunk::{ChunkConfig, split_if_oversized};
//! use capline_asr::traits::transcribe_chunks;
//! use capline_asr::whisper::WhisperClient;
//!
//! let ffmpeg = Ffmpeg::default();
//! let audio = to_compact_audio(&ffmpeg, "lesson.mp4".as_ref(), AudioFormat::Mp3).await;
//! let config = ChunkConfig::default();
//! let chunks = split_if_oversized(&ffmpeg, &audio.path, &config, "chunks".as_ref()).await?;
//!
//! let client = WhisperClient::new(api_key)?;
//! let transcript = transcribe_chunks(&client, &chunks, &config).await?;
//! println!("{}", transcript.text);
//! ```

pub mod audio;
pub mod chunk;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;
pub mod whisper;
