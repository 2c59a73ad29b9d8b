//! Core traits for speech-to-text providers.

use crate::chunk::{ChunkConfig, Chunks};
use crate::error::ProviderError;
use crate::types::Transcript;
use async_trait::async_trait;
use std::path::Path;

/// Speech-to-text provider transcribing one audio file per call.
///
/// Implementations must return word-level timestamps relative to the start of the file;
/// provider segmentation is carried along but not used for display.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe_file(&self, path: &Path) -> Result<Transcript, ProviderError>;
}

#[async_trait]
impl<T: Transcriber + ?Sized> Transcriber for std::sync::Arc<T> {
    async fn transcribe_file(&self, path: &Path) -> Result<Transcript, ProviderError> {
        (**self).transcribe_file(path).await
    }
}

/// Transcribe `chunks` in order and merge them onto one timeline.
///
/// Chunk `i` is shifted by `config.offset(i)`. Split chunk files are deleted as soon as their
/// transcription finishes. The first failing chunk aborts the whole transcription.
pub async fn transcribe_chunks<T: Transcriber + ?Sized>(
    transcriber: &T,
    chunks: &Chunks,
    config: &ChunkConfig,
) -> Result<Transcript, ProviderError> {
    let mut merged = Transcript::default();
    let total = chunks.len();

    for (index, path) in chunks.paths.iter().enumerate() {
        tracing::debug!(chunk = index + 1, total, path = %path.display(), "transcribing chunk");

        let result = transcriber.transcribe_file(path).await;

        if chunks.split
            && let Err(e) = tokio::fs::remove_file(path).await
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove chunk");
        }

        let mut transcript = result.map_err(|source| {
            if total == 1 {
                source
            } else {
                ProviderError::Chunk {
                    index,
                    path: path.clone(),
                    source: Box::new(source),
                }
            }
        })?;

        transcript.offset(config.offset(index));
        tracing::debug!(
            chunk = index + 1,
            words = transcript.words.len(),
            "chunk transcribed"
        );
        merged.append(transcript);
    }

    Ok(merged)
}
