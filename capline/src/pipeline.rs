//! Caption pipeline and its persisted status machine.
//!
//! A job moves through `queued → processing → cleaning → translating → uploading` and ends in
//! `ready`, `ready_incomplete` or `error`. Each status is persisted before its stage starts.
//! Two checkpoints make resubmission cheap:
//!
//! - `polishedSegments`: once present, transcription and polish are never repeated
//! - `vttFiles.{lang}`: written per language as soon as its captions are uploaded

use crate::artifact::{ArtifactStore, SRT_CONTENT_TYPE, UploadError, VTT_CONTENT_TYPE, srt_key, vtt_key};
use crate::batch::{BatchError, BatchProcessor, Task};
use crate::job::{JobDocument, JobPatch, JobStatus, QueueEntry};
use crate::language::{Language, SOURCE_LANGUAGE, expected_codes};
use crate::llm::TextModel;
use crate::segment::Segmenter;
use crate::store::{JobStore, StoreError};
use crate::subtitle::{to_srt, to_vtt};
use capline_asr::audio::{AudioFormat, Ffmpeg, to_compact_audio};
use capline_asr::chunk::{ChunkConfig, split_if_oversized};
use capline_asr::error::{ProviderError, SplitError};
use capline_asr::traits::{Transcriber, transcribe_chunks};
use capline_asr::types::{Cue, Transcript};
use capline_dl::dl::{DownloadError, DownloadOptions, download};
use reqwest::Client;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Default whole-download timeout
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Fatal job errors. The message is recorded as the job's `errorMessage`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("transcription failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("polish failed: {0}")]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scratch directory error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job cancelled")]
    Cancelled,
}

/// Stage settings shared by the service and the one-shot CLI.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Parent of per-job scratch directories
    pub scratch_dir: PathBuf,
    pub audio_format: AudioFormat,
    pub chunk: ChunkConfig,
    pub download_timeout: Duration,
    pub segmenter: Segmenter,
    pub batch: BatchProcessor,
    /// Translation targets
    pub languages: Vec<Language>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("capline"),
            audio_format: AudioFormat::default(),
            chunk: ChunkConfig::default(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            segmenter: Segmenter::SHORT_BURSTS,
            batch: BatchProcessor::default(),
            languages: crate::language::default_targets(),
        }
    }
}

/// The caption stages without persistence: media in, cues out.
pub struct Captioner {
    pub config: PipelineConfig,
    http: Client,
    ffmpeg: Ffmpeg,
    transcriber: Arc<dyn Transcriber>,
    model: Arc<dyn TextModel>,
}

impl Captioner {
    pub fn new(
        config: PipelineConfig,
        http: Client,
        ffmpeg: Ffmpeg,
        transcriber: Arc<dyn Transcriber>,
        model: Arc<dyn TextModel>,
    ) -> Self {
        Self {
            config,
            http,
            ffmpeg,
            transcriber,
            model,
        }
    }

    /// Create a fresh scratch directory, removed when the returned guard drops.
    pub async fn scratch(&self) -> Result<TempDir, PipelineError> {
        let root = &self.config.scratch_dir;
        let io_err = |source| PipelineError::Io {
            path: root.clone(),
            source,
        };

        tokio::fs::create_dir_all(root).await.map_err(io_err)?;
        tempfile::Builder::new()
            .prefix("job_")
            .tempdir_in(root)
            .map_err(io_err)
    }

    /// Fetch, transcode, split and transcribe `url` using `dir` for intermediate files.
    pub async fn transcribe(&self, url: &str, dir: &Path) -> Result<Transcript, PipelineError> {
        let s = Instant::now();

        let opts = DownloadOptions::new(dir).with_timeout(self.config.download_timeout);
        let media = download(&self.http, url, &opts).await?;

        let audio = to_compact_audio(&self.ffmpeg, &media, self.config.audio_format).await;

        let chunks = split_if_oversized(
            &self.ffmpeg,
            &audio.path,
            &self.config.chunk,
            &dir.join("chunks"),
        )
        .await?;

        let transcript = transcribe_chunks(&*self.transcriber, &chunks, &self.config.chunk).await?;

        tracing::info!(
            chunks = chunks.len(),
            words = transcript.words.len(),
            audio_secs = %format_secs(transcript.duration()),
            elapsed = %format_secs(s.elapsed().as_secs_f64()),
            "transcription completed"
        );

        Ok(transcript)
    }

    /// Regroup transcript words into caption cues.
    pub fn segment(&self, transcript: &Transcript) -> Vec<Cue> {
        self.config.segmenter.resegment(&transcript.words)
    }

    pub async fn polish(&self, cues: &[Cue]) -> Result<Vec<Cue>, BatchError> {
        self.config
            .batch
            .process(&*self.model, cues, &Task::Polish)
            .await
    }

    pub async fn translate(&self, cues: &[Cue], language: &Language) -> Result<Vec<Cue>, BatchError> {
        self.config
            .batch
            .process(&*self.model, cues, &Task::Translate(language.clone()))
            .await
    }
}

/// Resumable job runner persisting every stage boundary.
pub struct Pipeline {
    captioner: Captioner,
    store: JobStore,
    artifacts: Arc<dyn ArtifactStore>,
}

impl Pipeline {
    pub fn new(captioner: Captioner, store: JobStore, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            captioner,
            store,
            artifacts,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn artifacts(&self) -> &dyn ArtifactStore {
        &*self.artifacts
    }

    pub fn languages(&self) -> &[Language] {
        &self.captioner.config.languages
    }

    /// Run a job to a terminal status, recording fatal errors on the job document.
    pub async fn execute(&self, entry: &QueueEntry, cancel: &CancellationToken) -> JobStatus {
        let span = tracing::info_span!("job", video_id = %entry.video_id);

        async {
            let s = Instant::now();
            match self.run(entry, cancel).await {
                Ok(status) => {
                    tracing::info!(
                        %status,
                        elapsed = %format_secs(s.elapsed().as_secs_f64()),
                        "job finished"
                    );
                    status
                }
                Err(e) => {
                    tracing::error!(error = %e, "job failed");
                    if let Err(pe) = self
                        .store
                        .persist(&entry.video_id, &JobPatch::failed(e.to_string()))
                        .await
                    {
                        tracing::error!(error = %pe, "failed to record job error");
                    }
                    JobStatus::Error
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the status machine for one job.
    ///
    /// Resumes from the stored document: with `polishedSegments` present the job goes straight
    /// to `translating`, and languages already in `vttFiles` are skipped.
    pub async fn run(
        &self,
        entry: &QueueEntry,
        cancel: &CancellationToken,
    ) -> Result<JobStatus, PipelineError> {
        let video_id = entry.video_id.as_str();
        let doc = self
            .store
            .get(video_id)?
            .unwrap_or_else(|| JobDocument::new(video_id, &entry.video_url));

        let polished = match doc.polished_segments.clone() {
            Some(cues) => {
                tracing::info!(cues = cues.len(), "resuming from polished segments");
                self.set_status(video_id, JobStatus::Translating).await?;
                cues
            }
            None => self.transcribe_and_polish(entry, cancel).await?,
        };

        let expected = expected_codes(&doc.language, self.languages());
        let mut done: BTreeSet<String> = doc.vtt_files.keys().cloned().collect();

        for language in self.languages() {
            if !expected.contains(&language.code) || done.contains(&language.code) {
                continue;
            }
            check_cancel(cancel)?;

            let lang = language.code.as_str();
            let translated = match self.captioner.translate(&polished, language).await {
                Ok(cues) => cues,
                Err(e) => {
                    tracing::warn!(lang, error = %e, "translation failed, skipping language");
                    continue;
                }
            };

            if self.publish(video_id, lang, &translated).await? {
                done.insert(lang.to_string());
                tracing::info!(lang, "translation published");
            }
        }

        check_cancel(cancel)?;
        self.set_status(video_id, JobStatus::Uploading).await?;

        if !done.contains(SOURCE_LANGUAGE) && self.publish(video_id, SOURCE_LANGUAGE, &polished).await?
        {
            done.insert(SOURCE_LANGUAGE.to_string());
        }

        let status = if expected.iter().all(|code| done.contains(code)) {
            JobStatus::Ready
        } else {
            let missing: Vec<&String> = expected.iter().filter(|c| !done.contains(*c)).collect();
            tracing::warn!(?missing, "finished with missing languages");
            JobStatus::ReadyIncomplete
        };

        let transcript = polished
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        self.store
            .persist(
                video_id,
                &JobPatch::status(status)
                    .with_transcript(transcript)
                    .processed_now(),
            )
            .await?;

        Ok(status)
    }

    /// `processing` and `cleaning`: produce and checkpoint polished cues.
    async fn transcribe_and_polish(
        &self,
        entry: &QueueEntry,
        cancel: &CancellationToken,
    ) -> Result<Vec<Cue>, PipelineError> {
        let video_id = entry.video_id.as_str();

        check_cancel(cancel)?;
        self.set_status(video_id, JobStatus::Processing).await?;

        let cues = {
            let scratch = self.captioner.scratch().await?;
            let transcript = self.captioner.transcribe(&entry.video_url, scratch.path()).await?;
            self.captioner.segment(&transcript)
        };
        tracing::info!(cues = cues.len(), "transcript segmented");

        check_cancel(cancel)?;
        self.set_status(video_id, JobStatus::Cleaning).await?;

        let polished = self.captioner.polish(&cues).await?;

        self.store
            .persist(
                video_id,
                &JobPatch::status(JobStatus::Translating).with_polished_segments(polished.clone()),
            )
            .await?;
        tracing::info!(cues = polished.len(), "polished segments checkpointed");

        Ok(polished)
    }

    /// Encode, upload and record one language. Upload failures are logged and reported as
    /// `false`; store failures are fatal.
    async fn publish(&self, video_id: &str, lang: &str, cues: &[Cue]) -> Result<bool, PipelineError> {
        match self.upload(video_id, lang, cues).await {
            Ok((vtt, srt)) => {
                self.store
                    .persist(video_id, &JobPatch::default().with_artifacts(lang, vtt, srt))
                    .await?;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(lang, error = %e, "caption upload failed");
                Ok(false)
            }
        }
    }

    async fn upload(
        &self,
        video_id: &str,
        lang: &str,
        cues: &[Cue],
    ) -> Result<(String, String), UploadError> {
        let vtt = vtt_key(video_id, lang);
        let srt = srt_key(video_id, lang);

        self.artifacts.put(&vtt, to_vtt(cues), VTT_CONTENT_TYPE).await?;
        self.artifacts.put(&srt, to_srt(cues), SRT_CONTENT_TYPE).await?;

        Ok((vtt, srt))
    }

    async fn set_status(&self, video_id: &str, status: JobStatus) -> Result<(), StoreError> {
        tracing::info!(%status, "stage");
        self.store.persist(video_id, &JobPatch::status(status)).await?;
        Ok(())
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

/// Format seconds as a string with two decimal places.
pub fn format_secs(secs: f64) -> String {
    format!("{:.2}s", secs)
}
