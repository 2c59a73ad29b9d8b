//! Single-worker FIFO job queue and the caption service built on it.

use crate::job::{JobDocument, JobPatch, JobStatus, QueueEntry};
use crate::language::{Language, SOURCE_LANGUAGE, expected_codes};
use crate::pipeline::Pipeline;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Document lookups per audit round trip
pub const AUDIT_BATCH_SIZE: usize = 10;

/// Status reported by audits for ids without a job document
pub const MISSING_STATUS: &str = "missing";

/// Submission position reported for the job currently being processed
pub const RUNNING_POSITION: usize = 0;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// In-memory FIFO of pending jobs.
///
/// `pop` waits until an entry is available, so a single consumer processes jobs strictly one
/// at a time in submission order.
#[derive(Debug, Default)]
pub struct JobQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` and return its 1-based position.
    ///
    /// An id already pending keeps its place; its URL is updated and its position returned.
    pub async fn push(&self, entry: QueueEntry) -> usize {
        let mut entries = self.entries.lock().await;

        if let Some(index) = entries.iter().position(|e| e.video_id == entry.video_id) {
            entries[index] = entry;
            return index + 1;
        }

        entries.push_back(entry);
        let position = entries.len();
        drop(entries);

        self.notify.notify_one();
        position
    }

    /// Wait for and remove the oldest entry.
    pub async fn pop(&self) -> QueueEntry {
        loop {
            let notified = self.notify.notified();
            if let Some(entry) = self.entries.lock().await.pop_front() {
                return entry;
            }
            notified.await;
        }
    }

    /// Drop every pending entry, returning how many were removed.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let cleared = entries.len();
        entries.clear();
        cleared
    }

    /// Remove a pending entry by id.
    pub async fn remove(&self, video_id: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.video_id != video_id);
        entries.len() != before
    }

    /// Pending ids in processing order.
    pub async fn pending(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.video_id.clone())
            .collect()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub video_id: String,
    pub video_url: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitted {
    pub video_id: String,
    pub position: usize,
}

/// Public view of a job.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub video_id: String,
    pub status: JobStatus,
    /// Language code → public VTT URL
    pub tracks: BTreeMap<String, String>,
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub video_id: String,
    pub missing: Vec<String>,
    pub status: String,
}

/// Job intake, status reads and administration around one [`Pipeline`] worker.
pub struct CaptionService {
    pipeline: Arc<Pipeline>,
    queue: JobQueue,
    current: Mutex<Option<(String, CancellationToken)>>,
}

impl CaptionService {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            queue: JobQueue::new(),
            current: Mutex::new(None),
        }
    }

    pub fn languages(&self) -> &[Language] {
        self.pipeline.languages()
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Start the single worker. It exits when `shutdown` is cancelled, cancelling the
    /// running job at its next stage boundary.
    pub fn spawn_worker(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.work(shutdown).await })
    }

    async fn work(&self, shutdown: CancellationToken) {
        tracing::info!("caption worker started");

        loop {
            let entry = tokio::select! {
                _ = shutdown.cancelled() => break,
                entry = self.queue.pop() => entry,
            };

            let cancel = shutdown.child_token();
            *self.current.lock().await = Some((entry.video_id.clone(), cancel.clone()));

            let status = self.pipeline.execute(&entry, &cancel).await;
            tracing::debug!(video_id = %entry.video_id, %status, "worker idle");

            *self.current.lock().await = None;
        }

        tracing::info!("caption worker stopped");
    }

    /// Record the job as `queued` and enqueue it.
    ///
    /// Existing checkpoints are kept, so resubmitting a failed or incomplete job resumes it.
    /// Resubmitting the job the worker is running changes nothing and reports position
    /// [`RUNNING_POSITION`].
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submitted, ServiceError> {
        let video_id = request.video_id.trim();
        let video_url = request.video_url.trim();

        check_video_id(video_id)?;
        if video_url.is_empty() {
            return Err(ServiceError::InvalidRequest("videoUrl is required".into()));
        }

        let language = request
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(SOURCE_LANGUAGE);

        if self.is_running(video_id).await {
            tracing::info!(video_id, "job already running, not requeued");
            return Ok(Submitted {
                video_id: video_id.to_string(),
                position: RUNNING_POSITION,
            });
        }

        self.pipeline
            .store()
            .persist(video_id, &JobPatch::submit(video_url, language))
            .await?;

        let position = self.queue.push(QueueEntry::new(video_id, video_url)).await;
        tracing::info!(video_id, language, position, "job queued");

        Ok(Submitted {
            video_id: video_id.to_string(),
            position,
        })
    }

    pub fn status(&self, video_id: &str) -> Result<Option<JobView>, ServiceError> {
        let Some(doc) = self.pipeline.store().get(video_id)? else {
            return Ok(None);
        };

        let artifacts = self.pipeline.artifacts();
        let tracks = doc
            .vtt_files
            .iter()
            .map(|(lang, key)| (lang.clone(), artifacts.public_url(key)))
            .collect();

        Ok(Some(JobView {
            video_id: doc.video_id,
            status: doc.caption_status,
            tracks,
            transcript: doc.full_transcript,
            error: doc.error_message,
        }))
    }

    /// Videos missing at least one expected caption language.
    pub fn audit(&self, video_ids: &[String]) -> Result<Vec<AuditEntry>, ServiceError> {
        let mut incomplete = Vec::new();

        for batch in video_ids.chunks(AUDIT_BATCH_SIZE) {
            for (video_id, doc) in self.pipeline.store().get_many(batch)? {
                let entry = match doc {
                    Some(doc) => self.audit_document(&doc),
                    None => Some(AuditEntry {
                        missing: self.all_codes(),
                        status: MISSING_STATUS.to_string(),
                        video_id,
                    }),
                };
                incomplete.extend(entry);
            }
        }

        tracing::info!(checked = video_ids.len(), incomplete = incomplete.len(), "audit finished");
        Ok(incomplete)
    }

    fn audit_document(&self, doc: &JobDocument) -> Option<AuditEntry> {
        let expected = expected_codes(&doc.language, self.languages());
        let missing = doc.missing_languages(&expected);

        (!missing.is_empty()).then(|| AuditEntry {
            video_id: doc.video_id.clone(),
            missing,
            status: doc.caption_status.to_string(),
        })
    }

    fn all_codes(&self) -> Vec<String> {
        std::iter::once(SOURCE_LANGUAGE.to_string())
            .chain(self.languages().iter().map(|l| l.code.clone()))
            .collect()
    }

    async fn is_running(&self, video_id: &str) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|(id, _)| id == video_id)
    }

    pub async fn clear_queue(&self) -> usize {
        let cleared = self.queue.clear().await;
        tracing::info!(cleared, "queue cleared");
        cleared
    }

    /// Cancel a pending job, or the running job at its next stage boundary.
    pub async fn cancel(&self, video_id: &str) -> Result<bool, ServiceError> {
        if self.queue.remove(video_id).await {
            self.pipeline
                .store()
                .persist(video_id, &JobPatch::failed("job cancelled"))
                .await?;
            tracing::info!(video_id, "pending job cancelled");
            return Ok(true);
        }

        if let Some((id, token)) = self.current.lock().await.as_ref()
            && id == video_id
        {
            token.cancel();
            tracing::info!(video_id, "running job cancellation requested");
            return Ok(true);
        }

        Ok(false)
    }
}

/// Ids name storage prefixes, so they must be a single safe path segment.
fn check_video_id(video_id: &str) -> Result<(), ServiceError> {
    if video_id.is_empty() {
        return Err(ServiceError::InvalidRequest("videoId is required".into()));
    }
    if video_id == "." || video_id == ".." || video_id.contains(['/', '\\']) {
        return Err(ServiceError::InvalidRequest(format!(
            "videoId {video_id:?} must not contain path separators"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::FsArtifactStore;
    use crate::llm::{LlmError, TextModel};
    use crate::pipeline::{Captioner, PipelineConfig};
    use crate::store::JobStore;
    use async_trait::async_trait;
    use capline_asr::audio::Ffmpeg;
    use capline_asr::error::ProviderError;
    use capline_asr::traits::Transcriber;
    use capline_asr::types::Transcript;
    use std::path::Path;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl Transcriber for Unreachable {
        async fn transcribe_file(&self, _path: &Path) -> Result<Transcript, ProviderError> {
            panic!("transcriber must not be called")
        }
    }

    #[async_trait]
    impl TextModel for Unreachable {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            panic!("model must not be called")
        }
    }

    fn service(dir: &Path) -> CaptionService {
        let config = PipelineConfig {
            scratch_dir: dir.join("scratch"),
            languages: vec![Language::new("es", "Spanish"), Language::new("fr", "French")],
            ..PipelineConfig::default()
        };
        let captioner = Captioner::new(
            config,
            reqwest::Client::new(),
            Ffmpeg::default(),
            Arc::new(Unreachable),
            Arc::new(Unreachable),
        );
        let artifacts = Arc::new(FsArtifactStore::new(dir.join("out"), "https://cdn.test/"));

        CaptionService::new(Pipeline::new(captioner, JobStore::temporary().unwrap(), artifacts))
    }

    fn entry(id: &str) -> QueueEntry {
        QueueEntry::new(id, format!("https://media.test/{id}.mp4"))
    }

    fn request(id: &str, language: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            video_id: id.to_string(),
            video_url: format!("https://media.test/{id}.mp4"),
            language: language.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn queue_is_fifo_and_deduplicates() {
        let queue = JobQueue::new();

        assert_eq!(queue.push(entry("a")).await, 1);
        assert_eq!(queue.push(entry("b")).await, 2);
        assert_eq!(queue.push(entry("a")).await, 1);
        assert_eq!(queue.pending().await, ["a", "b"]);

        assert_eq!(queue.pop().await.video_id, "a");
        assert_eq!(queue.pop().await.video_id, "b");
        assert!(queue.pending().await.is_empty());
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = Arc::new(JobQueue::new());

        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.pop().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.push(entry("late")).await;
        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.video_id, "late");
    }

    #[tokio::test]
    async fn clear_and_remove() {
        let queue = JobQueue::new();
        for id in ["a", "b", "c"] {
            queue.push(entry(id)).await;
        }

        assert!(queue.remove("b").await);
        assert!(!queue.remove("b").await);
        assert_eq!(queue.clear().await, 2);
        assert_eq!(queue.clear().await, 0);
    }

    #[tokio::test]
    async fn submit_persists_queued_document() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let submitted = service.submit(request("v1", Some("es"))).await.unwrap();
        assert_eq!(submitted.position, 1);

        let view = service.status("v1").unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert!(view.tracks.is_empty());
        assert!(view.transcript.is_none());
        assert!(service.status("unknown").unwrap().is_none());
    }

    #[tokio::test]
    async fn resubmitting_running_job_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        service
            .pipeline
            .store()
            .persist("v1", &JobPatch::status(JobStatus::Processing))
            .await
            .unwrap();
        *service.current.lock().await = Some(("v1".to_string(), CancellationToken::new()));

        let submitted = service.submit(request("v1", Some("es"))).await.unwrap();

        assert_eq!(submitted.position, RUNNING_POSITION);
        assert!(service.queue().pending().await.is_empty());
        let view = service.status("v1").unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Processing);

        // other ids still queue while a job runs
        assert_eq!(service.submit(request("v2", None)).await.unwrap().position, 1);
    }

    #[tokio::test]
    async fn submit_rejects_invalid_requests() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        for (id, url) in [("", "u"), ("v", " "), ("a/b", "u"), ("..", "u")] {
            let request = SubmitRequest {
                video_id: id.to_string(),
                video_url: url.to_string(),
                language: None,
            };
            assert!(matches!(
                service.submit(request).await,
                Err(ServiceError::InvalidRequest(_))
            ));
        }
        assert!(service.queue().pending().await.is_empty());
    }

    #[tokio::test]
    async fn status_maps_tracks_to_public_urls() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        service
            .pipeline
            .store()
            .persist(
                "v1",
                &JobPatch::status(JobStatus::Ready)
                    .with_artifacts("en", "captions/v1/en.vtt".into(), "captions/v1/en.srt".into())
                    .with_transcript("Hello.".into()),
            )
            .await
            .unwrap();

        let view = service.status("v1").unwrap().unwrap();

        assert_eq!(view.tracks["en"], "https://cdn.test/captions/v1/en.vtt");
        assert_eq!(view.transcript.as_deref(), Some("Hello."));
    }

    #[tokio::test]
    async fn audit_reports_incomplete_and_unknown_videos() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let store = service.pipeline.store();

        let mut complete = JobPatch::submit("u", "es");
        for lang in ["en", "es", "fr"] {
            complete = complete.with_artifacts(lang, format!("{lang}.vtt"), format!("{lang}.srt"));
        }
        store.persist("done", &complete).await.unwrap();
        store
            .persist(
                "partial",
                &JobPatch::submit("u", "es").with_artifacts("en", "en.vtt".into(), "en.srt".into()),
            )
            .await
            .unwrap();
        store.persist("english", &JobPatch::submit("u", "en")).await.unwrap();

        let mut ids: Vec<String> = ["done", "partial", "english", "ghost"]
            .map(String::from)
            .to_vec();
        ids.extend((0..12).map(|i| format!("bulk{i}")));

        let report = service.audit(&ids).unwrap();

        assert_eq!(report.len(), 15);
        assert_eq!(report[0].video_id, "partial");
        assert_eq!(report[0].missing, ["es", "fr"]);
        assert_eq!(report[0].status, "queued");
        assert_eq!(report[1].video_id, "english");
        assert_eq!(report[1].missing, ["en"]);
        assert_eq!(report[2].video_id, "ghost");
        assert_eq!(report[2].status, MISSING_STATUS);
        assert_eq!(report[2].missing, ["en", "es", "fr"]);
    }

    #[tokio::test]
    async fn cancel_pending_job_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        service.submit(request("v1", None)).await.unwrap();

        assert!(service.cancel("v1").await.unwrap());
        assert!(!service.cancel("v1").await.unwrap());

        let view = service.status("v1").unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Error);
        assert_eq!(view.error.as_deref(), Some("job cancelled"));
    }

    #[tokio::test]
    async fn clear_queue_keeps_documents() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        service.submit(request("v1", None)).await.unwrap();
        service.submit(request("v2", None)).await.unwrap();

        assert_eq!(service.clear_queue().await, 2);
        assert_eq!(service.status("v2").unwrap().unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn worker_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(service(dir.path()));
        let shutdown = CancellationToken::new();

        let worker = service.spawn_worker(shutdown.clone());
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
