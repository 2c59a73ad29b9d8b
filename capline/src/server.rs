//! HTTP surface of the caption service.

use crate::queue::{
    AuditEntry, CaptionService, JobView, RUNNING_POSITION, ServiceError, SubmitRequest,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            HttpError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            HttpError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::InvalidRequest(message) => HttpError::BadRequest(message),
            ServiceError::Store(e) => {
                tracing::error!(error = %e, "job store failure");
                HttpError::Internal(e.to_string())
            }
        }
    }
}

type AppState = Arc<CaptionService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/languages", get(languages))
        .route("/captions", post(submit))
        .route("/captions/audit", post(audit))
        .route("/captions/{video_id}", get(status))
        .route("/queue/clear", post(clear_queue))
        .route("/queue/cancel/{video_id}", post(cancel))
        .with_state(service)
}

/// Serve `service` on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    service: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn languages(State(service): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(
        service
            .languages()
            .iter()
            .map(|l| (l.code.clone(), l.name.clone()))
            .collect(),
    )
}

async fn submit(
    State(service): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Value>), HttpError> {
    let submitted = service.submit(request).await?;

    let message = if submitted.position == RUNNING_POSITION {
        "already processing".to_string()
    } else {
        format!("queued at position {}", submitted.position)
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "videoId": submitted.video_id,
            "position": submitted.position,
            "message": message,
        })),
    ))
}

async fn status(
    State(service): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<JobView>, HttpError> {
    service
        .status(&video_id)?
        .map(Json)
        .ok_or_else(|| HttpError::NotFound(format!("no caption job for {video_id:?}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditRequest {
    video_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditResponse {
    incomplete_videos: Vec<AuditEntry>,
}

async fn audit(
    State(service): State<AppState>,
    Json(request): Json<AuditRequest>,
) -> Result<Json<AuditResponse>, HttpError> {
    let incomplete_videos = service.audit(&request.video_ids)?;
    Ok(Json(AuditResponse { incomplete_videos }))
}

async fn clear_queue(State(service): State<AppState>) -> Json<Value> {
    let cleared = service.clear_queue().await;
    Json(json!({ "cleared": cleared }))
}

async fn cancel(
    State(service): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<Value>, HttpError> {
    let cancelled = service.cancel(&video_id).await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::FsArtifactStore;
    use crate::language::Language;
    use crate::llm::{LlmError, TextModel};
    use crate::pipeline::{Captioner, Pipeline, PipelineConfig};
    use crate::store::JobStore;
    use async_trait::async_trait;
    use capline_asr::audio::Ffmpeg;
    use capline_asr::error::ProviderError;
    use capline_asr::traits::Transcriber;
    use capline_asr::types::Transcript;

    struct Idle;

    #[async_trait]
    impl Transcriber for Idle {
        async fn transcribe_file(&self, _path: &std::path::Path) -> Result<Transcript, ProviderError> {
            Ok(Transcript::default())
        }
    }

    #[async_trait]
    impl TextModel for Idle {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            Err(LlmError::EmptyResponse)
        }
    }

    /// Serve a service without a worker, so submitted jobs stay queued.
    async fn spawn_app(dir: &std::path::Path) -> String {
        let config = PipelineConfig {
            scratch_dir: dir.join("scratch"),
            languages: vec![Language::new("es", "Spanish")],
            ..PipelineConfig::default()
        };
        let captioner = Captioner::new(
            config,
            reqwest::Client::new(),
            Ffmpeg::default(),
            Arc::new(Idle),
            Arc::new(Idle),
        );
        let artifacts = Arc::new(FsArtifactStore::new(dir.join("out"), "https://cdn.test"));
        let service = Arc::new(CaptionService::new(Pipeline::new(
            captioner,
            JobStore::temporary().unwrap(),
            artifacts,
        )));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(service)).await });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn submit_then_read_status() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(dir.path()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/captions"))
            .json(&json!({"videoId": "v1", "videoUrl": "https://media.test/v1.mp4"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["videoId"], "v1");
        assert_eq!(body["position"], 1);

        let body: Value = client
            .get(format!("{base}/captions/v1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            body,
            json!({"videoId": "v1", "status": "queued", "tracks": {}, "transcript": null})
        );
    }

    #[tokio::test]
    async fn unknown_video_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(dir.path()).await;

        let response = reqwest::get(format!("{base}/captions/nope")).await.unwrap();

        assert_eq!(response.status(), 404);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn empty_submission_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(dir.path()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/captions"))
            .json(&json!({"videoId": "", "videoUrl": "https://media.test/x.mp4"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn admin_routes() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(dir.path()).await;
        let client = reqwest::Client::new();

        for id in ["a", "b"] {
            client
                .post(format!("{base}/captions"))
                .json(&json!({"videoId": id, "videoUrl": "https://media.test/x.mp4", "language": "es"}))
                .send()
                .await
                .unwrap();
        }

        let body: Value = client
            .post(format!("{base}/queue/cancel/a"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"cancelled": true}));

        let body: Value = client
            .post(format!("{base}/captions/audit"))
            .json(&json!({"videoIds": ["b"]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            body,
            json!({"incompleteVideos": [{"videoId": "b", "missing": ["en", "es"], "status": "queued"}]})
        );

        let body: Value = client
            .post(format!("{base}/queue/clear"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"cleared": 1}));

        let languages: Value = reqwest::get(format!("{base}/languages"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(languages, json!({"es": "Spanish"}));

        let health = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(health.text().await.unwrap(), "ok");
    }
}
