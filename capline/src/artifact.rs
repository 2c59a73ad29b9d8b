//! Object storage for rendered caption files.

use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const VTT_CONTENT_TYPE: &str = "text/vtt; charset=utf-8";
pub const SRT_CONTENT_TYPE: &str = "application/x-subrip; charset=utf-8";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid artifact key {0:?}")]
    InvalidKey(String),

    #[error("failed to write artifact {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact upload failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("artifact store returned HTTP {status} for {key}")]
    Status { key: String, status: u16 },
}

/// Storage key of a VTT track.
pub fn vtt_key(video_id: &str, lang: &str) -> String {
    format!("captions/{video_id}/{lang}.vtt")
}

/// Storage key of an SRT track.
pub fn srt_key(video_id: &str, lang: &str) -> String {
    format!("captions/{video_id}/{lang}.srt")
}

/// Write-only object store addressed by `/`-separated keys.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, body: String, content_type: &str) -> Result<(), UploadError>;

    /// Public URL under which `key` is served.
    fn public_url(&self, key: &str) -> String;
}

#[async_trait]
impl<T: ArtifactStore + ?Sized> ArtifactStore for std::sync::Arc<T> {
    async fn put(&self, key: &str, body: String, content_type: &str) -> Result<(), UploadError> {
        (**self).put(key, body, content_type).await
    }

    fn public_url(&self, key: &str) -> String {
        (**self).public_url(key)
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Reject keys that could escape the store root.
fn check_key(key: &str) -> Result<(), UploadError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != ".." && !part.contains('\\'));

    if valid {
        Ok(())
    } else {
        Err(UploadError::InvalidKey(key.to_string()))
    }
}

/// Artifacts written below a local directory, typically served by a static file server.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    pub root: PathBuf,
    pub public_base: String,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into(),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, body: String, _content_type: &str) -> Result<(), UploadError> {
        check_key(key)?;
        let path = self.root.join(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| UploadError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&path, body)
            .await
            .map_err(|source| UploadError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(key, path = %path.display(), "artifact written");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base, key)
    }
}

/// Artifacts uploaded with `PUT {base_url}/{key}` (S3-compatible presigned gateways, R2 workers).
#[derive(Clone, Debug)]
pub struct HttpArtifactStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    public_base: String,
}

impl HttpArtifactStore {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        public_base: impl Into<String>,
    ) -> Result<Self, UploadError> {
        let client = Client::builder()
            .user_agent(concat!("capline/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
            public_base: public_base.into(),
        })
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn put(&self, key: &str, body: String, content_type: &str) -> Result<(), UploadError> {
        check_key(key)?;

        let mut request = self
            .client
            .put(join_url(&self.base_url, key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        tracing::debug!(key, "artifact uploaded");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base, key)
    }
}
