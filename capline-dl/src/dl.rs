//! Streaming media download.
//!
//! Resources are written to a uniquely named file inside [`DownloadOptions::dir`]. HTTP(S)
//! bodies are streamed chunk by chunk so large videos never sit in memory; `file://` URLs are
//! copied from the local filesystem.

use reqwest::Client;
use reqwest::redirect::Policy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Maximum number of redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

/// Default whole-download timeout (media files can be large).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Extension for downloads whose URL names none.
pub const DEFAULT_EXTENSION: &str = "mp4";

const USER_AGENT: &str = concat!("capline-dl/", env!("CARGO_PKG_VERSION"));

/// Download failures.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// URL could not be parsed
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Scheme other than http, https or file
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    /// Final response status was not a success
    #[error("download failed: {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Provider answered with an empty body
    #[error("downloaded file is empty (0 bytes): {url}")]
    Empty { url: String },

    /// Transport error
    #[error("download failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Local filesystem error
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// Where and how a download is stored.
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    /// Scratch directory receiving the file
    pub dir: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl DownloadOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "media_".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client configured for media downloads (bounded redirects).
pub fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()?)
}

/// Download `url` into a new scratch file and return its path.
///
/// A zero-byte result is deleted and reported as [`DownloadError::Empty`]. Any other failure
/// after the scratch file was created deletes the partial file before returning.
pub async fn download(client: &Client, url: &str, opts: &DownloadOptions) -> Result<PathBuf> {
    let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" | "file" => {}
        other => return Err(DownloadError::UnsupportedScheme(other.to_string())),
    }

    tokio::fs::create_dir_all(&opts.dir)
        .await
        .map_err(DownloadError::io(&opts.dir))?;

    let (file, path) = tempfile::Builder::new()
        .prefix(&opts.prefix)
        .suffix(&format!(".{}", media_extension(&parsed)))
        .tempfile_in(&opts.dir)
        .and_then(|f| f.keep().map_err(|e| e.error))
        .map_err(DownloadError::io(&opts.dir))?;

    tracing::info!(url, path = %path.display(), "starting download");

    let written = if parsed.scheme() == "file" {
        drop(file);
        copy_local(&parsed, &path).await
    } else {
        fetch_remote(client, url, File::from_std(file), &path, opts.timeout).await
    };

    match written {
        Ok(0) => {
            remove_quietly(&path).await;
            Err(DownloadError::Empty {
                url: url.to_string(),
            })
        }
        Ok(bytes) => {
            tracing::info!(bytes, path = %path.display(), "download saved");
            Ok(path)
        }
        Err(e) => {
            remove_quietly(&path).await;
            tracing::error!(url, error = %e, "download failed");
            Err(e)
        }
    }
}

/// Extension of the URL's last path segment, lowercased, or [`DEFAULT_EXTENSION`].
///
/// Downstream tools pick container formats and upload content types from the file name.
fn media_extension(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

async fn fetch_remote(
    client: &Client,
    url: &str,
    mut file: File,
    path: &Path,
    timeout: Duration,
) -> Result<u64> {
    let mut response = client.get(url).timeout(timeout).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let mut bytes = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(DownloadError::io(path))?;
        bytes += chunk.len() as u64;
    }
    file.flush().await.map_err(DownloadError::io(path))?;

    Ok(bytes)
}

async fn copy_local(url: &Url, path: &Path) -> Result<u64> {
    let source = url
        .to_file_path()
        .map_err(|()| DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;

    tokio::fs::copy(&source, path)
        .await
        .map_err(DownloadError::io(&source))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "failed to remove partial download");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_url(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn copies_local_file() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("lesson.mp4");
        std::fs::write(&src, b"not really a video").unwrap();

        let client = http_client().unwrap();
        let opts = DownloadOptions::new(scratch.path()).with_prefix("video_");
        let path = download(&client, &file_url(&src), &opts).await.unwrap();

        assert!(path.starts_with(scratch.path()));
        assert!(
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("video_"))
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"not really a video");
    }

    #[tokio::test]
    async fn keeps_source_extension() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("talk.MP4");
        std::fs::write(&src, b"mp4 bytes").unwrap();

        let client = http_client().unwrap();
        let opts = DownloadOptions::new(scratch.path());
        let path = download(&client, &file_url(&src), &opts).await.unwrap();

        assert_eq!(path.extension().unwrap(), "mp4");
    }

    #[test]
    fn extension_falls_back_to_mp4() {
        let ext = |url: &str| media_extension(&Url::parse(url).unwrap());

        assert_eq!(ext("https://cdn.test/media/lesson.webm?sig=abc"), "webm");
        assert_eq!(ext("https://cdn.test/watch?v=123"), "mp4");
        assert_eq!(ext("https://cdn.test/"), "mp4");
        assert_eq!(ext("https://cdn.test/file.not-an-ext"), "mp4");
    }

    #[tokio::test]
    async fn unique_names_per_download() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("a.mp3");
        std::fs::write(&src, b"abc").unwrap();

        let client = http_client().unwrap();
        let opts = DownloadOptions::new(scratch.path());
        let first = download(&client, &file_url(&src), &opts).await.unwrap();
        let second = download(&client, &file_url(&src), &opts).await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn rejects_and_deletes_empty_file() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("empty.mp4");
        std::fs::write(&src, b"").unwrap();

        let client = http_client().unwrap();
        let opts = DownloadOptions::new(scratch.path());
        let result = download(&client, &file_url(&src), &opts).await;

        assert!(matches!(result, Err(DownloadError::Empty { .. })));
        assert_eq!(entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn missing_source_leaves_no_partial_file() {
        let scratch = tempfile::tempdir().unwrap();
        let missing = scratch.path().join("nope").join("missing.mp4");

        let client = http_client().unwrap();
        let opts = DownloadOptions::new(scratch.path().join("out"));
        let result = download(&client, &file_url(&missing), &opts).await;

        assert!(matches!(result, Err(DownloadError::Io { .. })));
        assert_eq!(entries(&scratch.path().join("out")), 0);
    }

    #[tokio::test]
    async fn rejects_unsupported_scheme() {
        let scratch = tempfile::tempdir().unwrap();
        let client = http_client().unwrap();
        let opts = DownloadOptions::new(scratch.path());

        let result = download(&client, "ftp://example.com/video.mp4", &opts).await;

        assert!(matches!(result, Err(DownloadError::UnsupportedScheme(s)) if s == "ftp"));
    }

    #[tokio::test]
    async fn rejects_invalid_url() {
        let scratch = tempfile::tempdir().unwrap();
        let client = http_client().unwrap();
        let opts = DownloadOptions::new(scratch.path());

        let result = download(&client, "not a url", &opts).await;

        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }
}
