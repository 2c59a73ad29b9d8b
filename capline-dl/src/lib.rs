//! Media retrieval into local scratch storage.
//!
//! ## Modules
//!
//! - [`dl`] - Streaming download of a remote (or `file://`) resource
//!
//! ## Quick Start
//!
//! ```no_run
//! use capline_dl::dl::{DownloadOptions, download, http_client};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = http_client()?;
//! let opts = DownloadOptions::new(std::env::temp_dir());
//! let path = download(&client, "https://example.com/lesson.mp4", &opts).await?;
//! println!("saved to {}", path.display());
//! # Ok(())
//! # }
//! ```
//!
//! The caller owns the returned file and is responsible for deleting it.

pub mod dl;
