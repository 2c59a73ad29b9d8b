//! Serve subcommand - run the caption worker and HTTP API.

use crate::artifact::{ArtifactStore, FsArtifactStore, HttpArtifactStore};
use crate::cli::{PipelineArgs, ProviderArgs};
use crate::config::{ProviderConfig, StageConfig};
use crate::language::{Language, default_targets, parse_language};
use crate::pipeline::Pipeline;
use crate::queue::CaptionService;
use crate::store::JobStore;
use color_eyre::Section;
use eyre::{Context, OptionExt, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Name of the sled database inside the data directory.
const JOB_DB: &str = "jobs.sled";

/// CLI arguments for the caption service.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Listen address
    #[arg(long, env = "CAPLINE_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Directory holding the job database and local caption files (default: user data dir)
    #[arg(long, env = "CAPLINE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Translation target as code or code=Name, repeatable (default: built-in set)
    #[arg(long = "lang", value_parser = parse_language)]
    pub languages: Vec<Language>,

    #[command(flatten)]
    pub artifacts: ArtifactArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Caption file storage arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct ArtifactArgs {
    /// Upload caption files with HTTP PUT under this base URL instead of writing them locally
    #[arg(long, env = "CAPLINE_UPLOAD_URL")]
    pub upload_url: Option<String>,

    /// Bearer token for uploads
    #[arg(long, env = "CAPLINE_UPLOAD_TOKEN", hide_env_values = true)]
    pub upload_token: Option<String>,

    /// Public base URL of stored caption files (default: upload URL or local directory)
    #[arg(long, env = "CAPLINE_PUBLIC_URL")]
    pub public_url: Option<String>,
}

/// Where caption files go.
#[derive(Debug)]
pub enum ArtifactTarget {
    Local { root: PathBuf, public_base: String },
    Http {
        base_url: String,
        token: Option<String>,
        public_base: String,
    },
}

impl ArtifactTarget {
    fn resolve(args: ArtifactArgs, data_dir: &std::path::Path) -> Self {
        match args.upload_url {
            Some(base_url) => Self::Http {
                public_base: args.public_url.unwrap_or_else(|| base_url.clone()),
                token: args.upload_token,
                base_url,
            },
            None => {
                let root = data_dir.join("artifacts");
                Self::Local {
                    public_base: args
                        .public_url
                        .unwrap_or_else(|| root.display().to_string()),
                    root,
                }
            }
        }
    }

    fn build(self) -> Result<Arc<dyn ArtifactStore>> {
        Ok(match self {
            Self::Local { root, public_base } => Arc::new(FsArtifactStore::new(root, public_base)),
            Self::Http {
                base_url,
                token,
                public_base,
            } => Arc::new(
                HttpArtifactStore::new(base_url, token, public_base)
                    .wrap_err("failed to build upload client")?,
            ),
        })
    }
}

/// Resolved configuration for the caption service.
#[derive(Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub languages: Vec<Language>,
    pub artifacts: ArtifactTarget,
    pub provider: ProviderConfig,
    pub stages: StageConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let data_dir = match args.data_dir {
            Some(dir) => dir,
            None => dirs::data_dir()
                .ok_or_eyre("no user data directory on this platform")
                .suggestion("pass --data-dir or set CAPLINE_DATA_DIR")?
                .join("capline"),
        };

        let languages = if args.languages.is_empty() {
            default_targets()
        } else {
            args.languages
        };

        Ok(Self {
            bind: args.bind,
            artifacts: ArtifactTarget::resolve(args.artifacts, &data_dir),
            data_dir,
            languages,
            provider: args.provider.try_into()?,
            stages: args.pipeline.try_into()?,
        })
    }
}

pub async fn execute(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)
        .wrap_err_with(|| format!("failed to create data dir: {:?}", config.data_dir.display()))?;

    let db_path = config.data_dir.join(JOB_DB);
    let store = JobStore::open(&db_path)
        .wrap_err_with(|| format!("failed to open job store: {:?}", db_path.display()))
        .suggestion("another capline process may hold the database lock")?;

    let codes: Vec<&str> = config.languages.iter().map(|l| l.code.as_str()).collect();
    tracing::info!(
        data_dir = ?config.data_dir.display(),
        languages = ?codes,
        artifacts = ?config.artifacts,
        "starting caption service"
    );

    let artifacts = config.artifacts.build()?;
    let captioner = config
        .stages
        .captioner(&config.provider, config.languages)?;
    let service = Arc::new(CaptionService::new(Pipeline::new(captioner, store, artifacts)));

    let shutdown = CancellationToken::new();
    let worker = service.spawn_worker(shutdown.clone());

    let signal = {
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        }
    };

    let served = crate::server::serve(config.bind, Arc::clone(&service), signal)
        .await
        .wrap_err_with(|| format!("http server failed on {}", config.bind));

    shutdown.cancel();
    worker.await.wrap_err("caption worker panicked")?;

    served
}
