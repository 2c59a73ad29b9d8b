//! Cap subcommand - caption one media URL or file to VTT and SRT.

use crate::cli::{PipelineArgs, ProviderArgs};
use crate::config::{ProviderConfig, StageConfig};
use crate::language::{Language, parse_language};
use crate::pipeline::{Captioner, format_secs};
use crate::subtitle::{preview_subtitles, to_srt, to_subtitles, to_vtt};
use capline_asr::types::Cue;
use color_eyre::Section;
use eyre::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use url::Url;

/// CLI arguments for one-shot caption generation.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Media URL (http, https, file) or local path
    pub input: String,

    /// Output path stem; writes <stem>.vtt, <stem>.srt and <stem>.<lang>.vtt
    /// (default: input file stem in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run the grammar and punctuation polish pass
    #[arg(long)]
    pub polish: bool,

    /// Also translate into this language, code or code=Name (repeatable)
    #[arg(long = "lang", value_parser = parse_language)]
    pub languages: Vec<Language>,

    /// Print the first and last captions to stdout
    #[arg(long)]
    pub preview: bool,

    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Resolved configuration for one-shot caption generation.
#[derive(Debug)]
pub struct Config {
    pub url: String,
    pub output: PathBuf,
    pub polish: bool,
    pub preview: bool,
    pub languages: Vec<Language>,
    pub provider: ProviderConfig,
    pub stages: StageConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let (url, output) = resolve_input(&args.input)?;

        Ok(Self {
            url,
            output: args.output.unwrap_or(output),
            polish: args.polish,
            preview: args.preview,
            languages: args.languages,
            provider: args.provider.try_into()?,
            stages: args.pipeline.try_into()?,
        })
    }
}

/// Turn the input into a fetchable URL and a default output stem.
///
/// Existing local paths become `file://` URLs and keep their directory; URLs write into the
/// current directory under their last path segment.
fn resolve_input(input: &str) -> Result<(String, PathBuf)> {
    let path = Path::new(input);

    if path.exists() {
        let absolute = std::fs::canonicalize(path)
            .wrap_err_with(|| format!("failed to resolve input path: {input:?}"))?;
        let url = Url::from_file_path(&absolute)
            .map_err(|()| eyre::eyre!("input path is not absolute: {:?}", absolute.display()))?;
        return Ok((url.to_string(), absolute.with_extension("")));
    }

    let url = Url::parse(input)
        .wrap_err_with(|| format!("input is neither an existing file nor a URL: {input:?}"))
        .suggestion("pass a local media path or an http(s) URL")?;

    let stem = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|name| Path::new(name).with_extension(""))
        .filter(|stem| !stem.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("captions"));

    Ok((url.to_string(), stem))
}

pub async fn execute(config: Config) -> Result<()> {
    tracing::info!(
        url = %config.url,
        output = ?config.output.display(),
        polish = config.polish,
        languages = config.languages.len(),
        "generating captions"
    );

    let s = Instant::now();

    let captioner = config
        .stages
        .captioner(&config.provider, config.languages.clone())?;

    let cues = caption(&captioner, &config.url, config.polish)
        .await
        .suggestion("check that ffmpeg is on PATH and the provider API key is valid")?;

    write_tracks(&config.output, None, &cues)?;

    for language in &config.languages {
        match captioner.translate(&cues, language).await {
            Ok(translated) => write_tracks(&config.output, Some(&language.code), &translated)?,
            Err(e) => tracing::warn!(lang = %language.code, error = %e, "translation failed"),
        }
    }

    if config.preview {
        print!("{}", preview_subtitles(&to_subtitles(&cues), 3, 3));
    }

    tracing::info!(
        cues = cues.len(),
        elapsed = %format_secs(s.elapsed().as_secs_f64()),
        "captions written"
    );

    Ok(())
}

/// Transcribe and segment `url`, optionally polishing the cues.
async fn caption(captioner: &Captioner, url: &str, polish: bool) -> Result<Vec<Cue>> {
    let scratch = captioner.scratch().await?;
    let transcript = captioner.transcribe(url, scratch.path()).await?;
    drop(scratch);

    let cues = captioner.segment(&transcript);
    if !polish {
        return Ok(cues);
    }

    captioner.polish(&cues).await.wrap_err("polish failed")
}

/// Write `<stem>.vtt` and `<stem>.srt`, or `<stem>.<lang>.*` for translations.
fn write_tracks(stem: &Path, lang: Option<&str>, cues: &[Cue]) -> Result<()> {
    for (ext, body) in [("vtt", to_vtt(cues)), ("srt", to_srt(cues))] {
        let path = track_path(stem, lang, ext);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create output dir: {:?}", parent.display()))?;
        }

        std::fs::write(&path, body)
            .wrap_err_with(|| format!("failed to write captions: {:?}", path.display()))?;

        tracing::info!(path = ?path.display(), "write caption file");
    }

    Ok(())
}

fn track_path(stem: &Path, lang: Option<&str>, ext: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    if let Some(lang) = lang {
        name.push(format!(".{lang}"));
    }
    name.push(format!(".{ext}"));
    PathBuf::from(name)
}
