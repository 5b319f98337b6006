//! Fetch engine backed by the `yt-dlp` binary.
//!
//! Every call spawns one `yt-dlp` process. Cookies are handed over through a
//! temporary Netscape cookie file that lives only for the duration of the
//! call. Failures are classified from stderr by [`classify_stderr`].

use std::ffi::OsString;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{FetchContext, FetchEngine, FetchError, MediaFile, VideoMetadata};
use crate::parser::{CollectionReference, VideoReference};
use crate::quality::AUDIO_EXTENSION;

/// Default program name, resolved through `PATH`.
pub const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Browser-like User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Timeout for metadata and listing calls.
const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for a media download.
const DEFAULT_MEDIA_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// In-process retries yt-dlp makes for HTTP and fragment errors.
const ENGINE_RETRIES: &str = "3";

/// Extensions considered media output; everything else in the scratch
/// directory (thumbnails, `.part` files, cookie jars) is ignored.
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "mov", "m4v", "m4a", "aac", "opus", "ogg", "wav", "flac", "mp3",
];

/// "DRM" as a word, so URLs and ids that merely contain the letters do not match.
#[allow(clippy::expect_used)]
static DRM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdrm\b").expect("drm regex is valid") // Static pattern, safe to panic
});

/// `yt-dlp` subprocess engine.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: PathBuf,
    user_agent: String,
    metadata_timeout: Duration,
    media_timeout: Duration,
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl YtDlpEngine {
    /// Creates an engine running `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            media_timeout: DEFAULT_MEDIA_TIMEOUT,
        }
    }

    /// Overrides the per-call timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, metadata: Duration, media: Duration) -> Self {
        self.metadata_timeout = metadata;
        self.media_timeout = media;
        self
    }

    /// Overrides the User-Agent header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Arguments shared by every invocation.
    fn common_args(&self, ctx: &FetchContext<'_>, cookie_file: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--no-warnings".into(),
            "--no-progress".into(),
            "--user-agent".into(),
            self.user_agent.clone().into(),
            "--retries".into(),
            ENGINE_RETRIES.into(),
        ];
        if let Some(path) = cookie_file {
            args.push("--cookies".into());
            args.push(path.as_os_str().to_owned());
        }
        if let Some(proxy) = ctx.proxy {
            args.push("--proxy".into());
            args.push(proxy.into());
        }
        args
    }

    /// Runs yt-dlp with `args` and returns stdout on success.
    async fn run(
        &self,
        url: &str,
        ctx: &FetchContext<'_>,
        extra: Vec<OsString>,
        timeout: Duration,
    ) -> Result<Vec<u8>, FetchError> {
        // Dropped (and deleted) when this call returns.
        let cookie_file = write_cookie_file(ctx)?;
        let mut args = self.common_args(ctx, cookie_file.as_ref().map(NamedTempFile::path));
        args.extend(extra);
        args.push("--".into());
        args.push(url.into());

        debug!(program = %self.program.display(), url, "spawning fetch engine");
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FetchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| FetchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?,
            Err(_) => {
                warn!(url, timeout_secs = timeout.as_secs(), "fetch engine timed out");
                return Err(FetchError::transient(
                    url,
                    format!("timed out after {}s", timeout.as_secs()),
                ));
            }
        };

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify_stderr(url, &stderr))
        }
    }
}

#[async_trait]
impl FetchEngine for YtDlpEngine {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    #[instrument(skip(self, ctx), fields(url = %video.url))]
    async fn fetch_metadata(
        &self,
        video: &VideoReference,
        ctx: &FetchContext<'_>,
    ) -> Result<VideoMetadata, FetchError> {
        let extra = vec![
            "--dump-single-json".into(),
            "--skip-download".into(),
            "--no-playlist".into(),
        ];
        let stdout = self
            .run(&video.url, ctx, extra, self.metadata_timeout)
            .await?;
        parse_metadata(&video.url, &stdout)
    }

    #[instrument(skip(self, ctx, workdir), fields(url = %video.url))]
    async fn fetch_media(
        &self,
        video: &VideoReference,
        selector: &str,
        ctx: &FetchContext<'_>,
        workdir: &Path,
    ) -> Result<MediaFile, FetchError> {
        let template = workdir.join("%(id)s.%(ext)s");
        let mut extra: Vec<OsString> = vec![
            "--no-playlist".into(),
            "--fragment-retries".into(),
            ENGINE_RETRIES.into(),
            "-f".into(),
            selector.into(),
            "-o".into(),
            template.into_os_string(),
        ];
        if ctx.quality.audio_only() {
            extra.extend([
                "-x".into(),
                "--audio-format".into(),
                AUDIO_EXTENSION.into(),
                "--audio-quality".into(),
                "192K".into(),
            ]);
        } else {
            extra.extend(["--merge-output-format".into(), "mp4".into()]);
        }

        self.run(&video.url, ctx, extra, self.media_timeout)
            .await
            .map_err(|e| match e {
                FetchError::FormatUnavailable { .. } => {
                    FetchError::format_unavailable(&video.url, selector)
                }
                other => other,
            })?;

        let path = find_media_file(workdir).await?.ok_or_else(|| FetchError::InvalidResponse {
            url: video.url.clone(),
            message: "engine reported success but produced no media file".to_string(),
        })?;
        let file_size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| FetchError::io(&path, e))?
            .len();
        let file_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        debug!(path = %path.display(), file_size, "media fetched");
        Ok(MediaFile {
            path,
            file_size,
            file_extension,
            downloaded_format: selector.to_string(),
        })
    }

    #[instrument(skip(self, ctx), fields(url = %collection.url))]
    async fn list_collection(
        &self,
        collection: &CollectionReference,
        ctx: &FetchContext<'_>,
    ) -> Result<Vec<String>, FetchError> {
        let mut extra: Vec<OsString> = vec!["--dump-single-json".into(), "--flat-playlist".into()];
        if collection.max_items > 0 {
            extra.push("--playlist-end".into());
            extra.push(collection.max_items.to_string().into());
        }
        let stdout = self
            .run(&collection.url, ctx, extra, self.metadata_timeout)
            .await?;
        let mut urls = parse_listing(&collection.url, &stdout)?;
        if collection.max_items > 0 {
            urls.truncate(collection.max_items);
        }
        Ok(urls)
    }
}

/// Writes the credential to a temporary Netscape cookie file, if non-empty.
fn write_cookie_file(ctx: &FetchContext<'_>) -> Result<Option<NamedTempFile>, FetchError> {
    if ctx.credential.is_empty() {
        return Ok(None);
    }
    let mut file = tempfile::Builder::new()
        .prefix("cookies-")
        .suffix(".txt")
        .tempfile()
        .map_err(|e| FetchError::io(std::env::temp_dir(), e))?;
    file.write_all(ctx.credential.to_netscape().as_bytes())
        .map_err(|e| FetchError::io(file.path(), e))?;
    file.flush().map_err(|e| FetchError::io(file.path(), e))?;
    Ok(Some(file))
}

/// Most recently modified media file in `dir`.
async fn find_media_file(dir: &Path) -> Result<Option<PathBuf>, FetchError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FetchError::io(dir, e))?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FetchError::io(dir, e))?
    {
        let path = entry.path();
        let is_media = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if !is_media {
            continue;
        }
        let modified = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .map_err(|e| FetchError::io(&path, e))?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    description: Option<String>,
    upload_date: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    like_count: Option<u64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistJson {
    #[serde(default)]
    entries: Vec<Option<EntryJson>>,
}

#[derive(Debug, Deserialize)]
struct EntryJson {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
}

/// Parses `--dump-single-json` output for one video.
fn parse_metadata(url: &str, stdout: &[u8]) -> Result<VideoMetadata, FetchError> {
    let info: InfoJson = serde_json::from_slice(stdout).map_err(|e| FetchError::InvalidResponse {
        url: url.to_string(),
        message: format!("metadata JSON: {e}"),
    })?;

    Ok(VideoMetadata {
        video_id: info.id,
        title: info.title,
        author: info.uploader,
        description: info.description,
        publish_date: info.upload_date.map(|d| format_upload_date(&d)),
        duration: info.duration,
        view_count: info.view_count,
        like_count: info.like_count,
        thumbnail: info.thumbnail,
        webpage_url: info.webpage_url,
    })
}

/// Parses `--flat-playlist` output into member URLs, in listing order.
fn parse_listing(url: &str, stdout: &[u8]) -> Result<Vec<String>, FetchError> {
    let playlist: PlaylistJson =
        serde_json::from_slice(stdout).map_err(|e| FetchError::InvalidResponse {
            url: url.to_string(),
            message: format!("listing JSON: {e}"),
        })?;

    Ok(playlist
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            entry
                .webpage_url
                .or_else(|| entry.url.filter(|u| u.starts_with("http")))
                .or_else(|| entry.id.map(|id| format!("https://vimeo.com/{id}")))
        })
        .collect())
}

/// `YYYYMMDD` to `YYYY-MM-DD`; anything else is kept as is.
fn format_upload_date(raw: &str) -> String {
    match chrono::NaiveDate::parse_from_str(raw, "%Y%m%d") {
        Ok(date) => date.format("%Y-%m-%d").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Maps yt-dlp stderr to a [`FetchError`].
///
/// Only the last `ERROR` line (or the last non-empty line when there is
/// none) is inspected. For [`FetchError::FormatUnavailable`] the `selector`
/// field carries the engine's message; callers that know the selector
/// replace it.
#[must_use]
pub fn classify_stderr(url: &str, stderr: &str) -> FetchError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or("fetch engine failed without output")
        .trim()
        .to_string();
    let lower = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["requested format is not available"]) {
        return FetchError::FormatUnavailable {
            url: url.to_string(),
            selector: message,
        };
    }
    if DRM_PATTERN.is_match(&message) {
        return FetchError::unsupported(url, message);
    }
    if has(&["http error 429", "too many requests"]) {
        return FetchError::RateLimited {
            url: url.to_string(),
            message,
        };
    }
    if has(&[
        "http error 500",
        "http error 502",
        "http error 503",
        "http error 504",
        "timed out",
        "connection reset",
        "temporary failure in name resolution",
        "incompleteread",
    ]) {
        return FetchError::transient(url, message);
    }
    if has(&[
        "logged-in",
        "log in",
        "login",
        "authentication",
        "http error 401",
        "http error 403",
        "password",
    ]) {
        return FetchError::AuthRequired {
            url: url.to_string(),
            message,
        };
    }
    if has(&[
        "private",
        "http error 404",
        "not found",
        "removed",
        "does not exist",
        "unavailable",
    ]) {
        return FetchError::unavailable(url, message);
    }
    FetchError::permanent(url, message)
}
