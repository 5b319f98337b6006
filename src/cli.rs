//! CLI argument definitions using clap derive macros.

use std::fmt;
use std::path::PathBuf;

use clap::Parser;

use collector_core::config::DownloadMode;
use collector_core::download::DEFAULT_CONCURRENCY;
use collector_core::fetch::DEFAULT_MAX_RETRIES;
use collector_core::fetch::ytdlp::DEFAULT_PROGRAM;

/// Collect metadata and media for hosted video references.
///
/// Accepts single videos and collections (albums, showcases, channels,
/// groups, profiles). Each video becomes one JSON line in the dataset.
#[derive(Parser)]
#[command(name = "video-collector")]
#[command(author, version, about)]
pub struct Args {
    /// Video or collection URLs (read from stdin when empty and no --input)
    pub urls: Vec<String>,

    /// JSON run input document (urls, downloadMode, quality, maxItems, cookies, proxyConfiguration)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Download mode: videos or metadata_only
    #[arg(short, long)]
    pub mode: Option<DownloadMode>,

    /// Quality: best, 1080p, 720p, or audio_only
    #[arg(long)]
    pub quality: Option<String>,

    /// Maximum videos taken from each collection (0 for no limit)
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Cookies file (header string, JSON export, or Netscape cookies.txt)
    #[arg(long, value_name = "FILE")]
    pub cookies_file: Option<PathBuf>,

    /// Proxy URL; repeat to rotate across several
    #[arg(long = "proxy", value_name = "URL")]
    pub proxies: Vec<String>,

    /// Maximum concurrent jobs (1-16)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: u8,

    /// Maximum fetch attempts for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Stop starting new jobs after this many seconds
    #[arg(long, value_name = "SECS")]
    pub max_runtime_secs: Option<u64>,

    /// Write an error record to the dataset for every failed job
    #[arg(long)]
    pub emit_failures: bool,

    /// Dataset output path (JSON lines, appended)
    #[arg(short, long, default_value = "dataset.jsonl")]
    pub output: PathBuf,

    /// Write the run summary as JSON to this path
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Store downloaded media in this directory
    #[arg(long, value_name = "DIR", conflicts_with = "kv_store_url")]
    pub store_dir: Option<PathBuf>,

    /// Public base URL under which --store-dir files are served
    #[arg(long, requires = "store_dir")]
    pub public_base_url: Option<String>,

    /// Base URL of an HTTP key-value store for downloaded media
    #[arg(long, requires = "kv_store_id")]
    pub kv_store_url: Option<String>,

    /// Key-value store id
    #[arg(long, requires = "kv_store_url")]
    pub kv_store_id: Option<String>,

    /// Bearer token for the key-value store
    #[arg(long, env = "COLLECTOR_KV_TOKEN", hide_env_values = true)]
    pub kv_token: Option<String>,

    /// Path to the yt-dlp binary
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    pub ytdlp: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("urls", &self.urls)
            .field("input", &self.input)
            .field("mode", &self.mode)
            .field("quality", &self.quality)
            .field("max_items", &self.max_items)
            .field("cookies_file", &self.cookies_file)
            // Proxy URLs may embed credentials.
            .field("proxies", &self.proxies.len())
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("max_runtime_secs", &self.max_runtime_secs)
            .field("emit_failures", &self.emit_failures)
            .field("output", &self.output)
            .field("summary", &self.summary)
            .field("store_dir", &self.store_dir)
            .field("public_base_url", &self.public_base_url)
            .field("kv_store_url", &self.kv_store_url)
            .field("kv_store_id", &self.kv_store_id)
            .field("kv_token", &self.kv_token.as_ref().map(|_| "[REDACTED]"))
            .field("ytdlp", &self.ytdlp)
            .field("verbose", &self.verbose)
            .field("quiet", &self.quiet)
            .finish()
    }
}
