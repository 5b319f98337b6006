//! CLI entry point for the video collector.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use collector_core::config::{DownloadMode, RunInput, UrlsInput};
use collector_core::download::{Collector, FailurePolicy, RunOutcome, RunReport};
use collector_core::fetch::{RetryPolicy, Retrying, YtDlpEngine};
use collector_core::output::JsonLinesSink;
use collector_core::store::{DirectoryStore, KeyValueStore, MediaStore};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

/// Exit code for run-level errors (bad input, sink failure).
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(RunOutcome::Success | RunOutcome::Partial) => ExitCode::SUCCESS,
        Ok(RunOutcome::Failure) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(args: Args) -> Result<RunOutcome> {
    let input = build_input(&args)?;
    let mode = input.download_mode;
    let plan = input.into_plan()?;

    info!(
        references = plan.references().len(),
        mode = %mode,
        "video collector starting"
    );

    let retry_policy = RetryPolicy::with_max_attempts(u32::from(args.max_retries));
    let engine = Retrying::new(YtDlpEngine::new(&args.ytdlp), retry_policy);
    // Resolved before the dataset is opened so a bad store setup leaves no file behind.
    let store = match mode {
        DownloadMode::Videos => Some(build_store(&args)?),
        DownloadMode::MetadataOnly => None,
    };
    let sink = JsonLinesSink::open(&args.output)
        .await
        .with_context(|| format!("cannot open dataset {}", args.output.display()))?;

    let failure_policy = if args.emit_failures {
        FailurePolicy::EmitErrorRecord
    } else {
        FailurePolicy::LogOnly
    };
    let mut collector = Collector::new(
        usize::from(args.concurrency),
        Arc::new(engine),
        Arc::new(sink),
    )?
    .with_failure_policy(failure_policy);

    if let Some(store) = store {
        collector = collector.with_store(store);
    }
    if let Some(secs) = args.max_runtime_secs {
        collector = collector.with_max_runtime(Duration::from_secs(secs));
    }

    let token = collector.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            token.cancel();
        }
    });

    let report = collector.run(plan).await?;

    if let Some(path) = &args.summary {
        write_summary(&report, path).await?;
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        records = report.records_emitted,
        dataset = %args.output.display(),
        "collection complete"
    );

    Ok(report.outcome())
}

/// Assembles the run input from `--input`, stdin, positional URLs and flags.
/// Flags override fields of the input document.
fn build_input(args: &Args) -> Result<RunInput> {
    let mut input = match &args.input {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read input file {}", path.display()))?;
            RunInput::from_json(&raw)?
        }
        None => RunInput::default(),
    };

    if !args.urls.is_empty() {
        input.urls = Some(UrlsInput::List(args.urls.clone()));
    } else if input.urls.is_none() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        input.urls = Some(UrlsInput::Text(buffer));
    }

    if let Some(mode) = args.mode {
        input.download_mode = mode;
    }
    if let Some(quality) = &args.quality {
        input.quality = Some(quality.clone());
    }
    if let Some(max_items) = args.max_items {
        input.max_items = max_items;
    }
    if let Some(path) = &args.cookies_file {
        let cookies = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read cookies file {}", path.display()))?;
        input.cookies = Some(cookies);
    }
    if !args.proxies.is_empty() {
        input.proxy_configuration = Some(serde_json::json!({ "proxyUrls": args.proxies }));
    }

    Ok(input)
}

fn build_store(args: &Args) -> Result<Arc<dyn MediaStore>> {
    if let (Some(url), Some(id)) = (&args.kv_store_url, &args.kv_store_id) {
        let store = KeyValueStore::new(url, id.clone(), args.kv_token.clone())?;
        return Ok(Arc::new(store));
    }
    let Some(dir) = &args.store_dir else {
        anyhow::bail!(
            "videos mode needs a media store: pass --store-dir or --kv-store-url/--kv-store-id, \
             or use --mode metadata_only"
        );
    };
    let base = match &args.public_base_url {
        Some(base) => base.clone(),
        None => {
            let absolute = std::path::absolute(dir)
                .with_context(|| format!("cannot resolve store directory {}", dir.display()))?;
            format!("file://{}", absolute.display())
        }
    };
    Ok(Arc::new(DirectoryStore::new(dir, base)))
}

async fn write_summary(report: &RunReport, path: &std::path::Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("cannot write summary {}", path.display()))?;
    debug!(path = %path.display(), "summary written");
    Ok(())
}
