//! Job scheduling, execution, and run reporting.
//!
//! A run goes through three stages:
//!
//! 1. [`expand_references`] lists collections and de-duplicates videos,
//!    producing the final scheduling order
//! 2. [`Collector`] processes each slot under a concurrency bound
//! 3. Records reach the output sink in scheduling order and the run
//!    finishes with a [`RunReport`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use collector_core::config::{DownloadMode, RunInput, UrlsInput};
//! use collector_core::download::{Collector, collect};
//! use collector_core::fetch::{Retrying, RetryPolicy, YtDlpEngine};
//! use collector_core::output::JsonLinesSink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Retrying::new(YtDlpEngine::default(), RetryPolicy::default());
//! let sink = JsonLinesSink::open("dataset.jsonl").await?;
//! let collector = Collector::new(4, Arc::new(engine), Arc::new(sink))?;
//!
//! let mut input = RunInput::new(UrlsInput::Text("https://vimeo.com/channels/staffpicks".into()));
//! input.download_mode = DownloadMode::MetadataOnly;
//! let report = collect(input, &collector).await?;
//! println!("{} succeeded, {} failed", report.succeeded, report.failed);
//! # Ok(())
//! # }
//! ```

mod expander;
mod job;
mod report;
mod runner;

pub use expander::{Expansion, ScheduledItem, expand_references};
pub use job::{DownloadJob, JobError, JobErrorKind, JobFailure, JobState};
pub use report::{RunOutcome, RunReport};
pub use runner::{
    Collector, DEFAULT_CONCURRENCY, FailurePolicy, MAX_CONCURRENCY, MIN_CONCURRENCY, collect,
};
