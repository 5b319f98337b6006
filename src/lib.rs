//! Video Collector Core Library
//!
//! Turns a list of hosted video references (single videos and collections)
//! into download jobs, runs them under a concurrency bound, and emits one
//! structured dataset record per video in input order.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Cookie parsing into a canonical credential
//! - [`config`] - Run input document and the validated run plan
//! - [`download`] - Collection expansion, job runner, run report
//! - [`fetch`] - Fetch engine seam, retry decorator, yt-dlp engine
//! - [`output`] - Dataset records and output sinks
//! - [`parser`] - URL normalization, classification, de-duplication
//! - [`proxy`] - Proxy rotation
//! - [`quality`] - Quality labels and format selectors
//! - [`store`] - Media stores (filesystem, HTTP key-value)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod download;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod proxy;
pub mod quality;
pub mod store;

// Re-export commonly used types
pub use auth::{Credential, parse_cookies};
pub use config::{DownloadMode, RunError, RunInput, RunPlan, UrlsInput};
pub use download::{Collector, FailurePolicy, RunOutcome, RunReport, collect};
pub use fetch::{FetchEngine, FetchError, RetryPolicy, Retrying, YtDlpEngine};
pub use output::{DatasetItem, JsonLinesSink, MemorySink, OutputRecord, OutputSink};
pub use parser::{NormalizeResult, Reference, normalize_urls};
pub use quality::{Quality, QualityPolicy, resolve_quality};
pub use store::{DirectoryStore, KeyValueStore, MediaStore};
