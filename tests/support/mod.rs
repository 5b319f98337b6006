//! Shared test doubles for integration tests: a scripted fetch engine, a
//! recording media store, and a sink that fails on demand.

#![allow(dead_code)]

pub mod socket_guard;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use collector_core::fetch::{FetchContext, FetchEngine, FetchError, MediaFile, VideoMetadata};
use collector_core::output::{DatasetItem, OutputSink, SinkError};
use collector_core::parser::{CollectionReference, VideoReference};
use collector_core::store::{MediaStore, StoreError, StoredObject};

/// How a scripted video fails.
#[derive(Debug, Clone)]
pub enum Failure {
    Unavailable(&'static str),
    Unsupported(&'static str),
    Transient(&'static str),
}

impl Failure {
    fn to_error(&self, url: &str) -> FetchError {
        match self {
            Self::Unavailable(msg) => FetchError::unavailable(url, *msg),
            Self::Unsupported(msg) => FetchError::unsupported(url, *msg),
            Self::Transient(msg) => FetchError::transient(url, *msg),
        }
    }
}

/// In-memory fetch engine. Videos not explicitly scripted succeed with
/// generated metadata.
#[derive(Default)]
pub struct ScriptedEngine {
    failures: HashMap<String, Failure>,
    media_failures: HashMap<String, Failure>,
    collections: HashMap<String, Result<Vec<String>, Failure>>,
    missing_selectors: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub metadata_calls: AtomicUsize,
    pub media_calls: AtomicUsize,
    pub listing_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    selectors: Mutex<Vec<String>>,
    proxies: Mutex<Vec<Option<String>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for `canonical_id` fails.
    pub fn failing(mut self, canonical_id: &str, failure: Failure) -> Self {
        self.failures.insert(canonical_id.to_string(), failure);
        self
    }

    /// Media fetch for `canonical_id` fails.
    pub fn failing_media(mut self, canonical_id: &str, failure: Failure) -> Self {
        self.media_failures.insert(canonical_id.to_string(), failure);
        self
    }

    /// Listing `canonical_url` yields `members`.
    pub fn collection(mut self, canonical_url: &str, members: &[&str]) -> Self {
        self.collections.insert(
            canonical_url.to_string(),
            Ok(members.iter().map(ToString::to_string).collect()),
        );
        self
    }

    /// Listing `canonical_url` fails.
    pub fn failing_collection(mut self, canonical_url: &str, failure: Failure) -> Self {
        self.collections
            .insert(canonical_url.to_string(), Err(failure));
        self
    }

    /// Media fetches with `selector` report "format unavailable".
    pub fn without_format(mut self, selector: &str) -> Self {
        self.missing_selectors.insert(selector.to_string());
        self
    }

    /// Metadata for `canonical_id` takes `delay`.
    pub fn delayed(mut self, canonical_id: &str, delay: Duration) -> Self {
        self.delays.insert(canonical_id.to_string(), delay);
        self
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn media_calls(&self) -> usize {
        self.media_calls.load(Ordering::SeqCst)
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.metadata_calls() + self.media_calls() + self.listing_calls()
    }

    /// Selectors passed to `fetch_media`, in call order.
    pub fn selectors(&self) -> Vec<String> {
        self.selectors.lock().unwrap().clone()
    }

    /// Proxies seen by `fetch_metadata`, in call order.
    pub fn proxies(&self) -> Vec<Option<String>> {
        self.proxies.lock().unwrap().clone()
    }
}

fn short_id(canonical_id: &str) -> &str {
    canonical_id.strip_prefix("vimeo:").unwrap_or(canonical_id)
}

#[async_trait]
impl FetchEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_metadata(
        &self,
        video: &VideoReference,
        ctx: &FetchContext<'_>,
    ) -> Result<VideoMetadata, FetchError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.proxies
            .lock()
            .unwrap()
            .push(ctx.proxy.map(ToString::to_string));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&video.canonical_id) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(failure) = self.failures.get(&video.canonical_id) {
            return Err(failure.to_error(&video.url));
        }

        let id = short_id(&video.canonical_id).to_string();
        Ok(VideoMetadata {
            title: Some(format!("Video {id}")),
            author: Some("Example Studio".to_string()),
            publish_date: Some("2024-03-01".to_string()),
            duration: Some(42.0),
            view_count: Some(1000),
            webpage_url: Some(video.url.clone()),
            video_id: Some(id),
            ..VideoMetadata::default()
        })
    }

    async fn fetch_media(
        &self,
        video: &VideoReference,
        selector: &str,
        _ctx: &FetchContext<'_>,
        workdir: &Path,
    ) -> Result<MediaFile, FetchError> {
        self.media_calls.fetch_add(1, Ordering::SeqCst);
        self.selectors.lock().unwrap().push(selector.to_string());

        if let Some(failure) = self.media_failures.get(&video.canonical_id) {
            return Err(failure.to_error(&video.url));
        }
        if self.missing_selectors.contains(selector) {
            return Err(FetchError::format_unavailable(&video.url, selector));
        }

        let path = workdir.join(format!("{}.mp4", short_id(&video.canonical_id)));
        tokio::fs::write(&path, b"media bytes")
            .await
            .map_err(|e| FetchError::io(&path, e))?;
        Ok(MediaFile {
            path,
            file_size: 11,
            file_extension: "mp4".to_string(),
            downloaded_format: selector.to_string(),
        })
    }

    async fn list_collection(
        &self,
        collection: &CollectionReference,
        _ctx: &FetchContext<'_>,
    ) -> Result<Vec<String>, FetchError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        match self.collections.get(&collection.canonical_url) {
            Some(Ok(members)) => Ok(members.clone()),
            Some(Err(failure)) => Err(failure.to_error(&collection.url)),
            None => Err(FetchError::unavailable(&collection.url, "unknown collection")),
        }
    }
}

/// Store that remembers every key it was given.
#[derive(Default)]
pub struct RecordingStore {
    keys: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(key, content_type)` pairs, in call order.
    pub fn puts(&self) -> Vec<(String, String)> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStore for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn put(
        &self,
        key: &str,
        file: &Path,
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        assert!(file.exists(), "store received a missing file");
        self.keys
            .lock()
            .unwrap()
            .push((key.to_string(), content_type.to_string()));
        if self.fail {
            return Err(StoreError::invalid_config("store is read-only"));
        }
        Ok(StoredObject {
            key: key.to_string(),
            download_url: format!("https://store.example/records/{key}"),
        })
    }
}

/// Sink that accepts `limit` items and fails afterwards.
pub struct FailingSink {
    limit: usize,
    seen: AtomicUsize,
}

impl FailingSink {
    pub fn after(limit: usize) -> Self {
        Self {
            limit,
            seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OutputSink for FailingSink {
    async fn emit(&self, _item: DatasetItem) -> Result<(), SinkError> {
        if self.seen.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(SinkError::Io {
                path: "dataset.jsonl".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        Ok(())
    }
}
