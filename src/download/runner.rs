//! Job runner for concurrent video collection.
//!
//! The [`Collector`] drives every scheduled video through
//! metadata fetch, optional media fetch and store write, and record
//! emission.
//!
//! # Concurrency Model
//!
//! - Each job runs in its own Tokio task
//! - A semaphore permit is acquired before starting each job
//! - Permits are released automatically when jobs complete (RAII)
//! - Finished jobs report `(index, outcome)` over a channel; a single emitter
//!   re-sorts by index and writes to the sink in scheduling order
//!
//! # Cancellation
//!
//! Cancelling the run (external token or `max_runtime`) stops new jobs from
//! starting. Jobs already fetching metadata finish; jobs that have not yet
//! started their media fetch are abandoned. Nothing partial reaches the sink.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::expander::{Expansion, ScheduledItem, expand_references};
use super::job::{DownloadJob, JobError, JobErrorKind, JobFailure, JobState};
use super::report::RunReport;
use crate::config::{DownloadMode, RunError, RunInput, RunPlan};
use crate::fetch::{FetchContext, FetchEngine, FetchError, MediaFile};
use crate::output::{
    DatasetItem, ErrorRecord, OutputRecord, OutputSink, SinkError, StoredMedia, assemble_record,
    video_id_for,
};
use crate::parser::VideoReference;
use crate::proxy::ProxyLease;
use crate::quality::AUDIO_EXTENSION;
use crate::store::{MediaStore, content_type_for, safe_record_key};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 16;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// What to do with a job that failed permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log it and list it in the run report only.
    #[default]
    LogOnly,
    /// Also write an [`ErrorRecord`] to the sink at the job's position.
    EmitErrorRecord,
}

/// Outcome of one scheduling slot, reported to the emitter.
#[derive(Debug)]
enum SlotOutcome {
    Completed(Box<OutputRecord>),
    Failed(JobFailure),
    Cancelled,
}

/// Shared, read-only state handed to every job task.
struct JobContext {
    engine: Arc<dyn FetchEngine>,
    store: Option<Arc<dyn MediaStore>>,
    plan: Arc<RunPlan>,
    cancel: CancellationToken,
}

/// Runs a [`RunPlan`] against a fetch engine, a media store, and an output sink.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use collector_core::config::{RunInput, UrlsInput};
/// use collector_core::download::Collector;
/// use collector_core::fetch::YtDlpEngine;
/// use collector_core::output::MemorySink;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut input = RunInput::new(UrlsInput::Text("https://vimeo.com/76979871".into()));
/// input.download_mode = collector_core::config::DownloadMode::MetadataOnly;
///
/// let sink = Arc::new(MemorySink::new());
/// let collector = Collector::new(3, Arc::new(YtDlpEngine::default()), sink.clone())?;
/// let report = collector.run(input.into_plan()?).await?;
/// println!("{} records", report.records_emitted);
/// # Ok(())
/// # }
/// ```
pub struct Collector {
    engine: Arc<dyn FetchEngine>,
    store: Option<Arc<dyn MediaStore>>,
    sink: Arc<dyn OutputSink>,
    concurrency: usize,
    failure_policy: FailurePolicy,
    max_runtime: Option<Duration>,
    cancel: CancellationToken,
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("engine", &self.engine.name())
            .field("store", &self.store.as_ref().map(|s| s.name()))
            .field("concurrency", &self.concurrency)
            .field("failure_policy", &self.failure_policy)
            .field("max_runtime", &self.max_runtime)
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Creates a collector without a media store (metadata-only runs).
    ///
    /// # Errors
    ///
    /// Returns [`RunError::InvalidConcurrency`] if `concurrency` is outside
    /// the valid range (1-16).
    #[instrument(level = "debug", skip(engine, sink))]
    pub fn new(
        concurrency: usize,
        engine: Arc<dyn FetchEngine>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, RunError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(RunError::InvalidConcurrency {
                value: concurrency,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            });
        }

        debug!(concurrency, engine = engine.name(), "creating collector");

        Ok(Self {
            engine,
            store: None,
            sink,
            concurrency,
            failure_policy: FailurePolicy::default(),
            max_runtime: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Sets the media store used in videos mode.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MediaStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the failed-job policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Cancels the run once `limit` has elapsed.
    #[must_use]
    pub fn with_max_runtime(mut self, limit: Duration) -> Self {
        self.max_runtime = Some(limit);
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this collector.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs the plan to completion or cancellation.
    ///
    /// Individual job failures do NOT cause this method to error; they are
    /// counted in the report.
    ///
    /// # Errors
    ///
    /// - [`RunError::InvalidInput`] when the plan is in videos mode and no
    ///   media store is configured
    /// - [`RunError::Sink`] when the output sink fails
    /// - [`RunError::SemaphoreClosed`] if the semaphore is closed
    #[instrument(skip(self, plan), fields(mode = %plan.mode(), quality = plan.quality().requested_label()))]
    pub async fn run(&self, plan: RunPlan) -> Result<RunReport, RunError> {
        if plan.mode() == DownloadMode::Videos && self.store.is_none() {
            return Err(RunError::invalid_input(
                "videos mode requires a media store",
            ));
        }

        let plan = Arc::new(plan);
        let cancel = self.cancel.child_token();
        let timer = self
            .max_runtime
            .map(|limit| spawn_runtime_limit(limit, cancel.clone()));

        info!(
            references = plan.references().len(),
            concurrency = self.concurrency,
            "starting run"
        );

        let ctx = FetchContext {
            credential: plan.credential(),
            quality: plan.quality(),
            proxy: None,
        };
        let expansion = expand_references(
            plan.references(),
            self.engine.as_ref(),
            &ctx,
            plan.proxies(),
            &cancel,
        )
        .await;
        let Expansion {
            items,
            duplicates,
            unexpanded,
        } = expansion;
        let slots = items.len();

        let (tx, rx) = mpsc::unbounded_channel::<(usize, SlotOutcome)>();
        let mut emitter = Emitter::new(
            slots,
            self.sink.as_ref(),
            self.failure_policy,
            plan.quality().requested_label(),
            cancel.clone(),
        );

        let shared = Arc::new(JobContext {
            engine: Arc::clone(&self.engine),
            store: self.store.clone(),
            plan: Arc::clone(&plan),
            cancel: cancel.clone(),
        });

        let scheduling = async move {
            let semaphore = Arc::new(Semaphore::new(self.concurrency));
            let mut handles: Vec<JoinHandle<()>> = Vec::new();

            for (index, item) in items.into_iter().enumerate() {
                let video = match item {
                    ScheduledItem::Video(video) => video,
                    ScheduledItem::FailedCollection { collection, error } => {
                        let failure = JobFailure {
                            index,
                            url: collection.url,
                            video_id: None,
                            kind: error.kind,
                            message: error.message,
                        };
                        let _ = tx.send((index, SlotOutcome::Failed(failure)));
                        continue;
                    }
                };

                // Acquire semaphore permit (blocks if at concurrency limit)
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => {
                        Some(permit.map_err(|_| RunError::SemaphoreClosed)?)
                    }
                };
                let Some(permit) = permit else {
                    let _ = tx.send((index, SlotOutcome::Cancelled));
                    continue;
                };

                let tx = tx.clone();
                let shared = Arc::clone(&shared);
                let proxy = shared.plan.proxies().lease();

                handles.push(tokio::spawn(async move {
                    // Permit is dropped when this block exits (RAII)
                    let _permit = permit;
                    let outcome = run_job(DownloadJob::new(index, video), &shared, proxy).await;
                    let _ = tx.send((index, outcome));
                }));
            }
            drop(tx);

            debug!(task_count = handles.len(), "waiting for jobs to complete");
            for handle in handles {
                // Task panics are logged; the emitter counts the missing slot as failed.
                if let Err(e) = handle.await {
                    warn!(error = %e, "job task panicked");
                }
            }
            Ok::<(), RunError>(())
        };

        let (scheduled, ()) = tokio::join!(scheduling, emitter.drain(rx));
        if let Some(timer) = timer {
            timer.abort();
        }
        scheduled?;

        let (mut report, sink_error) = emitter.finish();
        report.total += unexpanded;
        report.cancelled += unexpanded;

        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            records = report.records_emitted,
            duplicates,
            outcome = ?report.outcome(),
            "run complete"
        );

        match sink_error {
            Some(e) => Err(RunError::Sink(e)),
            None => Ok(report),
        }
    }
}

/// Validates `input` and runs it with `collector`.
///
/// # Errors
///
/// Any fatal [`RunError`]; see [`RunInput::into_plan`] and [`Collector::run`].
pub async fn collect(input: RunInput, collector: &Collector) -> Result<RunReport, RunError> {
    let plan = input.into_plan()?;
    collector.run(plan).await
}

fn spawn_runtime_limit(limit: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(limit) => {
                warn!(limit_secs = limit.as_secs(), "max runtime reached, cancelling run");
                cancel.cancel();
            }
        }
    })
}

/// Processes one video. Never panics on job errors; every failure becomes
/// [`SlotOutcome::Failed`].
#[instrument(skip_all, fields(index = job.index(), url = %job.reference().url))]
async fn run_job(
    mut job: DownloadJob,
    shared: &JobContext,
    proxy: Option<ProxyLease>,
) -> SlotOutcome {
    let plan = &shared.plan;
    let video = job.reference().clone();
    let ctx = FetchContext {
        credential: plan.credential(),
        quality: plan.quality(),
        proxy: proxy.as_ref().map(ProxyLease::url),
    };

    let metadata = match shared.engine.fetch_metadata(&video, &ctx).await {
        Ok(metadata) => metadata,
        Err(e) => {
            let kind = fetch_error_kind(&e, JobErrorKind::MetadataFetchFailed);
            return fail(job, JobError::new(kind, e.to_string()), None);
        }
    };
    job.advance(JobState::MetadataFetched);
    let video_id = video_id_for(&video, Some(&metadata));

    if plan.mode() == DownloadMode::MetadataOnly {
        job.advance(JobState::Skipped);
        let record = assemble_record(&video, &metadata, None, plan.quality(), Utc::now());
        return SlotOutcome::Completed(Box::new(record));
    }

    if shared.cancel.is_cancelled() {
        debug!("run cancelled before media fetch, abandoning job");
        return SlotOutcome::Cancelled;
    }

    let Some(store) = &shared.store else {
        return fail(
            job,
            JobError::new(JobErrorKind::StorageFailed, "no media store configured"),
            video_id,
        );
    };

    // Removed with everything in it when this function returns.
    let workdir = match tempfile::Builder::new().prefix("collector-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            let message = format!("cannot create scratch directory: {e}");
            return fail(job, JobError::new(JobErrorKind::MediaFetchFailed, message), video_id);
        }
    };

    let media = match fetch_media_with_fallback(shared.engine.as_ref(), &video, &ctx, workdir.path())
        .await
    {
        Ok(media) => media,
        Err(e) => {
            let kind = fetch_error_kind(&e, JobErrorKind::MediaFetchFailed);
            return fail(job, JobError::new(kind, e.to_string()), video_id);
        }
    };
    job.advance(JobState::MediaFetched);

    let extension = if plan.quality().audio_only() {
        AUDIO_EXTENSION.to_string()
    } else {
        media.file_extension.clone()
    };
    let key = safe_record_key(
        video_id.as_deref().unwrap_or(&video.canonical_id),
        &extension,
    );

    let stored = match store.put(&key, &media.path, content_type_for(&extension)).await {
        Ok(stored) => stored,
        Err(e) => {
            return fail(
                job,
                JobError::new(JobErrorKind::StorageFailed, e.to_string()),
                video_id,
            );
        }
    };
    job.advance(JobState::Stored);

    let stored = StoredMedia {
        key: stored.key,
        download_url: stored.download_url,
        file_size: media.file_size,
        file_extension: extension,
        downloaded_format: media.downloaded_format,
    };
    let record = assemble_record(&video, &metadata, Some(&stored), plan.quality(), Utc::now());
    SlotOutcome::Completed(Box::new(record))
}

/// Tries each selector of the quality policy while the engine reports
/// the format as unavailable.
async fn fetch_media_with_fallback(
    engine: &dyn FetchEngine,
    video: &VideoReference,
    ctx: &FetchContext<'_>,
    workdir: &Path,
) -> Result<MediaFile, FetchError> {
    let mut last = None;
    for selector in ctx.quality.selectors() {
        match engine.fetch_media(video, selector, ctx, workdir).await {
            Ok(media) => return Ok(media),
            Err(e) if e.is_format_unavailable() => {
                debug!(selector = %selector, "format unavailable, trying next selector");
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| FetchError::format_unavailable(&video.url, "")))
}

fn fetch_error_kind(error: &FetchError, default: JobErrorKind) -> JobErrorKind {
    if error.is_unsupported() {
        JobErrorKind::UnsupportedVideo
    } else {
        default
    }
}

fn fail(mut job: DownloadJob, error: JobError, video_id: Option<String>) -> SlotOutcome {
    let failure = JobFailure {
        index: job.index(),
        url: job.reference().url.clone(),
        video_id: video_id.or_else(|| video_id_for(job.reference(), None)),
        kind: error.kind,
        message: error.message.clone(),
    };
    job.fail(error);
    SlotOutcome::Failed(failure)
}

/// Re-sorts slot outcomes by index and writes them to the sink in order.
struct Emitter<'a> {
    sink: &'a dyn OutputSink,
    policy: FailurePolicy,
    quality_label: &'static str,
    cancel: CancellationToken,
    report: RunReport,
    pending: BTreeMap<usize, SlotOutcome>,
    next: usize,
    last_at: Option<DateTime<Utc>>,
    sink_error: Option<SinkError>,
}

impl<'a> Emitter<'a> {
    fn new(
        slots: usize,
        sink: &'a dyn OutputSink,
        policy: FailurePolicy,
        quality_label: &'static str,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sink,
            policy,
            quality_label,
            cancel,
            report: RunReport::new(slots),
            pending: BTreeMap::new(),
            next: 0,
            last_at: None,
            sink_error: None,
        }
    }

    async fn drain(&mut self, mut rx: mpsc::UnboundedReceiver<(usize, SlotOutcome)>) {
        while let Some((index, outcome)) = rx.recv().await {
            self.pending.insert(index, outcome);
            while let Some(outcome) = self.pending.remove(&self.next) {
                self.handle(outcome).await;
                self.next += 1;
            }
        }

        // Slots whose task panicked never report; flush what is left in order.
        let leftovers = std::mem::take(&mut self.pending);
        for (_, outcome) in leftovers {
            self.handle(outcome).await;
        }
        let seen = self.report.succeeded + self.report.failed + self.report.cancelled;
        let missing = self.report.total.saturating_sub(seen);
        if missing > 0 {
            warn!(missing, "jobs ended without reporting an outcome");
            self.report.failed += missing;
        }
    }

    async fn handle(&mut self, outcome: SlotOutcome) {
        match outcome {
            SlotOutcome::Completed(record) => {
                self.report.succeeded += 1;
                self.write(DatasetItem::Record(record)).await;
            }
            SlotOutcome::Failed(failure) => {
                self.report.failed += 1;
                warn!(
                    index = failure.index,
                    url = %failure.url,
                    error_kind = %failure.kind,
                    error = %failure.message,
                    "job failed"
                );
                if self.policy == FailurePolicy::EmitErrorRecord {
                    let item = DatasetItem::Error(ErrorRecord {
                        url: failure.url.clone(),
                        video_id: failure.video_id.clone(),
                        error: failure.message.clone(),
                        error_kind: failure.kind,
                        quality_requested: self.quality_label.to_string(),
                        collected_at: Utc::now(),
                    });
                    self.write(item).await;
                }
                self.report.failures.push(failure);
            }
            SlotOutcome::Cancelled => {
                self.report.cancelled += 1;
            }
        }
    }

    async fn write(&mut self, mut item: DatasetItem) {
        if self.sink_error.is_some() {
            return;
        }
        item.set_collected_at(self.stamp());
        match self.sink.emit(item).await {
            Ok(()) => self.report.records_emitted += 1,
            Err(e) => {
                error!(error = %e, "output sink failed, cancelling run");
                self.cancel.cancel();
                self.sink_error = Some(e);
            }
        }
    }

    /// Current time, never earlier than the previous stamp.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_at = Some(at);
        at
    }

    fn finish(mut self) -> (RunReport, Option<SinkError>) {
        self.report.finished_at = Utc::now();
        (self.report, self.sink_error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::output::MemorySink;

    fn failure(index: usize) -> JobFailure {
        JobFailure {
            index,
            url: format!("https://vimeo.com/{index}"),
            video_id: None,
            kind: JobErrorKind::MetadataFetchFailed,
            message: "removed".to_string(),
        }
    }

    fn record(index: usize) -> Box<OutputRecord> {
        Box::new(OutputRecord {
            video_id: Some(index.to_string()),
            url: format!("https://vimeo.com/{index}"),
            title: None,
            author: None,
            description: None,
            publish_date: None,
            duration: None,
            view_count: None,
            like_count: None,
            thumbnail: None,
            quality_requested: "best".to_string(),
            download_url: None,
            file_path: None,
            file_size: None,
            file_extension: None,
            downloaded_format: None,
            source_collection: None,
            collected_at: Utc::now(),
        })
    }

    #[test]
    fn test_collector_rejects_invalid_concurrency() {
        let engine: Arc<dyn FetchEngine> = Arc::new(crate::fetch::YtDlpEngine::default());
        let sink: Arc<dyn OutputSink> = Arc::new(MemorySink::new());
        for value in [0, 17] {
            let err = Collector::new(value, Arc::clone(&engine), Arc::clone(&sink)).unwrap_err();
            assert!(matches!(err, RunError::InvalidConcurrency { .. }));
        }
        assert_eq!(
            Collector::new(16, engine, sink).unwrap().concurrency(),
            16
        );
    }

    #[tokio::test]
    async fn test_emitter_restores_order() {
        let sink = MemorySink::new();
        let mut emitter = Emitter::new(
            3,
            &sink,
            FailurePolicy::LogOnly,
            "best",
            CancellationToken::new(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send((2, SlotOutcome::Completed(record(2)))).unwrap();
        tx.send((0, SlotOutcome::Completed(record(0)))).unwrap();
        tx.send((1, SlotOutcome::Failed(failure(1)))).unwrap();
        drop(tx);

        emitter.drain(rx).await;
        let (report, sink_error) = emitter.finish();

        assert!(sink_error.is_none());
        let ids: Vec<String> = sink
            .records()
            .into_iter()
            .filter_map(|r| r.video_id)
            .collect();
        assert_eq!(ids, ["0", "2"]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.records_emitted, 2);
        assert_eq!(report.failures[0].index, 1);
    }

    #[tokio::test]
    async fn test_emitter_error_records_and_monotonic_stamps() {
        let sink = MemorySink::new();
        let mut emitter = Emitter::new(
            3,
            &sink,
            FailurePolicy::EmitErrorRecord,
            "720p",
            CancellationToken::new(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send((1, SlotOutcome::Failed(failure(1)))).unwrap();
        tx.send((0, SlotOutcome::Completed(record(0)))).unwrap();
        tx.send((2, SlotOutcome::Cancelled)).unwrap();
        drop(tx);

        emitter.drain(rx).await;
        let (report, _) = emitter.finish();

        let items = sink.items();
        assert_eq!(items.len(), 2);
        assert!(items[0].as_record().is_some());
        match &items[1] {
            DatasetItem::Error(error) => assert_eq!(error.quality_requested, "720p"),
            DatasetItem::Record(_) => panic!("expected error record"),
        }
        assert!(items[0].collected_at() <= items[1].collected_at());
        assert_eq!(report.cancelled, 1);
    }

    #[tokio::test]
    async fn test_emitter_counts_missing_slots_as_failed() {
        let sink = MemorySink::new();
        let mut emitter = Emitter::new(
            2,
            &sink,
            FailurePolicy::LogOnly,
            "best",
            CancellationToken::new(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send((1, SlotOutcome::Completed(record(1)))).unwrap();
        drop(tx);

        emitter.drain(rx).await;
        let (report, _) = emitter.finish();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.records().len(), 1);
    }
}
