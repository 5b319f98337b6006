//! Retry logic with exponential backoff for transient fetch failures.
//!
//! When an engine call fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//! - [`FailureType::NeedsAuth`] - The host wants a logged-in session
//! - [`FailureType::RateLimited`] - Host rate limiting (retries with backoff)
//!
//! [`RetryPolicy`] decides whether to retry based on failure type and attempt
//! count. [`Retrying`] applies a policy to every call of a wrapped engine.
//!
//! # Example
//!
//! ```
//! use collector_core::fetch::{FetchError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = FetchError::transient("https://vimeo.com/1", "HTTP Error 503");
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, instrument, warn};

use super::{FetchContext, FetchEngine, FetchError, MediaFile, VideoMetadata};
use crate::parser::{CollectionReference, VideoReference};

/// Default maximum attempts (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Default maximum jitter added to delays (500ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of fetch failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Failure that won't succeed regardless of retries.
    Permanent,
    /// Authentication required; retrying with the same cookies won't help.
    NeedsAuth,
    /// Host rate limiting.
    RateLimited,
}

/// Decision on whether to retry a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
///
/// With defaults, delays are approximately: 1s, 2s, 4s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` includes the initial attempt and is raised to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the jitter cap.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "authentication required - retry with the same cookies would not help"
                        .to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a fetch error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Transient | Transient |
/// | RateLimited | RateLimited |
/// | AuthRequired | NeedsAuth |
/// | Spawn | Transient (the binary may be mid-upgrade) |
/// | everything else | Permanent |
#[must_use]
#[allow(clippy::match_same_arms)]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::Transient { .. } => FailureType::Transient,
        FetchError::RateLimited { .. } => FailureType::RateLimited,
        FetchError::AuthRequired { .. } => FailureType::NeedsAuth,
        FetchError::Spawn { .. } => FailureType::Transient,
        FetchError::Unavailable { .. }
        | FetchError::Unsupported { .. }
        | FetchError::FormatUnavailable { .. }
        | FetchError::Permanent { .. }
        | FetchError::InvalidResponse { .. }
        | FetchError::Io { .. }
        | FetchError::Exhausted { .. } => FailureType::Permanent,
    }
}

/// A [`FetchEngine`] decorator that retries retryable failures.
///
/// When retries run out the last error is wrapped in
/// [`FetchError::Exhausted`]; non-retryable errors pass through unchanged.
#[derive(Debug)]
pub struct Retrying<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E> Retrying<E> {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// The retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn run<T, F, Fut>(&self, operation: &str, url: &str, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, FetchError>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            match self.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        operation,
                        url,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(operation, url, attempt, %reason, "not retrying");
                    let retryable = matches!(
                        failure_type,
                        FailureType::Transient | FailureType::RateLimited
                    );
                    return Err(if retryable {
                        FetchError::Exhausted {
                            attempts: attempt,
                            last: Box::new(error),
                        }
                    } else {
                        error
                    });
                }
            }
        }
    }
}

#[async_trait]
impl<E: FetchEngine> FetchEngine for Retrying<E> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_metadata(
        &self,
        video: &VideoReference,
        ctx: &FetchContext<'_>,
    ) -> Result<VideoMetadata, FetchError> {
        self.run("metadata", &video.url, || {
            self.inner.fetch_metadata(video, ctx)
        })
        .await
    }

    async fn fetch_media(
        &self,
        video: &VideoReference,
        selector: &str,
        ctx: &FetchContext<'_>,
        workdir: &Path,
    ) -> Result<MediaFile, FetchError> {
        self.run("media", &video.url, || {
            self.inner.fetch_media(video, selector, ctx, workdir)
        })
        .await
    }

    async fn list_collection(
        &self,
        collection: &CollectionReference,
        ctx: &FetchContext<'_>,
    ) -> Result<Vec<String>, FetchError> {
        self.run("list", &collection.url, || {
            self.inner.list_collection(collection, ctx)
        })
        .await
    }
}
