//! Run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::JobFailure;

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No job failed.
    Success,
    /// Some jobs failed, at least one succeeded.
    Partial,
    /// Every job that ran failed.
    Failure,
}

impl RunOutcome {
    /// Maps success/failure counts to an outcome.
    #[must_use]
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if succeeded > 0 {
            Self::Partial
        } else {
            Self::Failure
        }
    }

    /// Whether the run counts as successful (exit code 0).
    #[must_use]
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failure)
    }
}

/// Counts and failures of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Job slots scheduled (videos plus failed collections).
    pub total: usize,
    /// Jobs that produced a record.
    pub succeeded: usize,
    /// Jobs that failed.
    pub failed: usize,
    /// Jobs never started or abandoned because the run was cancelled.
    pub cancelled: usize,
    /// Items written to the output sink (records and error records).
    pub records_emitted: usize,
    /// One entry per failed job, in scheduling order.
    pub failures: Vec<JobFailure>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Creates an empty report starting now.
    #[must_use]
    pub fn new(total: usize) -> Self {
        let now = Utc::now();
        Self {
            total,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            records_emitted: 0,
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Overall outcome.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        RunOutcome::from_counts(self.succeeded, self.failed)
    }
}
