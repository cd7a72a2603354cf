//! Contract between the worker and job logic.

use std::time::Duration;

use jobkeeper_core::JobId;
use jobkeeper_scheduler::JobHandle;

/// Result of running job logic once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job completed successfully
    Success,
    /// Job failed; retried with backoff while the retry budget lasts
    Failure(String),
    /// Transient failure, retry as soon as possible
    RetryNow,
    /// Transient failure, retry after the given delay
    RetryAfter(Duration),
}

/// What job logic sees of a claimed job.
///
/// `data` may be edited in place; the edits are persisted with the attempt's
/// resolution (e.g. progress markers that survive a retry).
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_name: String,
    pub job_id: JobId,
    /// Retries scheduled before this attempt
    pub attempts: u32,
    pub data: serde_json::Value,
}

impl JobContext {
    pub(crate) fn from_handle(handle: &JobHandle) -> Self {
        Self {
            job_name: handle.job_name().to_string(),
            job_id: handle.job_id(),
            attempts: handle.payload().attempts,
            data: handle.payload().data.clone(),
        }
    }
}
