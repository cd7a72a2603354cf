//! Scheduler error model.

use thiserror::Error;

use jobkeeper_core::{CoreError, JobId, LeaseId};
use jobkeeper_queue::QueueError;
use jobkeeper_store::StoreError;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler operation error.
///
/// - `Validation`: malformed scheduling arguments, raised before any
///   collaborator call
/// - `LeaseNotFound`: the caller no longer owns the job; abandon the handle
/// - `Persistence`: the queue or store failed; not retried internally
/// - `StaleJob`: the payload behind a job no longer exists
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("lease {lease_id} for job {job_id} not found (expired or reclaimed)")]
    LeaseNotFound { job_id: JobId, lease_id: LeaseId },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("stale job: payload {0} no longer exists")]
    StaleJob(JobId),
}

impl SchedulerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the caller can carry on with other work after this error.
    ///
    /// Lost leases and vanished payloads only concern one job; everything
    /// else means the operation as a whole failed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LeaseNotFound { .. } | Self::StaleJob(_))
    }
}

impl From<StoreError> for SchedulerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => SchedulerError::StaleJob(id),
            other => SchedulerError::Persistence(other.to_string()),
        }
    }
}

impl From<QueueError> for SchedulerError {
    fn from(value: QueueError) -> Self {
        SchedulerError::Persistence(value.to_string())
    }
}

impl From<CoreError> for SchedulerError {
    fn from(value: CoreError) -> Self {
        SchedulerError::Validation(value.to_string())
    }
}
