//! Claimed unit of work handed to the job runtime.

use serde::{Deserialize, Serialize};

use jobkeeper_core::{JobId, LeaseId, MessageId, SchedulerInstanceId};
use jobkeeper_store::JobPayload;

/// Resolution status of a claimed job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Finished successfully; the job is removed from the system
    Completed,
    /// Retry budget exhausted; acked out of the queue, payload kept for audit
    Dead,
    /// Not terminal; the job will run again
    Retryable,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Dead)
    }
}

/// A claimed job: one message, its current lease and the loaded payload.
///
/// Handles are transient and bound to the scheduler instance that produced
/// them; the lease id changes on every heartbeat. A fresh handle has status
/// `Retryable` until the runtime decides otherwise.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_name: String,
    message_id: MessageId,
    lease_id: LeaseId,
    payload: JobPayload,
    status: JobStatus,
    scheduler: SchedulerInstanceId,
}

impl JobHandle {
    pub(crate) fn new(
        job_name: String,
        message_id: MessageId,
        lease_id: LeaseId,
        payload: JobPayload,
        scheduler: SchedulerInstanceId,
    ) -> Self {
        Self {
            job_name,
            message_id,
            lease_id,
            payload,
            status: JobStatus::Retryable,
            scheduler,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn job_id(&self) -> JobId {
        self.payload.id
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn lease_id(&self) -> LeaseId {
        self.lease_id
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Mutable payload; changes are persisted by `save`/`delay_retry`.
    pub fn payload_mut(&mut self) -> &mut JobPayload {
        &mut self.payload
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    pub fn scheduler(&self) -> SchedulerInstanceId {
        self.scheduler
    }

    pub(crate) fn set_lease_id(&mut self, lease_id: LeaseId) {
        self.lease_id = lease_id;
    }
}
