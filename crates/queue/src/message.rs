use serde::{Deserialize, Serialize};

use jobkeeper_core::{JobId, LeaseId, MessageId};

/// Envelope placed on the job queue.
///
/// Carries only what the claimer needs to find the job again: the job name and
/// the id of the persisted payload. The payload itself lives in the job store.
///
/// Notes:
/// - `fire_time_ms` is the earliest time (epoch ms) the message becomes visible.
/// - The envelope is immutable; a retry posts a new envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    fire_time_ms: i64,
    job_name: String,
    job_id: JobId,
}

impl ScheduledMessage {
    pub fn new(fire_time_ms: i64, job_name: impl Into<String>, job_id: JobId) -> Self {
        Self {
            fire_time_ms,
            job_name: job_name.into(),
            job_id,
        }
    }

    pub fn fire_time_ms(&self) -> i64 {
        self.fire_time_ms
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

/// A message handed out by `JobQueue::claim`, together with its fresh lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedMessage {
    pub message_id: MessageId,
    pub lease_id: LeaseId,
    pub message: ScheduledMessage,
}
