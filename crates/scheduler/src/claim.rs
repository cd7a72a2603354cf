//! Per-message outcome of a batch claim.

use jobkeeper_core::{JobId, LeaseId};

use crate::handle::JobHandle;

/// What happened to one claimed message during `get_jobs`.
///
/// The two non-ready variants are the batch claim's failure policy:
///
/// - `LeftLeased`: the payload could not be fetched (store error). The lease
///   is deliberately left outstanding so the message becomes claimable again
///   once it expires. This favours duplicate work over losing the job.
/// - `Discarded`: the payload does not exist (deleted job or never
///   persisted). The message is stale and its lease is deleted on the spot,
///   which is how deleted jobs leave the queue.
#[derive(Debug)]
pub enum ClaimDisposition {
    Ready(JobHandle),
    LeftLeased {
        job_id: JobId,
        lease_id: LeaseId,
        error: String,
    },
    Discarded {
        job_id: JobId,
    },
}

impl ClaimDisposition {
    pub fn into_handle(self) -> Option<JobHandle> {
        match self {
            ClaimDisposition::Ready(handle) => Some(handle),
            _ => None,
        }
    }
}
