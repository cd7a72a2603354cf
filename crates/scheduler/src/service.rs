//! Scheduler core: creation, batch claim, heartbeat and resolution.
//!
//! `SchedulerService` composes a `JobQueue` and a `JobStore` into the
//! scheduling protocol. It holds no job state of its own: every operation is
//! a short sequence of single, atomic collaborator calls.
//!
//! ## Job Lifecycle
//!
//! ```text
//! Scheduled ──claim──▶ Claimed ──heartbeat──▶ Claimed (new lease)
//!     ▲                   │
//!     │                   ├── save(Completed) ──▶ gone (ack + payload deleted)
//!     │                   ├── save(Dead)      ──▶ dead (ack + payload kept)
//!     └── delay_retry ────┘
//!     └── lease expiry (queue-driven, not under our control)
//! ```
//!
//! ## Concurrency
//!
//! Many scheduler instances (one per worker process) share one queue and one
//! store. Mutual exclusion over a message comes from the queue lease alone;
//! this layer adds no locking. A worker that stops heartbeating loses its
//! lease and the job is delivered again, so execution is at-least-once and
//! job logic must tolerate duplicates.
//!
//! ## Consistency
//!
//! No operation spans both collaborators atomically. The order of calls is
//! chosen so that a failure in the middle never loses a job:
//!
//! - `create_job` persists before enqueueing. If the enqueue fails the payload
//!   is orphaned (logged, not reconciled).
//! - `delay_retry` enqueues the next attempt before acking the current one,
//!   so a crash in between yields a duplicate rather than a lost job.
//! - `delete_job` only removes the payload; its messages are discarded the
//!   next time they are claimed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use jobkeeper_core::clock::duration_to_ms;
use jobkeeper_core::{Clock, JobId, LeaseId, SchedulerConfig, SchedulerInstanceId};
use jobkeeper_queue::{ClaimedMessage, JobQueue, QueueError, ScheduledMessage};
use jobkeeper_store::{JobPayload, JobStore};

use crate::claim::ClaimDisposition;
use crate::error::{SchedulerError, SchedulerResult};
use crate::handle::{JobHandle, JobStatus};

/// Scheduler core bound to one queue and one payload store.
///
/// ## Generic Parameters
///
/// - `Q`: queue implementation (`InMemoryJobQueue` in tests, Redis in production)
/// - `S`: payload store implementation
///
/// Wrap in an `Arc` to share between the claim loop and job threads; every
/// method takes `&self`.
#[derive(Debug)]
pub struct SchedulerService<Q, S> {
    instance_id: SchedulerInstanceId,
    queue: Q,
    store: S,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl<Q, S> SchedulerService<Q, S>
where
    Q: JobQueue,
    S: JobStore,
{
    /// Build a scheduler instance. Fails if `config` is invalid.
    pub fn new(
        queue: Q,
        store: S,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> SchedulerResult<Self> {
        config.validate()?;

        Ok(Self {
            instance_id: SchedulerInstanceId::new(),
            queue,
            store,
            clock,
            config,
        })
    }

    pub fn instance_id(&self) -> SchedulerInstanceId {
        self.instance_id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist `data` as a new job payload and schedule it to fire at
    /// `fire_time_ms` (epoch ms).
    ///
    /// Arguments are validated before any collaborator call. If persisting
    /// fails nothing is enqueued. If enqueueing fails after persisting, the
    /// payload is left orphaned and the error is returned.
    pub fn create_job(
        &self,
        job_name: &str,
        fire_time_ms: i64,
        data: serde_json::Value,
    ) -> SchedulerResult<JobPayload> {
        validate_schedule(job_name, fire_time_ms)?;

        let payload = self.store.create(data)?;

        if let Err(err) = self.schedule(job_name, fire_time_ms, payload.id) {
            error!(
                job_name,
                job_id = %payload.id,
                error = %err,
                "job payload persisted but could not be enqueued; payload is orphaned"
            );
            return Err(err);
        }

        debug!(job_name, job_id = %payload.id, fire_time_ms, "job scheduled");
        Ok(payload)
    }

    /// Delete a job's payload.
    ///
    /// Queued or in-flight messages are left alone: the next claim finds no
    /// payload and discards them.
    pub fn delete_job(&self, job_id: JobId) -> SchedulerResult<()> {
        self.store
            .delete(job_id)
            .map_err(|e| SchedulerError::Persistence(e.to_string()))?;
        debug!(job_id = %job_id, "job payload deleted");
        Ok(())
    }

    /// Claim up to `max_count` due jobs.
    ///
    /// Per-message failures never fail the batch (see `ClaimDisposition`), so
    /// the result may be shorter than requested. Only a failed claim against
    /// the queue is returned as an error.
    pub fn get_jobs(&self, max_count: usize) -> SchedulerResult<Vec<JobHandle>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let claimed = self
            .queue
            .claim(&self.config.queue_name, max_count, self.config.lease_timeout)?;

        let mut handles = Vec::with_capacity(claimed.len());
        for message in claimed {
            if let Some(handle) = self.resolve_claim(message).into_handle() {
                handles.push(handle);
            }
        }

        Ok(handles)
    }

    /// Decide what to do with one claimed message.
    pub fn resolve_claim(&self, claimed: ClaimedMessage) -> ClaimDisposition {
        let ClaimedMessage {
            message_id,
            lease_id,
            message,
        } = claimed;
        let job_id = message.job_id();
        let job_name = message.job_name();

        match self.store.get(job_id) {
            Ok(Some(payload)) => ClaimDisposition::Ready(JobHandle::new(
                job_name.to_string(),
                message_id,
                lease_id,
                payload,
                self.instance_id,
            )),
            Ok(None) => {
                info!(
                    job_name,
                    job_id = %job_id,
                    "claimed job has no payload; dropping message"
                );
                if let Err(err) = self.queue.delete_lease(&self.config.queue_name, lease_id) {
                    // Still stale; it will be discarded again on the next claim.
                    warn!(job_id = %job_id, lease_id = %lease_id, error = %err, "failed to drop stale message");
                }
                ClaimDisposition::Discarded { job_id }
            }
            Err(err) => {
                error!(
                    job_name,
                    job_id = %job_id,
                    lease_id = %lease_id,
                    error = %err,
                    "unable to load job payload; leaving message leased to avoid job loss"
                );
                ClaimDisposition::LeftLeased {
                    job_id,
                    lease_id,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Renew the handle's lease, replacing its lease id.
    ///
    /// `LeaseNotFound` means another worker may already own the job; the
    /// caller must stop working on this handle.
    pub fn heartbeat(&self, handle: &mut JobHandle) -> SchedulerResult<LeaseId> {
        self.ensure_owned(handle)?;

        match self.renew_lease(handle) {
            Ok(renewed) => {
                debug!(job_id = %handle.job_id(), lease_id = %renewed, "lease renewed");
                Ok(renewed)
            }
            Err(err @ SchedulerError::LeaseNotFound { .. }) => {
                error!(
                    job_name = handle.job_name(),
                    job_id = %handle.job_id(),
                    lease_id = %handle.lease_id(),
                    "could not renew lease during heartbeat"
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Resolve a claimed job with `status`.
    ///
    /// - `Completed`: ack the lease, then delete the payload
    /// - `Dead`: ack the lease, then update the payload (kept for inspection)
    /// - `Retryable`: confirm the lease (by renewing it), then update the
    ///   payload. The message reappears once the lease expires. Prefer
    ///   `delay_retry` to schedule the next attempt.
    ///
    /// A handle whose lease expired or was taken over fails with
    /// `LeaseNotFound` before anything is written.
    pub fn save(&self, handle: &mut JobHandle, status: JobStatus) -> SchedulerResult<()> {
        self.ensure_owned(handle)?;
        handle.set_status(status);

        match status {
            JobStatus::Completed => {
                self.ack(handle)?;
                self.store
                    .delete(handle.job_id())
                    .map_err(|e| SchedulerError::Persistence(e.to_string()))?;
                debug!(job_name = handle.job_name(), job_id = %handle.job_id(), "job completed");
                Ok(())
            }
            JobStatus::Dead => self.bury(handle),
            JobStatus::Retryable => {
                self.renew_lease(handle)?;
                warn!(
                    job_name = handle.job_name(),
                    job_id = %handle.job_id(),
                    lease_id = %handle.lease_id(),
                    "saving non-terminal job without rescheduling"
                );
                self.persist(handle)
            }
        }
    }

    /// Schedule the next attempt `delay` from now and release the current one.
    ///
    /// A handle already marked `Dead` is buried instead (ack + update, no new
    /// attempt). Otherwise the lease is renewed first, so a caller that lost
    /// ownership gets `LeaseNotFound` before a second message is posted. The
    /// new message is posted before the current lease is acked, so for a
    /// moment both exist.
    pub fn delay_retry(&self, handle: &mut JobHandle, delay: Duration) -> SchedulerResult<()> {
        self.ensure_owned(handle)?;

        if handle.status() == JobStatus::Dead {
            return self.bury(handle);
        }

        self.renew_lease(handle)?;

        let next_fire_ms = self.clock.now_ms().saturating_add(duration_to_ms(delay));
        self.schedule(handle.job_name(), next_fire_ms, handle.job_id())?;
        self.ack(handle)?;

        handle.payload_mut().attempts += 1;
        self.persist(handle)?;

        debug!(
            job_name = handle.job_name(),
            job_id = %handle.job_id(),
            attempts = handle.payload().attempts,
            next_fire_ms,
            "job rescheduled"
        );
        Ok(())
    }

    fn schedule(&self, job_name: &str, fire_time_ms: i64, job_id: JobId) -> SchedulerResult<()> {
        validate_schedule(job_name, fire_time_ms)?;

        self.queue.post(
            &self.config.queue_name,
            ScheduledMessage::new(fire_time_ms, job_name, job_id),
        )?;
        Ok(())
    }

    fn bury(&self, handle: &mut JobHandle) -> SchedulerResult<()> {
        self.ack(handle)?;

        let now = self.clock.now_utc();
        let payload = handle.payload_mut();
        if payload.dead_at.is_none() {
            payload.dead_at = Some(now);
        }
        self.persist(handle)?;

        info!(
            job_name = handle.job_name(),
            job_id = %handle.job_id(),
            attempts = handle.payload().attempts,
            "job is dead; payload retained"
        );
        Ok(())
    }

    fn renew_lease(&self, handle: &mut JobHandle) -> SchedulerResult<LeaseId> {
        let renewed = self
            .queue
            .renew(&self.config.queue_name, handle.lease_id(), self.config.lease_timeout)
            .map_err(|err| lease_error(handle, err))?;
        handle.set_lease_id(renewed);
        Ok(renewed)
    }

    fn ack(&self, handle: &JobHandle) -> SchedulerResult<()> {
        self.queue
            .delete_lease(&self.config.queue_name, handle.lease_id())
            .map_err(|err| lease_error(handle, err))
    }

    fn persist(&self, handle: &mut JobHandle) -> SchedulerResult<()> {
        handle.payload_mut().touch(self.clock.now_utc());
        self.store.update(handle.payload())?;
        Ok(())
    }

    fn ensure_owned(&self, handle: &JobHandle) -> SchedulerResult<()> {
        if handle.scheduler() != self.instance_id {
            return Err(SchedulerError::validation(format!(
                "job {} was claimed by scheduler {}, not {}",
                handle.job_id(),
                handle.scheduler(),
                self.instance_id
            )));
        }
        Ok(())
    }
}

fn lease_error(handle: &JobHandle, err: QueueError) -> SchedulerError {
    match err {
        QueueError::LeaseNotFound(lease_id) => SchedulerError::LeaseNotFound {
            job_id: handle.job_id(),
            lease_id,
        },
        other => other.into(),
    }
}

fn validate_schedule(job_name: &str, fire_time_ms: i64) -> SchedulerResult<()> {
    if job_name.trim().is_empty() {
        return Err(SchedulerError::validation("job name is required"));
    }
    if fire_time_ms < 0 {
        return Err(SchedulerError::validation(format!(
            "fire time must be non-negative, got {fire_time_ms}"
        )));
    }
    Ok(())
}
