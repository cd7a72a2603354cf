//! Job queue contract.
//!
//! The queue is the only source of mutual exclusion in the scheduler: a
//! claimed message is hidden from other claimers until its lease expires or is
//! deleted.
//!
//! ## Delivery Guarantees
//!
//! - **At-least-once**: a message whose lease expires becomes claimable again
//! - **Delayed visibility**: a message is not claimable before its fire time
//! - **Explicit removal**: a message leaves the queue only via `delete_lease`
//! - **No ordering** beyond visibility time; concurrent claimers may observe
//!   messages out of fire-time order
//!
//! ## Lease Rules
//!
//! - At most one lease is valid for a message at any time
//! - `renew` always issues a new lease id and invalidates the old one
//! - Re-claiming a message after expiry invalidates the expired lease id
//! - `delete_lease` with an expired or superseded lease id fails with
//!   `LeaseNotFound`; repeating an ack after the message is gone is a no-op

use std::sync::Arc;
use std::time::Duration;

use jobkeeper_core::LeaseId;

use crate::message::{ClaimedMessage, ScheduledMessage};

/// Queue operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The lease expired, was superseded, or never existed.
    #[error("lease not found: {0}")]
    LeaseNotFound(LeaseId),

    /// The backing queue could not be reached or failed the operation.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Durable, leased, delayed-visibility message queue.
///
/// Every method is a single atomic operation against the backing queue.
pub trait JobQueue: Send + Sync {
    /// Enqueue a message; it becomes visible at `message.fire_time_ms()`.
    fn post(&self, queue: &str, message: ScheduledMessage) -> Result<(), QueueError>;

    /// Claim up to `max_count` visible messages, each with a fresh lease of
    /// `lease_timeout`.
    fn claim(
        &self,
        queue: &str,
        max_count: usize,
        lease_timeout: Duration,
    ) -> Result<Vec<ClaimedMessage>, QueueError>;

    /// Extend a live lease, returning its replacement id.
    fn renew(
        &self,
        queue: &str,
        lease_id: LeaseId,
        timeout: Duration,
    ) -> Result<LeaseId, QueueError>;

    /// Acknowledge: permanently remove the message bound to `lease_id`.
    ///
    /// Fails with `LeaseNotFound` if the lease has expired or been replaced,
    /// since the caller no longer owns the message.
    fn delete_lease(&self, queue: &str, lease_id: LeaseId) -> Result<(), QueueError>;
}

impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    fn post(&self, queue: &str, message: ScheduledMessage) -> Result<(), QueueError> {
        (**self).post(queue, message)
    }

    fn claim(
        &self,
        queue: &str,
        max_count: usize,
        lease_timeout: Duration,
    ) -> Result<Vec<ClaimedMessage>, QueueError> {
        (**self).claim(queue, max_count, lease_timeout)
    }

    fn renew(
        &self,
        queue: &str,
        lease_id: LeaseId,
        timeout: Duration,
    ) -> Result<LeaseId, QueueError> {
        (**self).renew(queue, lease_id, timeout)
    }

    fn delete_lease(&self, queue: &str, lease_id: LeaseId) -> Result<(), QueueError> {
        (**self).delete_lease(queue, lease_id)
    }
}
