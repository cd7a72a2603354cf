//! `jobkeeper-scheduler`: job scheduling, leasing, heartbeat and resolution.
//!
//! The scheduler core sits on top of two collaborators, a leased job queue
//! (`jobkeeper-queue`) and a payload store (`jobkeeper-store`), and owns the
//! protocol between them:
//!
//! ```text
//! create_job ─▶ store.create ─▶ queue.post (delayed)
//! get_jobs   ─▶ queue.claim  ─▶ store.get ─▶ JobHandle (leased)
//! heartbeat  ─▶ queue.renew  (new lease id)
//! save       ─▶ Completed: ack + delete payload
//!               Dead:      ack + keep payload
//!               Retryable: update payload only
//! delay_retry ▶ queue.post (now + delay) ─▶ ack old lease ─▶ update payload
//! delete_job ─▶ store.delete (queued messages are discarded on claim)
//! ```

pub mod claim;
pub mod error;
pub mod handle;
pub mod service;

pub use claim::ClaimDisposition;
pub use error::{SchedulerError, SchedulerResult};
pub use handle::{JobHandle, JobStatus};
pub use service::SchedulerService;
