//! Redis implementations of `JobQueue` and `JobStore`.
//!
//! Both talk to Redis through blocking connections opened per call, so they
//! can be shared freely between worker threads.
//!
//! ## Key Layout
//!
//! Queue `q` under namespace `ns`:
//!
//! - `ns:q:visible`: ZSET of message ids scored by visibility time (fire time
//!   while waiting, lease deadline while claimed)
//! - `ns:q:messages`: HASH message id → JSON `ScheduledMessage`
//! - `ns:q:lease_of`: HASH message id → current lease id
//! - `ns:q:leases`: HASH lease id → message id (current leases only)
//! - `ns:q:retired`: HASH superseded lease id → message id, so a stale
//!   holder's ack fails with `LeaseNotFound`
//! - `ns:q:retired_of`: HASH message id → comma-separated retired lease ids,
//!   cleared with the message
//!
//! Payloads: `ns:payload:{job_id}` → JSON `JobPayload`.
//!
//! Every multi-key queue transition runs as one Lua script, so claim, renew
//! and delete are atomic with respect to each other across processes.

#[cfg(feature = "redis")]
mod error;
#[cfg(feature = "redis")]
mod queue;
#[cfg(feature = "redis")]
mod scripts;
#[cfg(feature = "redis")]
mod store;

#[cfg(feature = "redis")]
pub use error::RedisInfraError;
#[cfg(feature = "redis")]
pub use queue::RedisJobQueue;
#[cfg(feature = "redis")]
pub use store::RedisJobStore;

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "jobkeeper";
