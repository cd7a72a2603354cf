//! `jobkeeper-core`: shared building blocks for the scheduling subsystem.
//!
//! This crate holds the identifiers, time source and configuration shared by
//! the queue, store and scheduler crates. It has no IO of its own.

pub mod clock;
pub mod config;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::{CoreError, CoreResult};
pub use id::{JobId, LeaseId, MessageId, SchedulerInstanceId};
