//! Durable job queue abstraction (mechanics only).

pub mod in_memory;
pub mod message;
pub mod queue;

pub use in_memory::InMemoryJobQueue;
pub use message::{ClaimedMessage, ScheduledMessage};
pub use queue::{JobQueue, QueueError};
