//! Infrastructure layer: Redis-backed queue and payload store.
//!
//! The collaborator traits and their in-memory implementations live in
//! `jobkeeper-queue` and `jobkeeper-store`. This crate provides the shared
//! backends used when several worker processes cooperate.

pub mod redis_backend;

#[cfg(feature = "redis")]
pub use redis_backend::{RedisInfraError, RedisJobQueue, RedisJobStore};
