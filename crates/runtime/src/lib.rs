//! Job execution runtime: claims batches from the scheduler, runs job logic
//! with lease heartbeats, and resolves each attempt.
//!
//! ## Components
//!
//! - `JobWorker`: background claim loop with per-job threads
//! - `RetryPolicy`: retry budget and backoff for failed attempts
//! - `JobOutcome` / `JobContext`: the contract with caller-supplied job logic

pub mod config;
pub mod outcome;
pub mod retry;
pub mod worker;

pub use config::WorkerConfig;
pub use outcome::{JobContext, JobOutcome};
pub use retry::{Backoff, RetryPolicy};
pub use worker::{JobWorker, Resolution, WorkerError, WorkerHandle, WorkerStats};
