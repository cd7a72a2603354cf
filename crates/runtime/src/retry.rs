//! Retry budget and backoff, evaluated against a job's persisted payload.
//!
//! The budget is counted in `JobPayload::attempts`, which `delay_retry`
//! increments, so it survives worker restarts and moves between workers
//! with the job.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use jobkeeper_core::JobId;
use jobkeeper_store::JobPayload;

/// How the delay grows with each retry of the same job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `initial_delay` every time
    Constant,
    /// `initial_delay * retry`
    Linear,
    /// `initial_delay * 2^(retry - 1)`
    #[default]
    Exponential,
}

/// Retry policy applied by the worker when job logic does not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries a job may consume before it is buried as dead
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap on any single delay, jitter included
    pub max_delay: Duration,
    pub backoff: Backoff,
    /// Fraction (0.0-1.0) of the delay each job is shifted by. The shift is
    /// derived from the job id, so jobs failing together do not retry together.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff: Backoff::Exponential,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// First failure is final.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn constant(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            backoff: Backoff::Constant,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Whether `payload` has budget left for another attempt.
    pub fn allows_retry(&self, payload: &JobPayload) -> bool {
        payload.attempts < self.max_retries
    }

    /// Delay before the next attempt of `payload`, jitter included.
    pub fn delay_for(&self, payload: &JobPayload) -> Duration {
        let retry = payload.attempts.saturating_add(1);
        self.jittered(self.base_delay(retry), payload.id, retry)
    }

    /// Capped delay before retry number `retry` (1-indexed), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let delay = match self.backoff {
            Backoff::Constant => self.initial_delay,
            Backoff::Linear => self.initial_delay.saturating_mul(retry),
            Backoff::Exponential => self
                .initial_delay
                .saturating_mul(2u32.saturating_pow(retry - 1)),
        };
        delay.min(self.max_delay)
    }

    fn jittered(&self, base: Duration, job_id: JobId, retry: u32) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }

        // Uniform in [-1, 1), fixed for a given (job, retry).
        let spread = unit_interval(job_seed(job_id, retry)) * 2.0 - 1.0;
        let factor = 1.0 + jitter * spread;
        base.mul_f64(factor).min(self.max_delay)
    }
}

fn job_seed(job_id: JobId, retry: u32) -> u64 {
    let (hi, lo) = job_id.as_uuid().as_u64_pair();
    splitmix64(hi ^ lo.rotate_left(17) ^ u64::from(retry))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Top 53 bits as a float in [0, 1).
fn unit_interval(x: u64) -> f64 {
    (x >> 11) as f64 / (1u64 << 53) as f64
}
