//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use jobkeeper_core::{CoreError, CoreResult};

use crate::retry::RetryPolicy;

pub const ENV_WORKER_NAME: &str = "JOBKEEPER_WORKER_NAME";
pub const ENV_BATCH_SIZE: &str = "JOBKEEPER_BATCH_SIZE";
pub const ENV_POLL_INTERVAL_MS: &str = "JOBKEEPER_POLL_INTERVAL_MS";

/// Job worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name for logging and the worker thread
    pub name: String,
    /// Maximum jobs claimed (and run concurrently) per batch
    pub batch_size: usize,
    /// Sleep between claims when the queue is empty
    pub poll_interval: Duration,
    /// Lease renewal period; defaults to a third of the lease timeout
    pub heartbeat_interval: Option<Duration>,
    pub retry_policy: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "job-worker".to_string(),
            batch_size: 4,
            poll_interval: Duration::from_millis(500),
            heartbeat_interval: None,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Heartbeat period to use for leases of `lease_timeout`.
    pub fn heartbeat_interval_for(&self, lease_timeout: Duration) -> Duration {
        self.heartbeat_interval.unwrap_or(lease_timeout / 3)
    }

    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_WORKER_NAME) {
            config.name = name;
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            config.batch_size = parse(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            config.poll_interval = Duration::from_millis(parse(ENV_POLL_INTERVAL_MS, &raw)?);
        }

        if config.batch_size == 0 {
            return Err(CoreError::invalid_config("batch size must be at least 1"));
        }
        Ok(config)
    }
}

fn parse<T>(key: &str, raw: &str) -> CoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| CoreError::invalid_config(format!("{key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_defaults_to_third_of_lease() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.heartbeat_interval_for(Duration::from_secs(30)),
            Duration::from_secs(10)
        );

        let config = config.with_heartbeat_interval(Duration::from_secs(2));
        assert_eq!(
            config.heartbeat_interval_for(Duration::from_secs(30)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn lookup_parses_and_validates() {
        let config = WorkerConfig::from_lookup(|key| match key {
            ENV_BATCH_SIZE => Some("16".to_string()),
            ENV_POLL_INTERVAL_MS => Some("250".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.poll_interval, Duration::from_millis(250));

        assert!(WorkerConfig::from_lookup(|key| (key == ENV_BATCH_SIZE).then(|| "0".to_string()))
            .is_err());
        assert!(WorkerConfig::from_lookup(|key| (key == ENV_BATCH_SIZE).then(|| "many".to_string()))
            .is_err());
    }
}
