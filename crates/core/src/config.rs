//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Queue used when none is configured.
pub const DEFAULT_QUEUE_NAME: &str = "/jobs";

/// Lease timeout used on claim and heartbeat when none is configured.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_millis(30_000);

pub const ENV_QUEUE_NAME: &str = "JOBKEEPER_QUEUE_NAME";
pub const ENV_LEASE_TIMEOUT_MS: &str = "JOBKEEPER_LEASE_TIMEOUT_MS";

/// Configuration of one scheduler instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Queue holding scheduled job messages
    pub queue_name: String,
    /// Lease duration requested on claim and on every heartbeat
    pub lease_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    pub fn with_queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    /// Load from `JOBKEEPER_*` environment variables, falling back to defaults.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (environment, test map, ...).
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_QUEUE_NAME) {
            config.queue_name = name;
        }

        if let Some(raw) = lookup(ENV_LEASE_TIMEOUT_MS) {
            let ms: u64 = raw.trim().parse().map_err(|e| {
                CoreError::invalid_config(format!("{ENV_LEASE_TIMEOUT_MS}={raw:?}: {e}"))
            })?;
            config.lease_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.queue_name.trim().is_empty() {
            return Err(CoreError::invalid_config("queue name must not be blank"));
        }
        if self.lease_timeout.is_zero() {
            return Err(CoreError::invalid_config("lease timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_well_known_queue() {
        let config = SchedulerConfig::default();
        assert_eq!(config.queue_name, "/jobs");
        assert_eq!(config.lease_timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = SchedulerConfig::from_lookup(lookup(&[
            (ENV_QUEUE_NAME, "/reports"),
            (ENV_LEASE_TIMEOUT_MS, "5000"),
        ]))
        .unwrap();

        assert_eq!(config.queue_name, "/reports");
        assert_eq!(config.lease_timeout, Duration::from_secs(5));
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let err = SchedulerConfig::from_lookup(lookup(&[(ENV_LEASE_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_and_blank_queue_fail_validation() {
        assert!(SchedulerConfig::default()
            .with_lease_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SchedulerConfig::default()
            .with_queue_name("  ")
            .validate()
            .is_err());
    }
}
