//! Persisted job payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobkeeper_core::JobId;

/// The persisted record describing one unit of scheduled work.
///
/// The scheduler only ever holds a payload for the duration of one claimed
/// attempt; the job store owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Assigned by the store on create
    pub id: JobId,
    /// Job-specific fields
    pub data: serde_json::Value,
    /// Number of times the job has been rescheduled for retry
    pub attempts: u32,
    /// Error reported by the most recent failed attempt
    pub last_error: Option<String>,
    /// Set once the job is resolved as dead (retained for inspection)
    pub dead_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobPayload {
    pub fn new(id: JobId, data: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id,
            data,
            attempts: 0,
            last_error: None,
            dead_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead_at.is_some()
    }

    /// Record a failed attempt's error.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
