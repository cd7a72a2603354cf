//! Job store contract.

use std::sync::Arc;

use jobkeeper_core::JobId;

use crate::payload::JobPayload;

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("job payload not found: {0}")]
    NotFound(JobId),
    #[error("job payload already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Key-value persistence for job payloads.
///
/// `get` distinguishes "absent" (`Ok(None)`) from "store unavailable"
/// (`Err`); the scheduler treats the two very differently when claiming.
pub trait JobStore: Send + Sync {
    /// Persist new job data; the store assigns the id.
    fn create(&self, data: serde_json::Value) -> Result<JobPayload, StoreError>;

    /// Get a payload by id.
    fn get(&self, id: JobId) -> Result<Option<JobPayload>, StoreError>;

    /// Overwrite an existing payload as given (callers stamp `updated_at`).
    /// Fails with `NotFound` if it was deleted.
    fn update(&self, payload: &JobPayload) -> Result<(), StoreError>;

    /// Delete a payload. Deleting an absent payload succeeds.
    fn delete(&self, id: JobId) -> Result<(), StoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn create(&self, data: serde_json::Value) -> Result<JobPayload, StoreError> {
        (**self).create(data)
    }

    fn get(&self, id: JobId) -> Result<Option<JobPayload>, StoreError> {
        (**self).get(id)
    }

    fn update(&self, payload: &JobPayload) -> Result<(), StoreError> {
        (**self).update(payload)
    }

    fn delete(&self, id: JobId) -> Result<(), StoreError> {
        (**self).delete(id)
    }
}
