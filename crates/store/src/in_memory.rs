//! In-memory job store for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use jobkeeper_core::{Clock, JobId, SystemClock};

use crate::payload::JobPayload;
use crate::store::{JobStore, StoreError};

/// In-memory payload store.
///
/// `set_unavailable` simulates an outage of the backing store so callers can
/// exercise their failure paths.
#[derive(Debug)]
pub struct InMemoryJobStore {
    clock: Arc<dyn Clock>,
    payloads: RwLock<HashMap<JobId, JobPayload>>,
    unavailable: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::arc())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            payloads: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn arc(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self::with_clock(clock))
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.payloads.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("store marked unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

impl JobStore for InMemoryJobStore {
    fn create(&self, data: serde_json::Value) -> Result<JobPayload, StoreError> {
        self.check_available()?;
        let mut payloads = self.payloads.write().map_err(|_| poisoned())?;

        let payload = JobPayload::new(JobId::new(), data, self.clock.now_utc());
        if payloads.contains_key(&payload.id) {
            return Err(StoreError::AlreadyExists(payload.id));
        }
        payloads.insert(payload.id, payload.clone());
        Ok(payload)
    }

    fn get(&self, id: JobId) -> Result<Option<JobPayload>, StoreError> {
        self.check_available()?;
        let payloads = self.payloads.read().map_err(|_| poisoned())?;
        Ok(payloads.get(&id).cloned())
    }

    fn update(&self, payload: &JobPayload) -> Result<(), StoreError> {
        self.check_available()?;
        let mut payloads = self.payloads.write().map_err(|_| poisoned())?;
        let Some(stored) = payloads.get_mut(&payload.id) else {
            return Err(StoreError::NotFound(payload.id));
        };

        *stored = payload.clone();
        Ok(())
    }

    fn delete(&self, id: JobId) -> Result<(), StoreError> {
        self.check_available()?;
        let mut payloads = self.payloads.write().map_err(|_| poisoned())?;
        payloads.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobkeeper_core::ManualClock;
    use std::time::Duration;

    fn setup() -> (Arc<ManualClock>, InMemoryJobStore) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = InMemoryJobStore::with_clock(clock.clone());
        (clock, store)
    }

    #[test]
    fn create_assigns_id_and_get_returns_it() {
        let (_clock, store) = setup();
        let created = store.create(serde_json::json!({"report": "daily"})).unwrap();

        let fetched = store.get(created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.data["report"], "daily");
    }

    #[test]
    fn update_writes_payload_verbatim() {
        let (clock, store) = setup();
        let mut payload = store.create(serde_json::json!({})).unwrap();

        clock.advance(Duration::from_secs(5));
        payload.attempts = 2;
        payload.record_error("smtp timeout");
        payload.touch(clock.now_utc());
        store.update(&payload).unwrap();

        let fetched = store.get(payload.id).unwrap().unwrap();
        assert_eq!(fetched, payload);
        assert!(fetched.updated_at > fetched.created_at);
    }

    #[test]
    fn update_of_deleted_payload_is_not_found() {
        let (_clock, store) = setup();
        let payload = store.create(serde_json::json!({})).unwrap();
        store.delete(payload.id).unwrap();

        assert_eq!(store.update(&payload), Err(StoreError::NotFound(payload.id)));
        assert!(store.get(payload.id).unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let (_clock, store) = setup();
        store.delete(JobId::new()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn outage_is_distinct_from_absence() {
        let (_clock, store) = setup();
        let payload = store.create(serde_json::json!({})).unwrap();

        store.set_unavailable(true);
        assert!(matches!(store.get(payload.id), Err(StoreError::Storage(_))));

        store.set_unavailable(false);
        assert!(store.get(payload.id).unwrap().is_some());
    }
}
