//! End-to-end scheduling protocol tests against the in-memory collaborators.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobkeeper_core::{Clock, JobId, ManualClock, SchedulerConfig};
use jobkeeper_queue::{InMemoryJobQueue, JobQueue};
use jobkeeper_scheduler::{JobStatus, SchedulerError, SchedulerService};
use jobkeeper_store::{InMemoryJobStore, JobPayload, JobStore, StoreError};

const QUEUE: &str = "/jobs";

/// Store wrapper that fails reads for selected job ids.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: InMemoryJobStore,
    failing: Mutex<HashSet<JobId>>,
}

impl FlakyStore {
    fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryJobStore::with_clock(clock),
            failing: Mutex::new(HashSet::new()),
        }
    }

    fn fail_reads_of(&self, id: JobId) {
        self.failing.lock().unwrap().insert(id);
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

impl JobStore for FlakyStore {
    fn create(&self, data: serde_json::Value) -> Result<JobPayload, StoreError> {
        self.inner.create(data)
    }

    fn get(&self, id: JobId) -> Result<Option<JobPayload>, StoreError> {
        if self.failing.lock().unwrap().contains(&id) {
            return Err(StoreError::Storage(format!("read of {id} timed out")));
        }
        self.inner.get(id)
    }

    fn update(&self, payload: &JobPayload) -> Result<(), StoreError> {
        self.inner.update(payload)
    }

    fn delete(&self, id: JobId) -> Result<(), StoreError> {
        self.inner.delete(id)
    }
}

struct Harness<S: JobStore> {
    clock: Arc<ManualClock>,
    queue: Arc<InMemoryJobQueue>,
    store: Arc<S>,
    scheduler: SchedulerService<Arc<InMemoryJobQueue>, Arc<S>>,
}

impl<S: JobStore> Harness<S> {
    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    fn second_worker(&self) -> SchedulerService<Arc<InMemoryJobQueue>, Arc<S>> {
        SchedulerService::new(
            self.queue.clone(),
            self.store.clone(),
            self.clock.clone(),
            SchedulerConfig::default(),
        )
        .unwrap()
    }
}

fn harness() -> Harness<InMemoryJobStore> {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = InMemoryJobStore::arc(clock.clone());
    build(clock, store)
}

fn flaky_harness() -> Harness<FlakyStore> {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(FlakyStore::with_clock(clock.clone()));
    build(clock, store)
}

fn build<S: JobStore>(clock: Arc<ManualClock>, store: Arc<S>) -> Harness<S> {
    let queue = InMemoryJobQueue::arc(clock.clone());
    let scheduler = SchedulerService::new(
        queue.clone(),
        store.clone(),
        clock.clone(),
        SchedulerConfig::default(),
    )
    .unwrap();

    Harness {
        clock,
        queue,
        store,
        scheduler,
    }
}

#[test]
fn due_job_is_claimed_with_persisted_payload() {
    let h = harness();
    let created = h
        .scheduler
        .create_job("sendEmail", h.now(), serde_json::json!({"to": "ops@example.com"}))
        .unwrap();

    let handles = h.scheduler.get_jobs(1).unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].job_name(), "sendEmail");
    assert_eq!(handles[0].payload(), &created);
    assert_eq!(handles[0].status(), JobStatus::Retryable);
}

#[test]
fn past_fire_time_is_due_immediately() {
    let h = harness();
    h.scheduler
        .create_job("sendEmail", 0, serde_json::json!({}))
        .unwrap();

    assert_eq!(h.scheduler.get_jobs(1).unwrap().len(), 1);
}

#[test]
fn future_job_is_not_claimed_early() {
    let h = harness();
    h.scheduler
        .create_job("report", h.now() + 60_000, serde_json::json!({}))
        .unwrap();

    assert!(h.scheduler.get_jobs(10).unwrap().is_empty());
    h.clock.advance(Duration::from_secs(60));
    assert_eq!(h.scheduler.get_jobs(10).unwrap().len(), 1);
}

#[test]
fn batch_is_shorter_when_some_payload_reads_fail() {
    let h = flaky_harness();
    let mut ids = Vec::new();
    for i in 0..5 {
        let p = h
            .scheduler
            .create_job("sendEmail", h.now(), serde_json::json!({"i": i}))
            .unwrap();
        ids.push(p.id);
    }
    h.store.fail_reads_of(ids[1]);
    h.store.fail_reads_of(ids[3]);

    let handles = h.scheduler.get_jobs(5).unwrap();
    assert_eq!(handles.len(), 3);
    assert!(handles.iter().all(|hd| hd.job_id() != ids[1] && hd.job_id() != ids[3]));

    // Unreadable jobs stay leased, then come back once the lease lapses.
    h.store.heal();
    assert!(h.scheduler.get_jobs(5).unwrap().is_empty());
    h.clock.advance(h.scheduler.config().lease_timeout);
    let retried: HashSet<JobId> = h
        .scheduler
        .get_jobs(5)
        .unwrap()
        .iter()
        .map(|hd| hd.job_id())
        .collect();
    assert!(retried.contains(&ids[1]));
    assert!(retried.contains(&ids[3]));
}

#[test]
fn heartbeat_old_lease_is_invalid() {
    let h = harness();
    h.scheduler
        .create_job("sendEmail", h.now(), serde_json::json!({}))
        .unwrap();
    let mut handle = h.scheduler.get_jobs(1).unwrap().remove(0);
    let old = handle.lease_id();

    let new = h.scheduler.heartbeat(&mut handle).unwrap();
    assert_ne!(new, old);

    // Queue-level: the old id is gone for good.
    assert!(h.queue.renew(QUEUE, old, Duration::from_secs(30)).is_err());
}

#[test]
fn completed_job_leaves_store_and_queue() {
    let h = harness();
    let created = h
        .scheduler
        .create_job("sendEmail", h.now(), serde_json::json!({}))
        .unwrap();
    let mut handle = h.scheduler.get_jobs(1).unwrap().remove(0);

    h.scheduler.save(&mut handle, JobStatus::Completed).unwrap();

    assert!(h.store.get(created.id).unwrap().is_none());
    assert_eq!(h.queue.message_count(QUEUE), 0);
    h.clock.advance(Duration::from_secs(3_600));
    assert!(h.scheduler.get_jobs(10).unwrap().is_empty());
}

#[test]
fn dead_job_keeps_payload_but_never_redelivers() {
    let h = harness();
    let created = h
        .scheduler
        .create_job("sendEmail", h.now(), serde_json::json!({"to": "x"}))
        .unwrap();
    let mut handle = h.scheduler.get_jobs(1).unwrap().remove(0);
    handle.payload_mut().record_error("mailbox does not exist");

    h.scheduler.save(&mut handle, JobStatus::Dead).unwrap();

    let stored = h.store.get(created.id).unwrap().unwrap();
    assert!(stored.is_dead());
    assert_eq!(stored.last_error.as_deref(), Some("mailbox does not exist"));

    h.clock.advance(Duration::from_secs(3_600));
    assert!(h.scheduler.get_jobs(10).unwrap().is_empty());
}

#[test]
fn delay_retry_hides_job_until_delay_elapses() {
    let h = harness();
    let created = h
        .scheduler
        .create_job("report", h.now(), serde_json::json!({}))
        .unwrap();
    let mut handle = h.scheduler.get_jobs(1).unwrap().remove(0);
    let old_lease = handle.lease_id();

    h.scheduler
        .delay_retry(&mut handle, Duration::from_millis(5_000))
        .unwrap();

    // Original lease is gone immediately.
    assert!(h.queue.renew(QUEUE, old_lease, Duration::from_secs(30)).is_err());
    assert_eq!(h.queue.message_count(QUEUE), 1);

    h.clock.advance(Duration::from_millis(4_999));
    assert!(h.scheduler.get_jobs(1).unwrap().is_empty());

    h.clock.advance(Duration::from_millis(1));
    let handles = h.scheduler.get_jobs(1).unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].job_id(), created.id);
    assert_eq!(handles[0].payload().attempts, 1);
}

#[test]
fn deleted_job_message_is_discarded_on_claim() {
    let h = harness();
    let created = h
        .scheduler
        .create_job("sendEmail", h.now() + 1_000, serde_json::json!({}))
        .unwrap();

    h.scheduler.delete_job(created.id).unwrap();
    assert_eq!(h.queue.message_count(QUEUE), 1);

    h.clock.advance(Duration::from_secs(1));
    assert!(h.scheduler.get_jobs(10).unwrap().is_empty());
    assert_eq!(h.queue.message_count(QUEUE), 0);
}

#[test]
fn deleting_in_flight_job_surfaces_as_stale_on_retry() {
    let h = harness();
    let created = h
        .scheduler
        .create_job("sendEmail", h.now(), serde_json::json!({}))
        .unwrap();
    let mut handle = h.scheduler.get_jobs(1).unwrap().remove(0);

    h.scheduler.delete_job(created.id).unwrap();
    let err = h
        .scheduler
        .delay_retry(&mut handle, Duration::from_millis(10))
        .unwrap_err();
    assert_eq!(err, SchedulerError::StaleJob(created.id));

    // The rescheduled message has no payload and is dropped when it fires.
    h.clock.advance(Duration::from_millis(10));
    assert!(h.scheduler.get_jobs(10).unwrap().is_empty());
    assert_eq!(h.queue.message_count(QUEUE), 0);
}

#[test]
fn competing_workers_never_share_a_lease() {
    let h = harness();
    for i in 0..10 {
        h.scheduler
            .create_job("sendEmail", h.now(), serde_json::json!({"i": i}))
            .unwrap();
    }
    let other = h.second_worker();

    let mine = h.scheduler.get_jobs(6).unwrap();
    let theirs = other.get_jobs(6).unwrap();

    assert_eq!(mine.len(), 6);
    assert_eq!(theirs.len(), 4);
    let mine_ids: HashSet<JobId> = mine.iter().map(|hd| hd.job_id()).collect();
    assert!(theirs.iter().all(|hd| !mine_ids.contains(&hd.job_id())));
}

#[test]
fn crashed_worker_job_is_redelivered_and_old_owner_loses_it() {
    let h = harness();
    h.scheduler
        .create_job("sendEmail", h.now(), serde_json::json!({}))
        .unwrap();
    let mut crashed = h.scheduler.get_jobs(1).unwrap().remove(0);

    // No heartbeat: the lease lapses and another worker picks the job up.
    h.clock.advance(h.scheduler.config().lease_timeout);
    let other = h.second_worker();
    let mut rescued = other.get_jobs(1).unwrap().remove(0);
    assert_eq!(rescued.job_id(), crashed.job_id());

    assert!(matches!(
        h.scheduler.heartbeat(&mut crashed),
        Err(SchedulerError::LeaseNotFound { .. })
    ));

    other.save(&mut rescued, JobStatus::Completed).unwrap();
    assert_eq!(h.queue.message_count(QUEUE), 0);
}

#[test]
fn crashed_worker_cannot_resolve_a_job_it_no_longer_owns() {
    let h = harness();
    let created = h
        .scheduler
        .create_job("sendEmail", h.now(), serde_json::json!({}))
        .unwrap();
    let mut crashed = h.scheduler.get_jobs(1).unwrap().remove(0);

    h.clock.advance(h.scheduler.config().lease_timeout);
    let other = h.second_worker();
    let mut rescued = other.get_jobs(1).unwrap().remove(0);

    // The old owner wakes up and tries to reschedule: nothing is posted.
    assert!(matches!(
        h.scheduler.delay_retry(&mut crashed, Duration::from_secs(1)),
        Err(SchedulerError::LeaseNotFound { job_id, .. }) if job_id == created.id
    ));
    assert_eq!(h.queue.message_count(QUEUE), 1);
    h.clock.advance(Duration::from_secs(1));
    assert!(h.scheduler.get_jobs(10).unwrap().is_empty());

    // Nor can it complete the job out from under the new owner.
    assert!(matches!(
        h.scheduler.save(&mut crashed, JobStatus::Completed),
        Err(SchedulerError::LeaseNotFound { .. })
    ));
    assert!(h.store.get(created.id).unwrap().is_some());

    other.save(&mut rescued, JobStatus::Completed).unwrap();
    assert_eq!(h.queue.message_count(QUEUE), 0);
    assert!(h.store.get(created.id).unwrap().is_none());
}

#[test]
fn send_email_scenario() {
    let h = harness();
    let payload = serde_json::json!({"to": "ops@example.com", "subject": "nightly"});
    h.scheduler
        .create_job("sendEmail", h.now(), payload.clone())
        .unwrap();

    let mut handles = h.scheduler.get_jobs(10).unwrap();
    assert_eq!(handles.len(), 1);
    let mut handle = handles.remove(0);
    assert_eq!(handle.payload().data, payload);

    // Heartbeat every 10s for 25s of work.
    let mut seen = HashSet::from([handle.lease_id()]);
    for _ in 0..3 {
        h.clock.advance(Duration::from_secs(10));
        let lease = h.scheduler.heartbeat(&mut handle).unwrap();
        assert!(seen.insert(lease), "lease ids must never repeat");
    }
    h.clock.advance(Duration::from_secs(5));

    h.scheduler.save(&mut handle, JobStatus::Completed).unwrap();
    assert!(h.scheduler.get_jobs(10).unwrap().is_empty());
}

#[test]
fn report_scenario() {
    let h = harness();
    let created = h
        .scheduler
        .create_job("report", h.now(), serde_json::json!({"kind": "weekly"}))
        .unwrap();

    let mut handle = h.scheduler.get_jobs(1).unwrap().remove(0);
    h.scheduler
        .delay_retry(&mut handle, Duration::from_millis(5_000))
        .unwrap();
    assert!(h.scheduler.get_jobs(1).unwrap().is_empty());

    h.clock.advance(Duration::from_secs(5));
    let handles = h.scheduler.get_jobs(1).unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].job_id(), created.id);
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: `get_jobs(n)` never returns more than `n` handles, never
        /// fails on unreadable payloads, and returns exactly the readable due jobs.
        #[test]
        fn get_jobs_is_bounded_and_skips_unreadable(
            jobs in prop::collection::vec((any::<bool>(), any::<bool>()), 0..20),
            max_count in 0usize..25,
        ) {
            let h = flaky_harness();
            let mut readable_due = 0usize;
            for (due, readable) in &jobs {
                let fire = if *due { h.now() } else { h.now() + 60_000 };
                let p = h
                    .scheduler
                    .create_job("sendEmail", fire, serde_json::json!({}))
                    .unwrap();
                if !*readable {
                    h.store.fail_reads_of(p.id);
                } else if *due {
                    readable_due += 1;
                }
            }

            let handles = h.scheduler.get_jobs(max_count).unwrap();
            prop_assert!(handles.len() <= max_count);

            let due = jobs.iter().filter(|(due, _)| *due).count();
            if max_count >= due {
                prop_assert_eq!(handles.len(), readable_due);
            }
        }
    }
}
