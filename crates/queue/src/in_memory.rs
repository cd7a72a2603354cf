//! In-memory job queue for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use jobkeeper_core::clock::duration_to_ms;
use jobkeeper_core::{Clock, LeaseId, MessageId, SystemClock};

use crate::message::{ClaimedMessage, ScheduledMessage};
use crate::queue::{JobQueue, QueueError};

#[derive(Debug)]
struct Entry {
    message: ScheduledMessage,
    /// Fire time while waiting, lease deadline while claimed.
    visible_at_ms: i64,
    /// Insertion order, breaks ties between equal visibility times.
    seq: u64,
    lease: Option<LeaseId>,
    /// Leases replaced by a renewal or a re-claim.
    retired: Vec<LeaseId>,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: HashMap<MessageId, Entry>,
    leases: HashMap<LeaseId, MessageId>,
    /// Superseded lease → message, kept while the message exists so a stale
    /// holder's ack is refused instead of ignored.
    retired: HashMap<LeaseId, MessageId>,
    next_seq: u64,
}

impl QueueState {
    fn retire(&mut self, lease_id: LeaseId, message_id: MessageId) {
        self.leases.remove(&lease_id);
        self.retired.insert(lease_id, message_id);
        if let Some(entry) = self.entries.get_mut(&message_id) {
            entry.retired.push(lease_id);
        }
    }

    fn remove_message(&mut self, message_id: MessageId) {
        if let Some(entry) = self.entries.remove(&message_id) {
            for lease_id in entry.retired {
                self.retired.remove(&lease_id);
            }
            if let Some(lease_id) = entry.lease {
                self.leases.remove(&lease_id);
            }
        }
    }
}

/// In-memory leased queue.
///
/// - No IO
/// - Each operation runs under one lock, so claim/renew/delete are atomic
/// - Time comes from the injected `Clock`; leases expire when the clock passes
///   their deadline
#[derive(Debug)]
pub struct InMemoryJobQueue {
    clock: Arc<dyn Clock>,
    queues: Mutex<HashMap<String, QueueState>>,
    unavailable: AtomicBool,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::arc())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            queues: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn arc(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self::with_clock(clock))
    }

    /// Simulate an outage: every operation fails with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of messages still in `queue` (waiting or leased).
    pub fn message_count(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .map(|q| q.get(queue).map_or(0, |s| s.entries.len()))
            .unwrap_or(0)
    }

    /// Number of messages in `queue` that a claim would return right now.
    pub fn visible_count(&self, queue: &str) -> usize {
        let now = self.clock.now_ms();
        self.queues
            .lock()
            .map(|q| {
                q.get(queue).map_or(0, |s| {
                    s.entries.values().filter(|e| e.visible_at_ms <= now).count()
                })
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, QueueState>>, QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("queue marked unavailable".to_string()));
        }
        self.queues
            .lock()
            .map_err(|_| QueueError::Unavailable("lock poisoned".to_string()))
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for InMemoryJobQueue {
    fn post(&self, queue: &str, message: ScheduledMessage) -> Result<(), QueueError> {
        let mut queues = self.lock()?;
        let state = queues.entry(queue.to_string()).or_default();

        let seq = state.next_seq;
        state.next_seq += 1;

        let message_id = MessageId::new();
        state.entries.insert(
            message_id,
            Entry {
                visible_at_ms: message.fire_time_ms(),
                message,
                seq,
                lease: None,
                retired: Vec::new(),
            },
        );

        Ok(())
    }

    fn claim(
        &self,
        queue: &str,
        max_count: usize,
        lease_timeout: Duration,
    ) -> Result<Vec<ClaimedMessage>, QueueError> {
        let now = self.clock.now_ms();
        let mut queues = self.lock()?;
        let Some(state) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let mut ready: Vec<(i64, u64, MessageId)> = state
            .entries
            .iter()
            .filter(|(_, e)| e.visible_at_ms <= now)
            .map(|(id, e)| (e.visible_at_ms, e.seq, *id))
            .collect();
        ready.sort_unstable();
        ready.truncate(max_count);

        let deadline = now.saturating_add(duration_to_ms(lease_timeout));
        let mut claimed = Vec::with_capacity(ready.len());

        for (_, _, message_id) in ready {
            let Some(entry) = state.entries.get_mut(&message_id) else {
                continue;
            };

            // Redelivery after expiry: the previous holder loses the lease.
            let expired = entry.lease.take();
            let lease_id = LeaseId::new();
            entry.lease = Some(lease_id);
            entry.visible_at_ms = deadline;
            let message = entry.message.clone();

            if let Some(expired) = expired {
                debug!(queue, message_id = %message_id, lease_id = %expired, "reclaiming expired lease");
                state.retire(expired, message_id);
            }
            state.leases.insert(lease_id, message_id);

            claimed.push(ClaimedMessage {
                message_id,
                lease_id,
                message,
            });
        }

        Ok(claimed)
    }

    fn renew(
        &self,
        queue: &str,
        lease_id: LeaseId,
        timeout: Duration,
    ) -> Result<LeaseId, QueueError> {
        let now = self.clock.now_ms();
        let mut queues = self.lock()?;
        let state = queues
            .get_mut(queue)
            .ok_or(QueueError::LeaseNotFound(lease_id))?;

        let message_id = *state
            .leases
            .get(&lease_id)
            .ok_or(QueueError::LeaseNotFound(lease_id))?;

        let entry = state
            .entries
            .get_mut(&message_id)
            .ok_or(QueueError::LeaseNotFound(lease_id))?;

        if entry.lease != Some(lease_id) || entry.visible_at_ms <= now {
            return Err(QueueError::LeaseNotFound(lease_id));
        }

        let renewed = LeaseId::new();
        entry.lease = Some(renewed);
        entry.visible_at_ms = now.saturating_add(duration_to_ms(timeout));
        state.retire(lease_id, message_id);
        state.leases.insert(renewed, message_id);

        Ok(renewed)
    }

    fn delete_lease(&self, queue: &str, lease_id: LeaseId) -> Result<(), QueueError> {
        let now = self.clock.now_ms();
        let mut queues = self.lock()?;
        let Some(state) = queues.get_mut(queue) else {
            return Ok(());
        };

        if state.retired.contains_key(&lease_id) {
            return Err(QueueError::LeaseNotFound(lease_id));
        }

        let Some(&message_id) = state.leases.get(&lease_id) else {
            // Message already acked and gone.
            return Ok(());
        };

        let expired = state
            .entries
            .get(&message_id)
            .is_some_and(|e| e.visible_at_ms <= now);
        if expired {
            return Err(QueueError::LeaseNotFound(lease_id));
        }

        state.remove_message(message_id);
        Ok(())
    }
}
