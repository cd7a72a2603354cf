//! Redis leased queue.

use std::sync::Arc;
use std::time::Duration;

use redis::{Script, ScriptInvocation};
use tracing::{instrument, warn};

use jobkeeper_core::clock::duration_to_ms;
use jobkeeper_core::{Clock, LeaseId, MessageId, SystemClock};
use jobkeeper_queue::{ClaimedMessage, JobQueue, QueueError, ScheduledMessage};

use super::DEFAULT_NAMESPACE;
use super::error::{RedisInfraError, command};
use super::scripts;

struct QueueKeys {
    visible: String,
    messages: String,
    lease_of: String,
    leases: String,
    retired: String,
    retired_of: String,
}

impl QueueKeys {
    /// Bind the shared key list to a script call.
    fn bind<'a>(&self, script: &'a Script) -> ScriptInvocation<'a> {
        let mut invocation = script.prepare_invoke();
        invocation
            .key(&self.visible)
            .key(&self.messages)
            .key(&self.lease_of)
            .key(&self.leases)
            .key(&self.retired)
            .key(&self.retired_of);
        invocation
    }
}

/// `JobQueue` over Redis, shared by any number of processes.
#[derive(Debug, Clone)]
pub struct RedisJobQueue {
    client: Arc<redis::Client>,
    namespace: String,
    clock: Arc<dyn Clock>,
    claim_script: Script,
    renew_script: Script,
    delete_script: Script,
    discard_script: Script,
}

impl RedisJobQueue {
    /// Create a queue client.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `namespace` - key prefix (default: "jobkeeper")
    pub fn new(
        redis_url: impl AsRef<str>,
        namespace: Option<String>,
    ) -> Result<Self, RedisInfraError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisInfraError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            namespace: namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            clock: SystemClock::arc(),
            claim_script: scripts::claim(),
            renew_script: scripts::renew(),
            delete_script: scripts::delete_lease(),
            discard_script: scripts::discard(),
        })
    }

    /// Replace the time source used for visibility and lease deadlines.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn connection(&self) -> Result<redis::Connection, RedisInfraError> {
        self.client
            .get_connection()
            .map_err(|e| RedisInfraError::Connection(e.to_string()))
    }

    fn keys(&self, queue: &str) -> QueueKeys {
        let base = format!("{}:{}", self.namespace, queue);
        QueueKeys {
            visible: format!("{base}:visible"),
            messages: format!("{base}:messages"),
            lease_of: format!("{base}:lease_of"),
            leases: format!("{base}:leases"),
            retired: format!("{base}:retired"),
            retired_of: format!("{base}:retired_of"),
        }
    }
}

impl JobQueue for RedisJobQueue {
    #[instrument(skip(self, message), fields(job_id = %message.job_id()))]
    fn post(&self, queue: &str, message: ScheduledMessage) -> Result<(), QueueError> {
        let keys = self.keys(queue);
        let message_id = MessageId::new().to_string();
        let body = serde_json::to_string(&message)
            .map_err(|e| RedisInfraError::Serialization(e.to_string()))?;

        let mut conn = self.connection()?;
        redis::pipe()
            .atomic()
            .hset(&keys.messages, &message_id, body)
            .ignore()
            .zadd(&keys.visible, &message_id, message.fire_time_ms())
            .ignore()
            .query::<()>(&mut conn)
            .map_err(command)?;

        Ok(())
    }

    #[instrument(skip(self))]
    fn claim(
        &self,
        queue: &str,
        max_count: usize,
        lease_timeout: Duration,
    ) -> Result<Vec<ClaimedMessage>, QueueError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let keys = self.keys(queue);
        let now = self.clock.now_ms();
        let deadline = now.saturating_add(duration_to_ms(lease_timeout));

        let mut invocation = keys.bind(&self.claim_script);
        invocation
            .arg(now)
            .arg(max_count)
            .arg(deadline);
        for _ in 0..max_count {
            invocation.arg(LeaseId::new().to_string());
        }

        let mut conn = self.connection()?;
        let reply: Vec<String> = invocation.invoke(&mut conn).map_err(command)?;

        if reply.len() % 3 != 0 {
            return Err(RedisInfraError::MalformedReply(format!(
                "claim returned {} fields",
                reply.len()
            ))
            .into());
        }

        let mut claimed = Vec::with_capacity(reply.len() / 3);
        for triple in reply.chunks_exact(3) {
            let (raw_message_id, raw_lease_id, body) = (&triple[0], &triple[1], &triple[2]);

            let decoded = raw_message_id
                .parse::<MessageId>()
                .map_err(|e| e.to_string())
                .and_then(|message_id| {
                    let lease_id = raw_lease_id.parse::<LeaseId>().map_err(|e| e.to_string())?;
                    let message = serde_json::from_str::<ScheduledMessage>(body)
                        .map_err(|e| e.to_string())?;
                    Ok(ClaimedMessage {
                        message_id,
                        lease_id,
                        message,
                    })
                });

            match decoded {
                Ok(message) => claimed.push(message),
                Err(error) => {
                    warn!(
                        queue,
                        message_id = %raw_message_id,
                        %error,
                        "dropping undecodable queue message"
                    );
                    let _removed: i64 = keys
                        .bind(&self.discard_script)
                        .arg(raw_message_id)
                        .invoke(&mut conn)
                        .map_err(command)?;
                }
            }
        }

        Ok(claimed)
    }

    #[instrument(skip(self))]
    fn renew(
        &self,
        queue: &str,
        lease_id: LeaseId,
        timeout: Duration,
    ) -> Result<LeaseId, QueueError> {
        let keys = self.keys(queue);
        let now = self.clock.now_ms();
        let renewed = LeaseId::new();

        let mut conn = self.connection()?;
        let ok: i64 = keys
            .bind(&self.renew_script)
            .arg(lease_id.to_string())
            .arg(now)
            .arg(now.saturating_add(duration_to_ms(timeout)))
            .arg(renewed.to_string())
            .invoke(&mut conn)
            .map_err(command)?;

        if ok == 1 {
            Ok(renewed)
        } else {
            Err(QueueError::LeaseNotFound(lease_id))
        }
    }

    #[instrument(skip(self))]
    fn delete_lease(&self, queue: &str, lease_id: LeaseId) -> Result<(), QueueError> {
        let keys = self.keys(queue);
        let now = self.clock.now_ms();

        let mut conn = self.connection()?;
        let status: i64 = keys
            .bind(&self.delete_script)
            .arg(lease_id.to_string())
            .arg(now)
            .invoke(&mut conn)
            .map_err(command)?;

        if status < 0 {
            return Err(QueueError::LeaseNotFound(lease_id));
        }
        Ok(())
    }
}
