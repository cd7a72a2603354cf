//! Redis payload store. One JSON string per job.

use std::sync::Arc;

use tracing::instrument;

use jobkeeper_core::{Clock, JobId, SystemClock};
use jobkeeper_store::{JobPayload, JobStore, StoreError};

use super::DEFAULT_NAMESPACE;
use super::error::{RedisInfraError, command};

/// `JobStore` over Redis.
///
/// `create` uses `SET NX` and `update` uses `SET XX`, so a payload deleted by
/// another process is never resurrected by a late update.
#[derive(Debug, Clone)]
pub struct RedisJobStore {
    client: Arc<redis::Client>,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl RedisJobStore {
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
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn connection(&self) -> Result<redis::Connection, RedisInfraError> {
        self.client
            .get_connection()
            .map_err(|e| RedisInfraError::Connection(e.to_string()))
    }

    fn key(&self, id: JobId) -> String {
        format!("{}:payload:{}", self.namespace, id)
    }

    /// `SET key body <mode>`; returns whether the write happened.
    fn set(&self, id: JobId, payload: &JobPayload, mode: &str) -> Result<bool, RedisInfraError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| RedisInfraError::Serialization(e.to_string()))?;

        let mut conn = self.connection()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(id))
            .arg(body)
            .arg(mode)
            .query(&mut conn)
            .map_err(command)?;

        Ok(reply.is_some())
    }
}

impl JobStore for RedisJobStore {
    #[instrument(skip(self, data))]
    fn create(&self, data: serde_json::Value) -> Result<JobPayload, StoreError> {
        let payload = JobPayload::new(JobId::new(), data, self.clock.now_utc());

        if !self.set(payload.id, &payload, "NX")? {
            return Err(StoreError::AlreadyExists(payload.id));
        }
        Ok(payload)
    }

    #[instrument(skip(self))]
    fn get(&self, id: JobId) -> Result<Option<JobPayload>, StoreError> {
        let mut conn = self.connection()?;
        let body: Option<String> = redis::cmd("GET")
            .arg(self.key(id))
            .query(&mut conn)
            .map_err(command)?;

        body.map(|b| {
            serde_json::from_str(&b)
                .map_err(|e| {
                    StoreError::from(RedisInfraError::Serialization(format!("payload {id}: {e}")))
                })
        })
        .transpose()
    }

    #[instrument(skip(self, payload), fields(job_id = %payload.id))]
    fn update(&self, payload: &JobPayload) -> Result<(), StoreError> {
        if !self.set(payload.id, payload, "XX")? {
            return Err(StoreError::NotFound(payload.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete(&self, id: JobId) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("DEL")
            .arg(self.key(id))
            .query::<i64>(&mut conn)
            .map_err(command)?;
        Ok(())
    }
}
