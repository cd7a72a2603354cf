use jobkeeper_queue::QueueError;
use jobkeeper_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RedisInfraError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

impl From<RedisInfraError> for QueueError {
    fn from(value: RedisInfraError) -> Self {
        QueueError::Unavailable(value.to_string())
    }
}

impl From<RedisInfraError> for StoreError {
    fn from(value: RedisInfraError) -> Self {
        StoreError::Storage(value.to_string())
    }
}

pub(crate) fn command(e: redis::RedisError) -> RedisInfraError {
    RedisInfraError::Command(e.to_string())
}
