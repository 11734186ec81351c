//! Topic error types

use thiserror::Error;

/// Error type for topic operations
#[derive(Debug, Error)]
pub enum TopicError {
    /// Subscription stream ended
    #[error("channel closed")]
    ChannelClosed,
    /// Connection error (Redis)
    #[error("connection error: {0}")]
    Connection(String),
    /// Stream operation error
    #[error("stream error: {0}")]
    Stream(String),
    /// Consumer group error (join or lookup)
    #[error("consumer group error: {0}")]
    ConsumerGroup(String),
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<deadpool_redis::PoolError> for TopicError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        TopicError::Connection(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for TopicError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        TopicError::Stream(err.to_string())
    }
}
