//! Stream topic system
//!
//! Provides consumer-group streams with pluggable backends:
//! - In-memory (default) - local-only, for development and single-process
//! - Redis - Redis Streams, for producers and collectors on different hosts
//!
//! Messages carry raw bytes. Consumers decode them and acknowledge each
//! message through a [`StreamAcker`].

mod backend;
mod error;
mod memory;
mod redis;

use std::sync::Arc;

use futures::StreamExt;

pub use backend::{StreamMessage, StreamStats, StreamSubscription, TopicBackend};
pub use error::TopicError;
pub use memory::MemoryTopicBackend;

use crate::core::config::{OffsetReset, QueueBackendType, QueueConfig};

/// Central topic service wrapping the configured backend
#[derive(Clone)]
pub struct TopicService {
    backend: Arc<dyn TopicBackend>,
}

impl TopicService {
    /// Create a new topic service with in-memory backend
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryTopicBackend::new()))
    }

    /// Create with an explicit backend
    pub fn with_backend(backend: Arc<dyn TopicBackend>) -> Self {
        Self { backend }
    }

    /// Create from queue configuration
    pub async fn from_queue_config(config: &QueueConfig) -> Result<Self, TopicError> {
        let backend: Arc<dyn TopicBackend> = match config.backend {
            QueueBackendType::Memory => Arc::new(MemoryTopicBackend::new()),
            QueueBackendType::Redis => {
                let url = config.redis_url.as_ref().ok_or_else(|| {
                    TopicError::Config("redis_url required for Redis backend".into())
                })?;
                Arc::new(redis::RedisTopicBackend::new(url).await?)
            }
        };
        Ok(Self { backend })
    }

    /// Get the backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Handle to a stream topic
    pub fn stream_topic(&self, name: &str) -> StreamTopic {
        StreamTopic {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
        }
    }

    /// Get stream statistics for monitoring
    pub async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError> {
        self.backend.stream_stats(topic, group).await
    }

    /// Health check
    pub async fn health_check(&self) -> Result<(), TopicError> {
        self.backend.health_check().await
    }
}

impl Default for TopicService {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer group subscription options
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    /// Start position for a group that does not exist yet
    pub start: OffsetReset,
    /// Messages fetched per read
    pub count: usize,
}

/// Stream topic carrying raw payloads
#[derive(Clone)]
pub struct StreamTopic {
    name: String,
    backend: Arc<dyn TopicBackend>,
}

impl StreamTopic {
    /// Publish a payload to the stream
    ///
    /// Returns the message ID for tracking.
    pub async fn publish(&self, payload: &[u8]) -> Result<String, TopicError> {
        self.backend.stream_publish(&self.name, payload).await
    }

    /// Join `group` and subscribe as `consumer`
    ///
    /// Fails when the group cannot be joined.
    pub async fn subscribe(
        &self,
        group: &str,
        consumer: &str,
        options: SubscribeOptions,
    ) -> Result<StreamTopicSubscriber, TopicError> {
        self.backend
            .stream_join(&self.name, group, options.start)
            .await?;
        let subscription = self
            .backend
            .stream_subscribe(&self.name, group, consumer, options.count)
            .await?;
        Ok(StreamTopicSubscriber {
            name: self.name.clone(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            backend: Arc::clone(&self.backend),
            subscription,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Acker for acknowledging stream messages (Send + Sync)
#[derive(Clone)]
pub struct StreamAcker {
    name: String,
    group: String,
    backend: Arc<dyn TopicBackend>,
}

impl StreamAcker {
    /// Acknowledge (commit) a message
    pub async fn ack(&self, id: &str) -> Result<(), TopicError> {
        self.backend.stream_ack(&self.name, &self.group, id).await
    }
}

/// Subscriber to a stream topic
pub struct StreamTopicSubscriber {
    name: String,
    group: String,
    consumer: String,
    backend: Arc<dyn TopicBackend>,
    subscription: StreamSubscription,
}

impl StreamTopicSubscriber {
    /// Receive the next raw message
    pub async fn recv(&mut self) -> Result<StreamMessage, TopicError> {
        match self.subscription.receiver.next().await {
            Some(result) => result,
            None => Err(TopicError::ChannelClosed),
        }
    }

    /// Get an acker for acknowledging messages
    pub fn acker(&self) -> StreamAcker {
        StreamAcker {
            name: self.name.clone(),
            group: self.group.clone(),
            backend: Arc::clone(&self.backend),
        }
    }

    /// Stop reading and remove this consumer from its group
    ///
    /// Returns the number of unacknowledged messages dropped with it.
    pub async fn leave(self) -> Result<u64, TopicError> {
        let Self {
            name,
            group,
            consumer,
            backend,
            subscription,
        } = self;
        drop(subscription);
        backend.stream_leave(&name, &group, &consumer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const OLDEST: SubscribeOptions = SubscribeOptions {
        start: OffsetReset::Oldest,
        count: 10,
    };

    #[tokio::test]
    async fn test_stream_topic_roundtrip_and_ack() {
        let service = TopicService::new();
        let topic = service.stream_topic("traces");

        topic.publish(b"payload").await.unwrap();
        let mut sub = topic.subscribe("group", "c1", OLDEST).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_millis(500), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.payload, b"payload");

        sub.acker().ack(&msg.id).await.unwrap();
        let stats = service.stream_stats("traces", "group").await.unwrap();
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_subscriber_leave_removes_consumer() {
        let service = TopicService::new();
        let topic = service.stream_topic("traces");
        topic.publish(b"unacked").await.unwrap();

        let mut sub = topic.subscribe("group", "c1", OLDEST).await.unwrap();
        tokio::time::timeout(Duration::from_millis(500), sub.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(sub.leave().await.unwrap(), 1);
        let stats = service.stream_stats("traces", "group").await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.consumers, 0);
    }

    #[tokio::test]
    async fn test_service_defaults_to_memory() {
        let service = TopicService::default();
        assert_eq!(service.backend_name(), "memory");
        assert!(service.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_from_queue_config_redis_without_url() {
        let config = QueueConfig {
            backend: QueueBackendType::Redis,
            redis_url: None,
            ..Default::default()
        };
        let result = TopicService::from_queue_config(&config).await;
        assert!(matches!(result, Err(TopicError::Config(_))));
    }
}
