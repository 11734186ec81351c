//! In-memory topic backend
//!
//! Streams are `VecDeque`s with consumer groups tracked in process. Each
//! group keeps one read cursor shared by its consumers plus a pending table
//! of delivered-but-unacknowledged messages.
//!
//! Suitable for development and single-process deployments: a crash loses
//! every message. Use the Redis backend for durability.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::backend::{StreamMessage, StreamStats, StreamSubscription, TopicBackend};
use super::error::TopicError;
use crate::core::config::OffsetReset;
use crate::core::constants::QUEUE_STREAM_MAX_LEN;

/// Message stored in memory stream
struct StreamEntry {
    id: u64,
    payload: Vec<u8>,
}

/// Consumer group state for a stream
#[derive(Default)]
struct ConsumerGroup {
    /// Highest ID handed out to any consumer of the group
    cursor: u64,
    /// Pending messages: message_id -> (consumer, delivery_time)
    pending: HashMap<u64, (String, Instant)>,
    /// Consumers that have read from the group
    consumers: HashSet<String>,
}

/// Stream state
struct StreamState {
    messages: VecDeque<StreamEntry>,
    groups: HashMap<String, ConsumerGroup>,
    next_id: u64,
    max_len: usize,
}

impl StreamState {
    fn new(max_len: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            groups: HashMap::new(),
            next_id: 1,
            max_len,
        }
    }

    /// Trim stream to max length
    fn trim(&mut self) {
        while self.messages.len() > self.max_len {
            if let Some(entry) = self.messages.pop_front() {
                for group in self.groups.values_mut() {
                    group.pending.remove(&entry.id);
                }
            }
        }
    }

    /// Hand out up to `count` messages past the group cursor to `consumer`
    fn claim_next(&mut self, group: &str, consumer: &str, count: usize) -> Option<Vec<StreamMessage>> {
        let cg = self.groups.get_mut(group)?;
        let batch: Vec<StreamMessage> = self
            .messages
            .iter()
            .filter(|entry| entry.id > cg.cursor)
            .take(count)
            .map(|entry| StreamMessage {
                id: entry.id.to_string(),
                payload: entry.payload.clone(),
            })
            .collect();

        let now = Instant::now();
        for msg in &batch {
            if let Ok(id) = msg.id.parse::<u64>() {
                cg.pending.insert(id, (consumer.to_string(), now));
                cg.cursor = cg.cursor.max(id);
            }
        }
        cg.consumers.insert(consumer.to_string());
        Some(batch)
    }
}

/// Shared state for memory backend
struct SharedState {
    streams: RwLock<HashMap<String, StreamState>>,
    /// Per-stream notifiers for immediate subscriber wakeup (avoids polling)
    notifiers: RwLock<HashMap<String, Arc<Notify>>>,
    max_len: usize,
}

/// In-memory topic backend
#[derive(Clone)]
pub struct MemoryTopicBackend {
    state: Arc<SharedState>,
}

impl Default for MemoryTopicBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTopicBackend {
    pub fn new() -> Self {
        Self::with_max_len(QUEUE_STREAM_MAX_LEN as usize)
    }

    /// Create with a custom per-stream retention limit
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            state: Arc::new(SharedState {
                streams: RwLock::new(HashMap::new()),
                notifiers: RwLock::new(HashMap::new()),
                max_len,
            }),
        }
    }

    /// Get or create a Notify for a stream topic
    fn get_or_create_notifier(&self, topic: &str) -> Arc<Notify> {
        {
            let notifiers = self.state.notifiers.read();
            if let Some(n) = notifiers.get(topic) {
                return Arc::clone(n);
            }
        }
        let mut notifiers = self.state.notifiers.write();
        Arc::clone(
            notifiers
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }
}

#[async_trait]
impl TopicBackend for MemoryTopicBackend {
    async fn stream_publish(&self, topic: &str, payload: &[u8]) -> Result<String, TopicError> {
        let id = {
            let mut streams = self.state.streams.write();
            let stream = streams
                .entry(topic.to_string())
                .or_insert_with(|| StreamState::new(self.state.max_len));

            let id = stream.next_id;
            stream.next_id += 1;
            stream.messages.push_back(StreamEntry {
                id,
                payload: payload.to_vec(),
            });
            stream.trim();
            id
        };

        self.get_or_create_notifier(topic).notify_one();

        Ok(id.to_string())
    }

    async fn stream_join(
        &self,
        topic: &str,
        group: &str,
        start: OffsetReset,
    ) -> Result<(), TopicError> {
        let mut streams = self.state.streams.write();
        let stream = streams
            .entry(topic.to_string())
            .or_insert_with(|| StreamState::new(self.state.max_len));

        if stream.groups.contains_key(group) {
            return Ok(());
        }

        let cursor = match start {
            OffsetReset::Newest => stream.next_id - 1,
            OffsetReset::Oldest => 0,
        };
        stream.groups.insert(
            group.to_string(),
            ConsumerGroup {
                cursor,
                ..Default::default()
            },
        );
        tracing::debug!(topic, group, %start, cursor, "Created consumer group");
        Ok(())
    }

    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<StreamSubscription, TopicError> {
        {
            let streams = self.state.streams.read();
            let joined = streams
                .get(topic)
                .is_some_and(|s| s.groups.contains_key(group));
            if !joined {
                return Err(TopicError::ConsumerGroup(format!(
                    "consumer group not found: {group}"
                )));
            }
        }

        let topic = topic.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();
        let count = count.max(1);
        let state = Arc::clone(&self.state);
        let notifier = self.get_or_create_notifier(&topic);

        let stream = stream! {
            loop {
                // Scope the lock so it is never held across an await
                let batch = {
                    let mut streams = state.streams.write();
                    streams
                        .get_mut(&topic)
                        .and_then(|s| s.claim_next(&group, &consumer, count))
                };

                match batch {
                    None => {
                        yield Err(TopicError::ConsumerGroup(format!(
                            "consumer group removed: {group}"
                        )));
                        break;
                    }
                    Some(messages) if messages.is_empty() => {
                        notifier.notified().await;
                    }
                    Some(messages) => {
                        for msg in messages {
                            yield Ok(msg);
                        }
                    }
                }
            }
        };

        Ok(StreamSubscription {
            receiver: Box::pin(stream),
        })
    }

    async fn stream_ack(&self, topic: &str, group: &str, id: &str) -> Result<(), TopicError> {
        let id: u64 = id
            .parse()
            .map_err(|_| TopicError::Stream(format!("invalid message id: {}", id)))?;

        let mut streams = self.state.streams.write();
        let stream = streams
            .get_mut(topic)
            .ok_or_else(|| TopicError::Stream(format!("stream not found: {}", topic)))?;

        let cg = stream.groups.get_mut(group).ok_or_else(|| {
            TopicError::ConsumerGroup(format!("consumer group not found: {}", group))
        })?;

        cg.pending.remove(&id);
        Ok(())
    }

    async fn stream_leave(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, TopicError> {
        let mut streams = self.state.streams.write();
        let Some(cg) = streams.get_mut(topic).and_then(|s| s.groups.get_mut(group)) else {
            return Ok(0);
        };

        let before = cg.pending.len();
        cg.pending.retain(|_, (owner, _)| owner.as_str() != consumer);
        cg.consumers.remove(consumer);
        Ok((before - cg.pending.len()) as u64)
    }

    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError> {
        let streams = self.state.streams.read();
        let Some(stream) = streams.get(topic) else {
            return Ok(StreamStats::default());
        };

        let Some(cg) = stream.groups.get(group) else {
            return Ok(StreamStats {
                length: stream.messages.len() as u64,
                ..Default::default()
            });
        };

        let now = Instant::now();
        let oldest_pending_ms = cg
            .pending
            .values()
            .map(|(_, delivered)| now.duration_since(*delivered).as_millis() as u64)
            .max();

        Ok(StreamStats {
            length: stream.messages.len() as u64,
            pending: cg.pending.len() as u64,
            consumers: cg.consumers.len() as u64,
            oldest_pending_ms,
        })
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
