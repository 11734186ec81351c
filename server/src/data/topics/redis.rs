//! Redis topic backend using Streams
//!
//! - `XADD` for publishing (with MAXLEN trimming)
//! - `XGROUP CREATE` for joining (`$` for newest, `0` for oldest)
//! - `XREADGROUP` for consuming (consumer groups)
//! - `XACK` for acknowledgment
//! - `XGROUP DELCONSUMER` when a consumer stops
//!
//! Stream keys use the `{tracedock}:stream:{topic}` form (hash tag for
//! Redis Cluster).

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use deadpool_redis::redis::{RedisResult, Value as RedisValue};
use deadpool_redis::{Config, Pool, Runtime};

use super::backend::{StreamMessage, StreamStats, StreamSubscription, TopicBackend};
use super::error::TopicError;
use crate::core::config::OffsetReset;
use crate::core::constants::{
    QUEUE_STREAM_MAX_LEN, REDIS_POOL_MAX_SIZE, REDIS_POOL_TIMEOUT_SECS, REDIS_READ_BLOCK_MS,
    REDIS_STREAM_PREFIX,
};

/// Redis topic backend
pub struct RedisTopicBackend {
    pool: Pool,
    stream_maxlen: u64,
}

impl RedisTopicBackend {
    /// Create a new Redis topic backend and validate the connection
    pub async fn new(redis_url: &str) -> Result<Self, TopicError> {
        let sanitized_url = sanitize_redis_url(redis_url);
        let timeout = Some(Duration::from_secs(REDIS_POOL_TIMEOUT_SECS));

        let mut config = Config::from_url(redis_url);
        config.pool = Some(deadpool_redis::PoolConfig {
            max_size: REDIS_POOL_MAX_SIZE,
            timeouts: deadpool_redis::Timeouts {
                wait: timeout,
                create: timeout,
                recycle: timeout,
            },
            ..Default::default()
        });

        let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            TopicError::Connection(format!(
                "Failed to create Redis pool for {sanitized_url}: {e}"
            ))
        })?;

        let mut conn = pool.get().await.map_err(|e| {
            TopicError::Connection(format!(
                "Failed to get Redis connection from pool for {sanitized_url}: {e}"
            ))
        })?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                TopicError::Connection(format!("Redis PING failed for {sanitized_url}: {e}"))
            })?;

        tracing::debug!(url = %sanitized_url, "Redis topic backend connected");

        Ok(Self {
            pool,
            stream_maxlen: QUEUE_STREAM_MAX_LEN,
        })
    }

    fn stream_key(topic: &str) -> String {
        format!("{}{}", REDIS_STREAM_PREFIX, topic)
    }
}

/// Starting ID for `XGROUP CREATE`
fn group_start_id(start: OffsetReset) -> &'static str {
    match start {
        OffsetReset::Newest => "$",
        OffsetReset::Oldest => "0",
    }
}

#[async_trait]
impl TopicBackend for RedisTopicBackend {
    async fn stream_publish(&self, topic: &str, payload: &[u8]) -> Result<String, TopicError> {
        let key = Self::stream_key(topic);
        let mut conn = self.pool.get().await?;

        let id: String = deadpool_redis::redis::cmd("XADD")
            .arg(&key)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.stream_maxlen)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        Ok(id)
    }

    async fn stream_join(
        &self,
        topic: &str,
        group: &str,
        start: OffsetReset,
    ) -> Result<(), TopicError> {
        let key = Self::stream_key(topic);
        let mut conn = self.pool.get().await.map_err(|e| {
            TopicError::ConsumerGroup(format!("Failed to join consumer group {group}: {e}"))
        })?;

        let result: RedisResult<String> = deadpool_redis::redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&key)
            .arg(group)
            .arg(group_start_id(start))
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(topic, group, %start, "Created consumer group");
                Ok(())
            }
            // Group already exists and keeps its position
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(TopicError::ConsumerGroup(format!(
                "Failed to create consumer group {group}: {e}"
            ))),
        }
    }

    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<StreamSubscription, TopicError> {
        let key = Self::stream_key(topic);
        let group = group.to_string();
        let consumer = consumer.to_string();
        let count = count.max(1);
        let pool = self.pool.clone();

        let stream = stream! {
            loop {
                let mut conn = match pool.get().await {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to get Redis connection, retrying...");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let result: RedisResult<RedisValue> = deadpool_redis::redis::cmd("XREADGROUP")
                    .arg("GROUP")
                    .arg(&group)
                    .arg(&consumer)
                    .arg("BLOCK")
                    .arg(REDIS_READ_BLOCK_MS)
                    .arg("COUNT")
                    .arg(count)
                    .arg("STREAMS")
                    .arg(&key)
                    .arg(">")
                    .query_async(&mut conn)
                    .await;

                match result {
                    Ok(RedisValue::Nil) => continue,
                    Ok(value) => {
                        for msg in parse_xreadgroup_response(value) {
                            yield Ok(msg);
                        }
                    }
                    Err(e) => {
                        if e.to_string().contains("NOGROUP") {
                            // Stream key was deleted under us; recreate the group from
                            // the start so nothing published since is skipped
                            tracing::warn!(group = %group, "Consumer group lost, recreating from start...");
                            if let Ok(mut conn) = pool.get().await {
                                let _: RedisResult<String> = deadpool_redis::redis::cmd("XGROUP")
                                    .arg("CREATE")
                                    .arg(&key)
                                    .arg(&group)
                                    .arg("0")
                                    .arg("MKSTREAM")
                                    .query_async(&mut conn)
                                    .await;
                            }
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        } else {
                            tracing::warn!(error = %e, "XREADGROUP error, retrying...");
                            tokio::time::sleep(Duration::from_secs(1)).await;
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
        let key = Self::stream_key(topic);
        let mut conn = self.pool.get().await?;

        let _: i64 = deadpool_redis::redis::cmd("XACK")
            .arg(&key)
            .arg(group)
            .arg(id)
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn stream_leave(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, TopicError> {
        let key = Self::stream_key(topic);
        let mut conn = self.pool.get().await?;

        let dropped: u64 = deadpool_redis::redis::cmd("XGROUP")
            .arg("DELCONSUMER")
            .arg(&key)
            .arg(group)
            .arg(consumer)
            .query_async(&mut conn)
            .await?;

        Ok(dropped)
    }

    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError> {
        let key = Self::stream_key(topic);
        let mut conn = self.pool.get().await?;

        let length: u64 = deadpool_redis::redis::cmd("XLEN")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .unwrap_or(0);

        // XPENDING summary: [pending_count, smallest_id, largest_id, [[consumer, count], ...]]
        let pending_info: RedisValue = deadpool_redis::redis::cmd("XPENDING")
            .arg(&key)
            .arg(group)
            .query_async(&mut conn)
            .await
            .unwrap_or(RedisValue::Nil);

        let mut pending = 0u64;
        let mut consumers = 0u64;
        if let RedisValue::Array(parts) = pending_info
            && parts.len() >= 4
        {
            if let RedisValue::Int(p) = &parts[0] {
                pending = *p as u64;
            }
            if let RedisValue::Array(consumer_list) = &parts[3] {
                consumers = consumer_list.len() as u64;
            }
        }

        let mut oldest_pending_ms = None;
        if pending > 0 {
            let pending_detail: RedisValue = deadpool_redis::redis::cmd("XPENDING")
                .arg(&key)
                .arg(group)
                .arg("-")
                .arg("+")
                .arg(1)
                .query_async(&mut conn)
                .await
                .unwrap_or(RedisValue::Nil);

            if let RedisValue::Array(entries) = pending_detail
                && let Some(RedisValue::Array(parts)) = entries.first()
                && parts.len() >= 3
                && let RedisValue::Int(idle) = &parts[2]
            {
                oldest_pending_ms = Some(*idle as u64);
            }
        }

        Ok(StreamStats {
            length,
            pending,
            consumers,
            oldest_pending_ms,
        })
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Parse XREADGROUP response: [[stream_name, [[id, [field, value, ...]], ...]]]
fn parse_xreadgroup_response(value: RedisValue) -> Vec<StreamMessage> {
    let RedisValue::Array(streams) = value else {
        return Vec::new();
    };

    let mut messages = Vec::new();
    for stream_data in streams {
        let RedisValue::Array(parts) = stream_data else {
            continue;
        };
        let Some(RedisValue::Array(msg_list)) = parts.get(1) else {
            continue;
        };
        for msg in msg_list {
            if let RedisValue::Array(msg_parts) = msg
                && msg_parts.len() >= 2
                && let (RedisValue::BulkString(id_bytes), RedisValue::Array(fields)) =
                    (&msg_parts[0], &msg_parts[1])
                && let Ok(id) = String::from_utf8(id_bytes.clone())
            {
                match extract_payload_from_fields(fields) {
                    Some(payload) => messages.push(StreamMessage { id, payload }),
                    None => tracing::warn!(id = %id, "Stream entry without payload field"),
                }
            }
        }
    }
    messages
}

/// Extract payload field from Redis stream entry fields
fn extract_payload_from_fields(fields: &[RedisValue]) -> Option<Vec<u8>> {
    // Fields are [field1, value1, field2, value2, ...]
    let mut iter = fields.iter();
    while let Some(field) = iter.next() {
        if let RedisValue::BulkString(field_name) = field {
            if field_name == b"payload" {
                if let Some(RedisValue::BulkString(payload)) = iter.next() {
                    return Some(payload.clone());
                }
            } else {
                iter.next();
            }
        }
    }
    None
}

/// Sanitize Redis URL for logging (removes password)
pub(crate) fn sanitize_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
        if let Some(colon_pos) = url[scheme_end..at_pos].find(':') {
            let abs_colon = scheme_end + colon_pos;
            let prefix = &url[..abs_colon + 1];
            let suffix = &url[at_pos..];
            return format!("{prefix}***{suffix}");
        }
    }
    url.to_string()
}
