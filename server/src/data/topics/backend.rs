//! Topic backend trait definition
//!
//! Defines the interface for stream implementations (memory and Redis).
//! Streams are consumed through consumer groups: each message goes to one
//! consumer of the group and stays pending until acknowledged.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use super::error::TopicError;
use crate::core::config::OffsetReset;

/// Message received from a stream with its ID for acknowledgment
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Unique message ID (Redis stream ID or memory sequence)
    pub id: String,
    /// Raw message payload
    pub payload: Vec<u8>,
}

/// Subscription to a stream topic
pub struct StreamSubscription {
    /// Stream of received messages with IDs
    pub receiver: Pin<Box<dyn Stream<Item = Result<StreamMessage, TopicError>> + Send>>,
}

/// Topic backend trait
///
/// Both in-memory and Redis backends implement this trait.
#[async_trait]
pub trait TopicBackend: Send + Sync {
    /// Publish message to stream topic
    ///
    /// Returns the message ID.
    async fn stream_publish(&self, topic: &str, payload: &[u8]) -> Result<String, TopicError>;

    /// Join a consumer group, creating it when missing
    ///
    /// A newly created group starts at `start`; an existing group keeps its
    /// position.
    async fn stream_join(
        &self,
        topic: &str,
        group: &str,
        start: OffsetReset,
    ) -> Result<(), TopicError>;

    /// Subscribe to stream topic as `consumer` of `group`
    ///
    /// `count` bounds how many messages are fetched per read.
    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<StreamSubscription, TopicError>;

    /// Acknowledge (commit) a message
    async fn stream_ack(&self, topic: &str, group: &str, id: &str) -> Result<(), TopicError>;

    /// Remove `consumer` from `group`
    ///
    /// Messages still pending for the consumer are dropped from the group's
    /// pending list. Returns how many were dropped.
    async fn stream_leave(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, TopicError>;

    /// Get stream statistics for monitoring
    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError>;

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), TopicError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}

/// Stream statistics for monitoring
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStats {
    /// Total messages in the stream
    pub length: u64,
    /// Messages delivered but not yet acknowledged
    pub pending: u64,
    /// Number of consumers in the group
    pub consumers: u64,
    /// Oldest pending message age in milliseconds
    pub oldest_pending_ms: Option<u64>,
}
