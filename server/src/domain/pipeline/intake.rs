//! Ingress adapters feeding the span channel
//!
//! - [`SpanIntake`] is the HTTP side: a non-blocking enqueue that sheds load
//!   when the channel is full.
//! - [`QueueConsumer`] is the queue side: a blocking enqueue (back-pressure on
//!   the queue), committing each message once its spans are handed off.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::PipelineError;
use super::stats::PipelineStats;
use crate::core::config::QueueConfig;
use crate::data::topics::{StreamTopic, StreamTopicSubscriber, SubscribeOptions};
use crate::domain::traces::{PayloadFormat, Span, decode};

/// Result of a non-blocking enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// Channel full or closed, spans discarded
    Dropped,
}

/// Non-blocking producer handle for the span channel
#[derive(Clone)]
pub struct SpanIntake {
    tx: mpsc::Sender<Vec<Span>>,
    stats: Arc<PipelineStats>,
}

impl SpanIntake {
    pub fn new(tx: mpsc::Sender<Vec<Span>>, stats: Arc<PipelineStats>) -> Self {
        Self { tx, stats }
    }

    /// Hand spans to the pipeline without waiting for channel capacity
    pub fn try_enqueue(&self, spans: Vec<Span>) -> EnqueueOutcome {
        let count = spans.len() as u64;
        PipelineStats::add(&self.stats.spans_received, count);

        match self.tx.try_send(spans) {
            Ok(()) => {
                PipelineStats::add(&self.stats.spans_enqueued, count);
                EnqueueOutcome::Enqueued
            }
            Err(TrySendError::Full(_)) => {
                PipelineStats::add(&self.stats.spans_dropped, count);
                tracing::warn!(spans = count, "Span channel full, dropping spans");
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                PipelineStats::add(&self.stats.spans_dropped, count);
                tracing::warn!(spans = count, "Span channel closed, dropping spans");
                EnqueueOutcome::Dropped
            }
        }
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }
}

/// Consumer-group reader of the trace stream
pub struct QueueConsumer {
    topic: StreamTopic,
    group: String,
    options: SubscribeOptions,
    stats: Arc<PipelineStats>,
}

impl QueueConsumer {
    pub fn new(topic: StreamTopic, config: &QueueConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            topic,
            group: config.group.clone(),
            options: SubscribeOptions {
                start: config.offset,
                count: config.buffer,
            },
            stats,
        }
    }

    /// Receive loop; returns on cancellation
    ///
    /// A message is acknowledged right after its spans are accepted by the
    /// span channel, before they are assembled or persisted. Messages that
    /// fail to decode are logged and left unacknowledged until the consumer
    /// leaves the group on exit.
    pub async fn run(
        self,
        span_tx: mpsc::Sender<Vec<Span>>,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        // Unique consumer name: {uuid}:{pid}
        let consumer = format!("{}:{}", Uuid::new_v4(), std::process::id());

        let mut subscriber = self
            .topic
            .subscribe(&self.group, &consumer, self.options)
            .await
            .map_err(|source| PipelineError::QueueJoin {
                topic: self.topic.name().to_string(),
                group: self.group.clone(),
                source,
            })?;

        tracing::info!(
            topic = %self.topic.name(),
            group = %self.group,
            consumer = %consumer,
            start = %self.options.start,
            buffer = self.options.count,
            "Queue consumer started"
        );

        let result = self.consume(&mut subscriber, &span_tx, &token).await;

        match subscriber.leave().await {
            Ok(dropped) => {
                tracing::debug!(consumer = %consumer, dropped, "Queue consumer left group");
            }
            Err(e) => {
                tracing::warn!(error = %e, consumer = %consumer, "Failed to leave consumer group");
            }
        }
        result
    }

    async fn consume(
        &self,
        subscriber: &mut StreamTopicSubscriber,
        span_tx: &mpsc::Sender<Vec<Span>>,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let acker = subscriber.acker();

        loop {
            let message = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                received = subscriber.recv() => received.map_err(PipelineError::QueueReceive)?,
            };

            let spans = match decode(&message.payload, PayloadFormat::sniff(&message.payload)) {
                Ok(spans) => spans,
                Err(e) => {
                    PipelineStats::incr(&self.stats.decode_errors);
                    tracing::warn!(
                        error = %e,
                        message_id = %message.id,
                        bytes = message.payload.len(),
                        "Failed to decode queue message, skipping"
                    );
                    continue;
                }
            };

            let count = spans.len() as u64;
            PipelineStats::add(&self.stats.spans_received, count);

            let sent = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = span_tx.send(spans) => Some(result),
            };
            match sent {
                None => {
                    tracing::debug!(message_id = %message.id, "Shutdown while waiting for span channel");
                    return Ok(());
                }
                Some(Err(_)) => return Err(PipelineError::SpanChannelClosed),
                Some(Ok(())) => PipelineStats::add(&self.stats.spans_enqueued, count),
            }

            match acker.ack(&message.id).await {
                Ok(()) => PipelineStats::incr(&self.stats.queue_messages_committed),
                Err(e) => {
                    tracing::warn!(error = %e, message_id = %message.id, "Failed to commit queue message");
                }
            }
        }
    }
}
