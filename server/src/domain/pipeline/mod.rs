//! Collector pipeline
//!
//! ```text
//! HTTP (SpanIntake) ──try_send──┐
//!                               ├─> span channel ─> BatchAccumulator ─> batch channel ─> BulkPersister ─> store
//! QueueConsumer ──────send──────┘
//! ```
//!
//! The workers run as one group: the first to return cancels the others, and
//! the first error is returned from [`CollectorService::run`].

mod accumulator;
mod error;
mod intake;
mod persister;
mod stats;

pub use accumulator::{AccumulatorBuffer, BatchAccumulator, Offer};
pub use error::{PipelineError, ProvisioningError};
pub use intake::{EnqueueOutcome, QueueConsumer, SpanIntake};
pub use persister::{BulkPersister, PersistOutcome};
pub use stats::{PipelineStats, PipelineStatsSnapshot};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::config::{PipelineConfig, QueueConfig};
use crate::data::cache::ExistenceCache;
use crate::data::store::{DocumentStore, MappingRegistry};
use crate::data::topics::StreamTopic;
use crate::domain::traces::{AssembleOptions, Span};

/// The assembled pipeline, constructed once at startup
pub struct CollectorService {
    intake: SpanIntake,
    span_rx: mpsc::Receiver<Vec<Span>>,
    span_tx: mpsc::Sender<Vec<Span>>,
    batch_channel_capacity: usize,
    accumulator: BatchAccumulator,
    persister: BulkPersister,
    consumer: Option<QueueConsumer>,
    stats: Arc<PipelineStats>,
}

impl CollectorService {
    pub fn new(
        config: &PipelineConfig,
        options: AssembleOptions,
        store: Arc<dyn DocumentStore>,
        registry: Arc<MappingRegistry>,
        cache: Arc<ExistenceCache>,
    ) -> Self {
        let stats = Arc::new(PipelineStats::new());
        let (span_tx, span_rx) = mpsc::channel(config.span_channel_capacity.max(1));

        Self {
            intake: SpanIntake::new(span_tx.clone(), Arc::clone(&stats)),
            span_rx,
            span_tx,
            batch_channel_capacity: config.batch_channel_capacity.max(1),
            accumulator: BatchAccumulator::new(
                config.bulk_size,
                options,
                config.flush_on_shutdown,
                Arc::clone(&stats),
            ),
            persister: BulkPersister::new(
                store,
                registry,
                cache,
                Arc::clone(&stats),
                Duration::from_millis(config.drain_timeout_ms),
            ),
            consumer: None,
            stats,
        }
    }

    /// Also consume the given queue topic
    pub fn with_queue(mut self, topic: StreamTopic, config: &QueueConfig) -> Self {
        self.consumer = Some(QueueConsumer::new(topic, config, Arc::clone(&self.stats)));
        self
    }

    /// Non-blocking producer handle for the HTTP path
    pub fn intake(&self) -> SpanIntake {
        self.intake.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run all workers until `token` is cancelled or one of them returns
    pub async fn run(self, token: CancellationToken) -> Result<(), PipelineError> {
        let Self {
            span_rx,
            span_tx,
            batch_channel_capacity,
            accumulator,
            persister,
            consumer,
            ..
        } = self;
        let (batch_tx, batch_rx) = mpsc::channel(batch_channel_capacity);

        let mut workers = JoinSet::new();
        workers.spawn(accumulator.run(span_rx, batch_tx, token.clone()));
        workers.spawn(persister.run(batch_rx, token.clone()));
        if let Some(consumer) = consumer {
            workers.spawn(consumer.run(span_tx, token.clone()));
        } else {
            drop(span_tx);
        }

        tracing::debug!(workers = workers.len(), "Collector pipeline started");

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(PipelineError::WorkerAborted(e.to_string())));
            if !token.is_cancelled() {
                tracing::debug!("Pipeline worker returned, stopping the group");
                token.cancel();
            }
            if let Err(e) = result {
                tracing::error!(error = %e, "Pipeline worker failed");
                first_error.get_or_insert(e);
            }
        }

        tracing::debug!("Collector pipeline stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Spawn [`run`](Self::run) on the runtime
    pub fn start(self, token: CancellationToken) -> JoinHandle<Result<(), PipelineError>> {
        tokio::spawn(self.run(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span as OtlpSpan};
    use prost::Message;

    use crate::core::config::OffsetReset;
    use crate::data::store::MemoryStore;
    use crate::data::topics::TopicService;
    use crate::domain::traces::{PayloadFormat, decode};

    // 2024-03-05T12:00:00Z
    const START_NANOS: u64 = 1_709_640_000_000_000_000;

    fn payload(names: &[&str]) -> Vec<u8> {
        let spans = names
            .iter()
            .map(|name| OtlpSpan {
                trace_id: vec![3; 16],
                span_id: vec![4; 8],
                name: name.to_string(),
                start_time_unix_nano: START_NANOS,
                ..Default::default()
            })
            .collect();
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                scope_spans: vec![ScopeSpans {
                    spans,
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
        .encode_to_vec()
    }

    fn service(bulk_size: usize, store: &Arc<MemoryStore>) -> CollectorService {
        let config = PipelineConfig {
            bulk_size,
            ..Default::default()
        };
        CollectorService::new(
            &config,
            AssembleOptions {
                index_prefix: "tracedock".to_string(),
                type_name: "span".to_string(),
            },
            Arc::clone(store) as Arc<dyn DocumentStore>,
            Arc::new(MappingRegistry::new("span", false)),
            Arc::new(ExistenceCache::new(Duration::from_secs(60))),
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_queue_to_store_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let topics = TopicService::new();
        let topic = topics.stream_topic("traces");
        let queue = QueueConfig {
            offset: OffsetReset::Oldest,
            ..Default::default()
        };

        let service = service(2, &store).with_queue(topic.clone(), &queue);
        let stats = service.stats();
        let token = CancellationToken::new();
        let handle = service.start(token.clone());

        topic.publish(&payload(&["a", "b", "c"])).await.unwrap();

        // The third document flushes [a, b]; c waits in the buffer
        wait_until(|| store.document_count() == 2).await;
        assert_eq!(store.index_names(), vec!["tracedock-span-2024.03.05".to_string()]);

        token.cancel();
        handle.await.unwrap().unwrap();

        let names: Vec<String> = store
            .documents("tracedock-span-2024.03.05")
            .iter()
            .map(|d| d["name"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.queue_messages_committed, 1);
        assert_eq!(snapshot.batches_flushed, 2);
        assert_eq!(snapshot.documents_submitted, 3);
    }

    #[tokio::test]
    async fn test_http_intake_feeds_pipeline() {
        let store = Arc::new(MemoryStore::new());
        let service = service(1, &store);
        let intake = service.intake();
        let token = CancellationToken::new();
        let handle = service.start(token.clone());

        let spans = decode(&payload(&["x", "y"]), PayloadFormat::Protobuf).unwrap();
        assert_eq!(intake.try_enqueue(spans), EnqueueOutcome::Enqueued);

        wait_until(|| store.document_count() == 1).await;
        token.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(store.document_count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_group_cleanly() {
        let store = Arc::new(MemoryStore::new());
        let token = CancellationToken::new();
        let handle = service(10, &store)
            .with_queue(TopicService::new().stream_topic("traces"), &QueueConfig::default())
            .start(token.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.unwrap().unwrap().is_ok());
        assert_eq!(store.document_count(), 0);
    }
}
