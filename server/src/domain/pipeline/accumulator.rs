//! Batch accumulator
//!
//! Drains the span channel, assembles documents and collects them into a
//! shared buffer. A document that finds the buffer full flushes it as one
//! batch and is then offered again, landing first in the fresh buffer.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::PipelineError;
use super::stats::PipelineStats;
use crate::domain::traces::{AssembleOptions, Document, Span};

/// Outcome of offering one document to the buffer
#[derive(Debug, PartialEq)]
pub enum Offer {
    Appended,
    /// The buffer was full: `batch` holds its previous contents and the
    /// offered document was not added
    Flush {
        batch: Vec<Document>,
        deferred: Document,
    },
}

/// Lock-protected document buffer bounded by the bulk threshold
pub struct AccumulatorBuffer {
    documents: Mutex<Vec<Document>>,
    threshold: usize,
}

impl AccumulatorBuffer {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            documents: Mutex::new(Vec::with_capacity(threshold)),
            threshold,
        }
    }

    /// Append when below the threshold, otherwise swap out the full buffer
    pub fn offer(&self, document: Document) -> Offer {
        let mut documents = self.documents.lock();
        if documents.len() < self.threshold {
            documents.push(document);
            return Offer::Appended;
        }
        let batch = std::mem::replace(&mut *documents, Vec::with_capacity(self.threshold));
        Offer::Flush {
            batch,
            deferred: document,
        }
    }

    /// Take whatever is buffered, `None` when empty
    pub fn take(&self) -> Option<Vec<Document>> {
        let mut documents = self.documents.lock();
        if documents.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut *documents))
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

pub struct BatchAccumulator {
    buffer: AccumulatorBuffer,
    options: AssembleOptions,
    flush_on_shutdown: bool,
    stats: Arc<PipelineStats>,
}

impl BatchAccumulator {
    pub fn new(
        threshold: usize,
        options: AssembleOptions,
        flush_on_shutdown: bool,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            buffer: AccumulatorBuffer::new(threshold),
            options,
            flush_on_shutdown,
            stats,
        }
    }

    /// Worker loop; returns on cancellation or when every intake is gone
    pub async fn run(
        self,
        mut span_rx: mpsc::Receiver<Vec<Span>>,
        batch_tx: mpsc::Sender<Vec<Document>>,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        tracing::debug!(threshold = self.buffer.threshold(), "Batch accumulator started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = span_rx.recv() => match received {
                    Some(spans) => self.process(spans, &batch_tx).await?,
                    None => {
                        tracing::debug!("Span channel closed");
                        break;
                    }
                },
            }
        }

        if self.flush_on_shutdown
            && let Some(batch) = self.buffer.take()
        {
            let size = batch.len();
            match batch_tx.send(batch).await {
                Ok(()) => {
                    PipelineStats::incr(&self.stats.batches_flushed);
                    tracing::debug!(size, "Flushed partial batch on shutdown");
                }
                Err(_) => tracing::warn!(size, "Batch channel closed, partial batch lost"),
            }
        } else if !self.buffer.is_empty() {
            tracing::info!(
                documents = self.buffer.len(),
                "Discarding buffered documents on shutdown"
            );
        }

        tracing::debug!("Batch accumulator stopped");
        Ok(())
    }

    /// Assemble spans and feed them through the buffer
    ///
    /// Spans that fail to assemble are logged and skipped. The lock is held
    /// only for each append-or-flush decision; batch sends happen outside it.
    pub async fn process(
        &self,
        spans: Vec<Span>,
        batch_tx: &mpsc::Sender<Vec<Document>>,
    ) -> Result<(), PipelineError> {
        for span in spans {
            let document = match span.assemble(&self.options) {
                Ok(document) => document,
                Err(e) => {
                    PipelineStats::incr(&self.stats.assembly_errors);
                    tracing::warn!(
                        error = %e,
                        trace_id = %span.trace_id_hex(),
                        span_id = %span.span_id_hex(),
                        name = %span.inner.name,
                        "Failed to assemble span, skipping"
                    );
                    continue;
                }
            };
            PipelineStats::incr(&self.stats.documents_accumulated);

            let mut pending = Some(document);
            while let Some(document) = pending.take() {
                if let Offer::Flush { batch, deferred } = self.buffer.offer(document) {
                    let size = batch.len();
                    batch_tx
                        .send(batch)
                        .await
                        .map_err(|_| PipelineError::BatchChannelClosed)?;
                    PipelineStats::incr(&self.stats.batches_flushed);
                    tracing::trace!(size, "Batch flushed");
                    pending = Some(deferred);
                }
            }
        }
        Ok(())
    }

    pub fn buffer(&self) -> &AccumulatorBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::trace::v1::Span as OtlpSpan;
    use serde_json::json;

    // 2024-01-01T00:00:00Z
    const START_NANOS: u64 = 1_704_067_200_000_000_000;

    fn options() -> AssembleOptions {
        AssembleOptions {
            index_prefix: "tracedock".to_string(),
            type_name: "span".to_string(),
        }
    }

    fn span(name: &str) -> Span {
        Span {
            resource: Arc::new(Vec::new()),
            scope_name: String::new(),
            scope_version: String::new(),
            inner: OtlpSpan {
                trace_id: vec![7; 16],
                span_id: vec![9; 8],
                name: name.to_string(),
                start_time_unix_nano: START_NANOS,
                ..Default::default()
            },
        }
    }

    fn doc(name: &str) -> Document {
        Document {
            index_name: "idx".to_string(),
            index_base_name: "span".to_string(),
            type_name: "span".to_string(),
            payload: json!({ "name": name }),
        }
    }

    fn names(batch: &[Document]) -> Vec<String> {
        batch
            .iter()
            .map(|d| d.payload["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn accumulator(threshold: usize) -> BatchAccumulator {
        BatchAccumulator::new(threshold, options(), true, Arc::new(PipelineStats::new()))
    }

    #[test]
    fn test_offer_flushes_without_adding_trigger() {
        let buffer = AccumulatorBuffer::new(2);
        assert_eq!(buffer.offer(doc("d1")), Offer::Appended);
        assert_eq!(buffer.offer(doc("d2")), Offer::Appended);

        match buffer.offer(doc("d3")) {
            Offer::Flush { batch, deferred } => {
                assert_eq!(names(&batch), vec!["d1", "d2"]);
                assert_eq!(deferred, doc("d3"));
            }
            Offer::Appended => panic!("expected flush"),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_take_empty_buffer() {
        let buffer = AccumulatorBuffer::new(3);
        assert!(buffer.take().is_none());
        buffer.offer(doc("d1"));
        assert_eq!(buffer.take().map(|b| b.len()), Some(1));
        assert!(buffer.take().is_none());
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let buffer = AccumulatorBuffer::new(0);
        assert_eq!(buffer.threshold(), 1);
        assert_eq!(buffer.offer(doc("d1")), Offer::Appended);
        assert!(matches!(buffer.offer(doc("d2")), Offer::Flush { batch, .. } if batch.len() == 1));
    }

    #[tokio::test]
    async fn test_three_documents_with_threshold_two() {
        let acc = accumulator(2);
        let (tx, mut rx) = mpsc::channel(4);

        acc.process(vec![span("d1"), span("d2"), span("d3")], &tx)
            .await
            .unwrap();

        let batch = rx.try_recv().unwrap();
        assert_eq!(names(&batch), vec!["d1", "d2"]);
        assert!(rx.try_recv().is_err());
        assert_eq!(acc.buffer().len(), 1);
        assert_eq!(names(&acc.buffer().take().unwrap()), vec!["d3"]);
    }

    #[tokio::test]
    async fn test_batches_bounded_and_ordered() {
        let acc = accumulator(3);
        let (tx, mut rx) = mpsc::channel(16);
        let input: Vec<String> = (0..10).map(|i| format!("s{i}")).collect();

        for chunk in input.chunks(4) {
            let spans = chunk.iter().map(|n| span(n)).collect();
            acc.process(spans, &tx).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(batch) = rx.recv().await {
            assert!(!batch.is_empty());
            assert!(batch.len() <= 3);
            seen.extend(names(&batch));
        }
        seen.extend(names(&acc.buffer().take().unwrap_or_default()));
        assert_eq!(seen, input);
    }

    #[tokio::test]
    async fn test_assembly_failure_skips_single_span() {
        let stats = Arc::new(PipelineStats::new());
        let acc = BatchAccumulator::new(10, options(), true, Arc::clone(&stats));
        let (tx, _rx) = mpsc::channel(1);

        let mut broken = span("broken");
        broken.inner.trace_id.clear();
        acc.process(vec![span("ok1"), broken, span("ok2")], &tx)
            .await
            .unwrap();

        assert_eq!(names(&acc.buffer().take().unwrap()), vec!["ok1", "ok2"]);
        assert_eq!(stats.snapshot().assembly_errors, 1);
        assert_eq!(stats.snapshot().documents_accumulated, 2);
    }

    #[tokio::test]
    async fn test_closed_batch_channel_is_error() {
        let acc = accumulator(1);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = acc.process(vec![span("a"), span("b")], &tx).await;
        assert!(matches!(result, Err(PipelineError::BatchChannelClosed)));
    }

    #[tokio::test]
    async fn test_run_flushes_partial_buffer_on_cancel() {
        let acc = accumulator(5);
        let (span_tx, span_rx) = mpsc::channel(4);
        let (batch_tx, mut batch_rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let handle = tokio::spawn(acc.run(span_rx, batch_tx, token.clone()));

        span_tx.send(vec![span("a"), span("b")]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(names(&batch_rx.recv().await.unwrap()), vec!["a", "b"]);
        assert!(batch_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_without_shutdown_flush_discards() {
        let acc = BatchAccumulator::new(5, options(), false, Arc::new(PipelineStats::new()));
        let (span_tx, span_rx) = mpsc::channel(4);
        let (batch_tx, mut batch_rx) = mpsc::channel(4);
        span_tx.send(vec![span("a")]).await.unwrap();
        drop(span_tx);

        acc.run(span_rx, batch_tx, CancellationToken::new())
            .await
            .unwrap();
        assert!(batch_rx.recv().await.is_none());
    }
}
