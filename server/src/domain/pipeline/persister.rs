//! Bulk persister
//!
//! Drains completed batches, makes sure each document's index exists, and
//! writes the batch with one bulk request. Failures are contained at the
//! smallest unit: a provisioning failure skips one document, a transport
//! failure loses one batch, an item failure is only logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::{PipelineError, ProvisioningError};
use super::stats::PipelineStats;
use crate::data::cache::{ExistenceCache, existence_key};
use crate::data::store::{BulkIndexOp, DocumentStore, MappingRegistry};
use crate::domain::traces::Document;

/// What happened to one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Documents included in the bulk request
    pub submitted: usize,
    /// Documents dropped during provisioning
    pub skipped: usize,
    /// Items the store reported as failed
    pub failed_items: usize,
    /// The bulk call failed as a whole or returned nothing
    pub transport_failed: bool,
}

pub struct BulkPersister {
    store: Arc<dyn DocumentStore>,
    registry: Arc<MappingRegistry>,
    cache: Arc<ExistenceCache>,
    stats: Arc<PipelineStats>,
    drain_timeout: Duration,
}

impl BulkPersister {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<MappingRegistry>,
        cache: Arc<ExistenceCache>,
        stats: Arc<PipelineStats>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            cache,
            stats,
            drain_timeout,
        }
    }

    /// Worker loop
    ///
    /// On cancellation, keeps writing batches that are still arriving (such
    /// as the accumulator's final flush) until the channel closes or stays
    /// idle for the drain timeout. An in-flight bulk write is never cut short.
    pub async fn run(
        self,
        mut batch_rx: mpsc::Receiver<Vec<Document>>,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        tracing::debug!(store = self.store.backend_name(), "Bulk persister started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = batch_rx.recv() => match received {
                    Some(batch) => {
                        self.persist(batch).await;
                    }
                    None => {
                        tracing::debug!("Batch channel closed");
                        return Ok(());
                    }
                },
            }
        }

        loop {
            match tokio::time::timeout(self.drain_timeout, batch_rx.recv()).await {
                Ok(Some(batch)) => {
                    self.persist(batch).await;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!("Batch drain timed out");
                    break;
                }
            }
        }

        tracing::debug!("Bulk persister stopped");
        Ok(())
    }

    /// Provision indices and write one batch
    pub async fn persist(&self, batch: Vec<Document>) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();
        let mut ops: Vec<BulkIndexOp> = Vec::with_capacity(batch.len());

        for document in batch {
            if let Err(e) = self.ensure_index(&document).await {
                outcome.skipped += 1;
                PipelineStats::incr(&self.stats.provisioning_errors);
                tracing::warn!(
                    error = %e,
                    index = %document.index_name,
                    type_name = %document.type_name,
                    "Index provisioning failed, skipping document"
                );
                continue;
            }
            ops.push(document.into_bulk_op());
        }

        if ops.is_empty() {
            tracing::debug!(skipped = outcome.skipped, "No documents left to write");
            return outcome;
        }
        outcome.submitted = ops.len();
        PipelineStats::add(&self.stats.documents_submitted, ops.len() as u64);

        let response = match self.store.bulk_write(&ops).await {
            Ok(response) if !response.items.is_empty() => response,
            Ok(_) => {
                outcome.transport_failed = true;
                PipelineStats::incr(&self.stats.bulk_failures);
                tracing::warn!(documents = ops.len(), "Bulk write returned no items");
                return outcome;
            }
            Err(e) => {
                outcome.transport_failed = true;
                PipelineStats::incr(&self.stats.bulk_failures);
                tracing::warn!(error = %e, documents = ops.len(), "Bulk write failed");
                return outcome;
            }
        };

        for item in response.failed_items() {
            outcome.failed_items += 1;
            tracing::warn!(
                index = %item.index,
                status = item.status,
                error = item.error.as_deref().unwrap_or("unknown"),
                "Bulk item failed"
            );
        }
        PipelineStats::add(&self.stats.item_failures, outcome.failed_items as u64);

        tracing::debug!(
            submitted = outcome.submitted,
            skipped = outcome.skipped,
            failed_items = outcome.failed_items,
            took_ms = ?response.took_ms,
            "Batch written"
        );
        outcome
    }

    /// Make sure the document's index exists, consulting the cache first
    async fn ensure_index(&self, document: &Document) -> Result<(), ProvisioningError> {
        let key = existence_key(&document.index_name, &document.type_name);
        if self.cache.contains(&key) {
            return Ok(());
        }

        let exists = self
            .store
            .index_exists(&document.index_name)
            .await
            .map_err(ProvisioningError::ExistenceCheck)?;

        if !exists {
            let body = self
                .registry
                .create_body(&document.index_base_name)
                .ok_or_else(|| ProvisioningError::UnknownMapping(document.index_base_name.clone()))?;
            let acknowledged = self
                .store
                .create_index(&document.index_name, &body)
                .await
                .map_err(ProvisioningError::Create)?;
            if !acknowledged {
                return Err(ProvisioningError::NotAcknowledged);
            }
            tracing::info!(index = %document.index_name, "Index created");
        }

        self.cache.mark_present(key);
        Ok(())
    }
}
