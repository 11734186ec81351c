//! Document store trait definition

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::error::StoreError;
use super::types::{BulkIndexOp, BulkResponse};

/// Document store backend
///
/// Implemented by the Elasticsearch client and the in-memory store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether the index exists
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    /// Create an index with the given creation body (settings + mappings)
    ///
    /// Returns whether the store acknowledged the creation.
    async fn create_index(&self, index: &str, body: &JsonValue) -> Result<bool, StoreError>;

    /// Execute one bulk write
    ///
    /// Transport failures and missing responses are errors; per-item
    /// failures are reported in the returned [`BulkResponse`].
    async fn bulk_write(&self, ops: &[BulkIndexOp]) -> Result<BulkResponse, StoreError>;

    /// Health check (validates connectivity)
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
