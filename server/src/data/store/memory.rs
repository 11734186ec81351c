//! In-memory document store
//!
//! For local development and tests. Indices must be created before writes:
//! bulk items targeting a missing index fail with `404`, as Elasticsearch does
//! when automatic index creation is disabled.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use super::backend::DocumentStore;
use super::error::StoreError;
use super::types::{BulkIndexOp, BulkItemResult, BulkResponse};

#[derive(Debug, Default)]
struct MemoryIndex {
    body: JsonValue,
    documents: Vec<JsonValue>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    indices: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all created indices, sorted
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Documents stored in an index, in write order
    pub fn documents(&self, index: &str) -> Vec<JsonValue> {
        self.indices
            .read()
            .get(index)
            .map(|idx| idx.documents.clone())
            .unwrap_or_default()
    }

    /// Creation body an index was created with
    pub fn index_body(&self, index: &str) -> Option<JsonValue> {
        self.indices.read().get(index).map(|idx| idx.body.clone())
    }

    /// Total documents across all indices
    pub fn document_count(&self) -> usize {
        self.indices.read().values().map(|idx| idx.documents.len()).sum()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        Ok(self.indices.read().contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &JsonValue) -> Result<bool, StoreError> {
        let mut indices = self.indices.write();
        indices.entry(index.to_string()).or_insert_with(|| MemoryIndex {
            body: body.clone(),
            documents: Vec::new(),
        });
        Ok(true)
    }

    async fn bulk_write(&self, ops: &[BulkIndexOp]) -> Result<BulkResponse, StoreError> {
        let mut indices = self.indices.write();
        let mut items = Vec::with_capacity(ops.len());

        for op in ops {
            let item = match indices.get_mut(&op.index) {
                Some(idx) => {
                    idx.documents.push(op.document.clone());
                    BulkItemResult {
                        index: op.index.clone(),
                        id: Some(idx.documents.len().to_string()),
                        status: 201,
                        error: None,
                    }
                }
                None => BulkItemResult {
                    index: op.index.clone(),
                    id: None,
                    status: 404,
                    error: Some(format!("index_not_found_exception: no such index [{}]", op.index)),
                },
            };
            items.push(item);
        }

        Ok(BulkResponse {
            took_ms: Some(0),
            errors: items.iter().any(|item| !item.is_success()),
            items,
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
