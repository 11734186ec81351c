//! Bulk request and response types shared by all store backends

use serde::Serialize;
use serde_json::Value as JsonValue;

/// One index action in a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkIndexOp {
    pub index: String,
    pub type_name: String,
    pub document: JsonValue,
}

/// Per-item outcome reported by a bulk write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItemResult {
    pub index: String,
    pub id: Option<String>,
    pub status: u16,
    /// Error detail (`type: reason`) for failed items
    pub error: Option<String>,
}

impl BulkItemResult {
    /// Any 2xx status counts as success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Structured bulk write response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkResponse {
    pub took_ms: Option<u64>,
    /// Store-reported flag that at least one item failed
    pub errors: bool,
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| !item.is_success())
    }
}
