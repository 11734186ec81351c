//! Elasticsearch document store over the REST API
//!
//! - `HEAD /{index}` for existence checks
//! - `PUT /{index}` for index creation
//! - `POST /_bulk` with an NDJSON body for writes

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde_json::{Value as JsonValue, json};

use super::backend::DocumentStore;
use super::error::StoreError;
use super::types::{BulkIndexOp, BulkItemResult, BulkResponse};
use crate::core::config::StoreConfig;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Error type returned when another writer created the index first
const ALREADY_EXISTS_ERROR: &str = "resource_already_exists_exception";

#[derive(Debug)]
pub struct ElasticsearchStore {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    legacy_types: bool,
}

impl ElasticsearchStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {}", e)))?;

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };

        tracing::debug!(
            url = %config.url,
            auth = credentials.is_some(),
            legacy_types = config.legacy_types,
            "Elasticsearch store initialized"
        );
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials,
            legacy_types: config.legacy_types,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let resp = self.request(reqwest::Method::HEAD, index).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::status("HEAD", index, status.as_u16(), "")),
        }
    }

    async fn create_index(&self, index: &str, body: &JsonValue) -> Result<bool, StoreError> {
        let resp = self
            .request(reqwest::Method::PUT, index)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        let parsed: JsonValue = serde_json::from_str(&text).unwrap_or(JsonValue::Null);

        if status.is_success() {
            return Ok(parsed["acknowledged"].as_bool().unwrap_or(false));
        }
        if parsed["error"]["type"].as_str() == Some(ALREADY_EXISTS_ERROR) {
            tracing::debug!(index, "Index created concurrently by another writer");
            return Ok(true);
        }
        Err(StoreError::status("PUT", index, status.as_u16(), text))
    }

    async fn bulk_write(&self, ops: &[BulkIndexOp]) -> Result<BulkResponse, StoreError> {
        let body = build_bulk_body(ops, self.legacy_types)?;
        let resp = self
            .request(reqwest::Method::POST, "_bulk")
            .header(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE))
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::status("POST", "_bulk", status.as_u16(), text));
        }
        if text.trim().is_empty() {
            return Err(StoreError::EmptyResponse);
        }
        let parsed: JsonValue = serde_json::from_str(&text)?;
        parse_bulk_response(&parsed)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let resp = self
            .request(reqwest::Method::GET, "_cluster/health")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::status(
                "GET",
                "_cluster/health",
                resp.status().as_u16(),
                resp.text().await.unwrap_or_default(),
            ));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "elasticsearch"
    }
}

/// Build the NDJSON bulk body: one action line and one source line per op
pub(crate) fn build_bulk_body(ops: &[BulkIndexOp], legacy_types: bool) -> Result<String, StoreError> {
    let mut body = String::new();
    for op in ops {
        let action = if legacy_types {
            json!({ "index": { "_index": op.index, "_type": op.type_name } })
        } else {
            json!({ "index": { "_index": op.index } })
        };
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&op.document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Parse a `_bulk` response body into per-item results
///
/// Items without an action object or a status are logged and left out.
pub(crate) fn parse_bulk_response(value: &JsonValue) -> Result<BulkResponse, StoreError> {
    let items = value["items"]
        .as_array()
        .ok_or_else(|| StoreError::InvalidResponse("bulk response without items".to_string()))?;

    let mut results = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        // Each item is keyed by its action: {"index": {...}}
        let Some(detail) = item.as_object().and_then(|o| o.values().next()) else {
            tracing::warn!(position, item = %item, "Skipping malformed bulk item");
            continue;
        };
        let Some(status) = detail["status"].as_u64().and_then(|s| u16::try_from(s).ok()) else {
            tracing::warn!(position, item = %item, "Skipping bulk item without status");
            continue;
        };

        results.push(BulkItemResult {
            index: detail["_index"].as_str().unwrap_or_default().to_string(),
            id: detail["_id"].as_str().map(str::to_string),
            status,
            error: detail.get("error").map(describe_error),
        });
    }

    Ok(BulkResponse {
        took_ms: value["took"].as_u64(),
        errors: value["errors"].as_bool().unwrap_or(false),
        items: results,
    })
}

/// Render an Elasticsearch error object as `type: reason`
fn describe_error(error: &JsonValue) -> String {
    match (error["type"].as_str(), error["reason"].as_str()) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        (Some(kind), None) => kind.to_string(),
        _ => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(index: &str, doc: JsonValue) -> BulkIndexOp {
        BulkIndexOp {
            index: index.to_string(),
            type_name: "span".to_string(),
            document: doc,
        }
    }

    #[test]
    fn test_build_bulk_body() {
        let ops = vec![
            op("traces-a", json!({ "name": "GET /" })),
            op("traces-b", json!({ "name": "SELECT" })),
        ];
        let body = build_bulk_body(&ops, false).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));
        assert_eq!(
            serde_json::from_str::<JsonValue>(lines[0]).unwrap(),
            json!({ "index": { "_index": "traces-a" } })
        );
        assert_eq!(
            serde_json::from_str::<JsonValue>(lines[3]).unwrap(),
            json!({ "name": "SELECT" })
        );
    }

    #[test]
    fn test_build_bulk_body_legacy_types() {
        let body = build_bulk_body(&[op("idx", json!({}))], true).unwrap();
        let action: JsonValue = serde_json::from_str(body.lines().next().unwrap()).unwrap();
        assert_eq!(action["index"]["_type"], "span");
    }

    #[test]
    fn test_parse_bulk_response_mixed() {
        let value = json!({
            "took": 7,
            "errors": true,
            "items": [
                { "index": { "_index": "idx", "_id": "1", "status": 201 } },
                { "index": { "_index": "idx", "_id": "2", "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "failed to parse" } } }
            ]
        });
        let response = parse_bulk_response(&value).unwrap();

        assert_eq!(response.took_ms, Some(7));
        assert!(response.errors);
        assert_eq!(response.items.len(), 2);
        assert!(response.items[0].is_success());
        assert_eq!(response.items[1].status, 400);
        assert_eq!(
            response.items[1].error.as_deref(),
            Some("mapper_parsing_exception: failed to parse")
        );
    }

    #[test]
    fn test_parse_bulk_response_skips_item_without_status() {
        let value = json!({
            "errors": true,
            "items": [
                { "index": { "_index": "idx", "_id": "1", "status": 201 } },
                { "index": { "_index": "idx", "_id": "2", "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "failed to parse" } } },
                { "index": { "_index": "idx", "_id": "3" } },
                "not an object"
            ]
        });
        let response = parse_bulk_response(&value).unwrap();

        assert_eq!(response.items.len(), 2);
        let failed: Vec<_> = response.failed_items().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id.as_deref(), Some("2"));
        assert_eq!(failed[0].status, 400);
    }

    #[test]
    fn test_parse_bulk_response_without_items() {
        let result = parse_bulk_response(&json!({ "took": 1 }));
        assert!(matches!(result, Err(StoreError::InvalidResponse(_))));
    }

    #[test]
    fn test_describe_error_fallback() {
        assert_eq!(describe_error(&json!("boom")), "\"boom\"");
        assert_eq!(describe_error(&json!({ "type": "x" })), "x");
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = StoreConfig {
            url: "http://localhost:9200/".to_string(),
            ..Default::default()
        };
        let store = ElasticsearchStore::new(&config).unwrap();
        assert_eq!(store.base_url, "http://localhost:9200");
        assert_eq!(store.backend_name(), "elasticsearch");
    }
}
