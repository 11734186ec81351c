//! Span to document conversion

use std::sync::Arc;

use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::trace::v1::Span as OtlpSpan;
use serde_json::{Value as JsonValue, json};

use crate::core::config::StoreConfig;
use crate::core::constants::SPAN_INDEX_BASE_NAME;
use crate::data::store::BulkIndexOp;
use crate::utils::otlp::{
    SERVICE_NAME_ATTR, attributes_to_json, find_string_attr, span_kind_name, status_code_name,
};
use crate::utils::time::{nanos_to_datetime, to_iso};

const TRACE_ID_LEN: usize = 16;
const SPAN_ID_LEN: usize = 8;

/// Error converting a span into a document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("trace id must be {TRACE_ID_LEN} bytes, got {0}")]
    InvalidTraceId(usize),

    #[error("span id must be {SPAN_ID_LEN} bytes, got {0}")]
    InvalidSpanId(usize),

    #[error("invalid span start time: {0}")]
    InvalidStartTime(u64),
}

/// Naming applied to assembled documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOptions {
    pub index_prefix: String,
    pub type_name: String,
}

impl AssembleOptions {
    pub fn from_store_config(config: &StoreConfig) -> Self {
        Self {
            index_prefix: config.index_prefix.clone(),
            type_name: config.type_name.clone(),
        }
    }
}

/// A decoded span with the resource and scope it was reported under
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    /// Resource attributes, shared by every span of the same resource
    pub resource: Arc<Vec<KeyValue>>,
    pub scope_name: String,
    pub scope_version: String,
    pub inner: OtlpSpan,
}

impl Span {
    pub fn trace_id_hex(&self) -> String {
        hex::encode(&self.inner.trace_id)
    }

    pub fn span_id_hex(&self) -> String {
        hex::encode(&self.inner.span_id)
    }

    pub fn service_name(&self) -> Option<&str> {
        find_string_attr(&self.resource, SERVICE_NAME_ATTR)
    }

    /// Convert the span into a persistable document
    ///
    /// The target index is sharded by the UTC day of the span start:
    /// `{prefix}-span-{YYYY.MM.DD}`.
    pub fn assemble(&self, options: &AssembleOptions) -> Result<Document, AssemblyError> {
        let span = &self.inner;
        if span.trace_id.len() != TRACE_ID_LEN {
            return Err(AssemblyError::InvalidTraceId(span.trace_id.len()));
        }
        if span.span_id.len() != SPAN_ID_LEN {
            return Err(AssemblyError::InvalidSpanId(span.span_id.len()));
        }
        let start = nanos_to_datetime(span.start_time_unix_nano)
            .ok_or(AssemblyError::InvalidStartTime(span.start_time_unix_nano))?;
        let end = nanos_to_datetime(span.end_time_unix_nano);

        let duration_ms = span
            .end_time_unix_nano
            .checked_sub(span.start_time_unix_nano)
            .filter(|_| end.is_some())
            .map(|nanos| nanos as f64 / 1_000_000.0)
            .unwrap_or(0.0);

        let parent_span_id = (!span.parent_span_id.is_empty())
            .then(|| hex::encode(&span.parent_span_id));
        let trace_state = (!span.trace_state.is_empty()).then(|| span.trace_state.clone());
        let (status_code, status_message) = match &span.status {
            Some(status) => (
                status_code_name(status.code),
                (!status.message.is_empty()).then(|| status.message.clone()),
            ),
            None => (status_code_name(0), None),
        };

        let events: Vec<JsonValue> = span
            .events
            .iter()
            .map(|event| {
                json!({
                    "name": event.name,
                    "timestamp": nanos_to_datetime(event.time_unix_nano).map(|t| to_iso(&t)),
                    "attributes": attributes_to_json(&event.attributes),
                })
            })
            .collect();

        let links: Vec<JsonValue> = span
            .links
            .iter()
            .map(|link| {
                json!({
                    "trace_id": hex::encode(&link.trace_id),
                    "span_id": hex::encode(&link.span_id),
                    "attributes": attributes_to_json(&link.attributes),
                })
            })
            .collect();

        let payload = json!({
            "trace_id": self.trace_id_hex(),
            "span_id": self.span_id_hex(),
            "parent_span_id": parent_span_id,
            "trace_state": trace_state,
            "name": span.name,
            "kind": span_kind_name(span.kind),
            "status_code": status_code,
            "status_message": status_message,
            "service_name": self.service_name(),
            "start_time": to_iso(&start),
            "end_time": end.map(|t| to_iso(&t)),
            "duration_ms": duration_ms,
            "attributes": attributes_to_json(&span.attributes),
            "resource": attributes_to_json(&self.resource),
            "scope": {
                "name": self.scope_name,
                "version": self.scope_version,
            },
            "events": events,
            "links": links,
        });

        Ok(Document {
            index_name: format!(
                "{}-{}-{}",
                options.index_prefix,
                SPAN_INDEX_BASE_NAME,
                start.format("%Y.%m.%d")
            ),
            index_base_name: SPAN_INDEX_BASE_NAME.to_string(),
            type_name: options.type_name.clone(),
            payload,
        })
    }
}

/// Persistable representation of a span
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Concrete, day-sharded index
    pub index_name: String,
    /// Mapping family of the index
    pub index_base_name: String,
    pub type_name: String,
    pub payload: JsonValue,
}

impl Document {
    pub fn into_bulk_op(self) -> BulkIndexOp {
        BulkIndexOp {
            index: self.index_name,
            type_name: self.type_name,
            document: self.payload,
        }
    }
}
