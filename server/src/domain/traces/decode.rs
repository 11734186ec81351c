//! OTLP trace payload decoding
//!
//! Payloads are `ExportTraceServiceRequest` messages in protobuf or JSON
//! encoding. HTTP requests declare their encoding through `Content-Type`;
//! queue messages carry no metadata, so their encoding is sniffed.

use std::sync::Arc;

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;

use super::span::Span;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wire encoding of a trace payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Protobuf,
    Json,
}

impl PayloadFormat {
    /// Encoding declared by a `Content-Type` value, protobuf when missing or unrecognized
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.trim_start().starts_with("application/json") => Self::Json,
            _ => Self::Protobuf,
        }
    }

    /// Guess the encoding of an unlabeled payload
    ///
    /// JSON requests are objects, so the first non-whitespace byte is `{`. A
    /// protobuf request starts with a field tag, which is never `{`.
    pub fn sniff(payload: &[u8]) -> Self {
        match payload.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Self::Json,
            _ => Self::Protobuf,
        }
    }
}

/// Decode a raw payload into an OTLP export request
pub fn decode_request(
    payload: &[u8],
    format: PayloadFormat,
) -> Result<ExportTraceServiceRequest, DecodeError> {
    let request = match format {
        PayloadFormat::Protobuf => ExportTraceServiceRequest::decode(payload)?,
        PayloadFormat::Json => serde_json::from_slice(payload)?,
    };
    Ok(request)
}

/// Decode a raw payload into spans, flattening resource and scope levels
pub fn decode(payload: &[u8], format: PayloadFormat) -> Result<Vec<Span>, DecodeError> {
    Ok(flatten(decode_request(payload, format)?))
}

fn flatten(request: ExportTraceServiceRequest) -> Vec<Span> {
    let mut spans = Vec::new();
    for resource_spans in request.resource_spans {
        let resource = Arc::new(
            resource_spans
                .resource
                .map(|r| r.attributes)
                .unwrap_or_default(),
        );
        for scope_spans in resource_spans.scope_spans {
            let (scope_name, scope_version) = scope_spans
                .scope
                .map(|s| (s.name, s.version))
                .unwrap_or_default();
            for inner in scope_spans.spans {
                spans.push(Span {
                    resource: Arc::clone(&resource),
                    scope_name: scope_name.clone(),
                    scope_version: scope_version.clone(),
                    inner,
                });
            }
        }
    }
    spans
}
