//! Payload format detection and intake acknowledgments

use axum::Json;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::domain::traces::PayloadFormat;

/// Payload format declared by the request's `Content-Type`
#[inline]
pub fn payload_format(headers: &HeaderMap) -> PayloadFormat {
    PayloadFormat::from_content_type(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    )
}

/// Acknowledgment for the direct push endpoint
///
/// Every outcome answers `200`; only the `msg` field tells them apart, and a
/// dropped request looks like the generic default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestAck {
    DecodeError,
    Accepted,
    Default,
}

impl IngestAck {
    pub fn msg(self) -> &'static str {
        match self {
            IngestAck::DecodeError => "error trace log",
            IngestAck::Accepted => "accepted",
            IngestAck::Default => "default",
        }
    }
}

impl IntoResponse for IngestAck {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(json!({ "msg": self.msg() }))).into_response()
    }
}
