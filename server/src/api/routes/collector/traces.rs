//! Direct span push endpoint

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;

use super::CollectorState;
use super::encoding::{IngestAck, payload_format};
use crate::domain::pipeline::{EnqueueOutcome, PipelineStats};
use crate::domain::traces::decode;

/// Decode the payload and hand its spans to the pipeline without waiting
pub async fn push(
    State(state): State<CollectorState>,
    headers: HeaderMap,
    body: Bytes,
) -> IngestAck {
    let format = payload_format(&headers);

    let spans = match decode(&body, format) {
        Ok(spans) => spans,
        Err(e) => {
            PipelineStats::incr(&state.intake.stats().decode_errors);
            tracing::warn!(error = %e, ?format, bytes = body.len(), "Failed to decode trace payload");
            return IngestAck::DecodeError;
        }
    };

    if spans.is_empty() {
        return IngestAck::Accepted;
    }

    match state.intake.try_enqueue(spans) {
        EnqueueOutcome::Enqueued => IngestAck::Accepted,
        EnqueueOutcome::Dropped => IngestAck::Default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span as OtlpSpan};
    use prost::Message;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use super::super::{CollectorState, routes};
    use crate::domain::pipeline::{PipelineStats, SpanIntake};
    use crate::domain::traces::Span;

    fn payload() -> Vec<u8> {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                scope_spans: vec![ScopeSpans {
                    spans: vec![OtlpSpan {
                        trace_id: vec![1; 16],
                        span_id: vec![2; 8],
                        name: "GET /".to_string(),
                        start_time_unix_nano: 1_000_000_000,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
        .encode_to_vec()
    }

    fn app(capacity: usize) -> (Router, mpsc::Receiver<Vec<Span>>, Arc<PipelineStats>) {
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(PipelineStats::new());
        let state = CollectorState {
            intake: SpanIntake::new(tx, Arc::clone(&stats)),
            queue_topic: None,
        };
        (routes(state), rx, stats)
    }

    fn post(content_type: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/traces")
            .header(header::CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    async fn msg(response: axum::response::Response) -> String {
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        json["msg"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_push_accepted() {
        let (app, mut rx, _) = app(4);
        let response = app
            .oneshot(post("application/x-protobuf", payload()))
            .await
            .unwrap();

        assert_eq!(msg(response).await, "accepted");
        let spans = rx.try_recv().unwrap();
        assert_eq!(spans[0].inner.name, "GET /");
    }

    #[tokio::test]
    async fn test_push_decode_error_enqueues_nothing() {
        let (app, mut rx, stats) = app(4);
        let response = app
            .oneshot(post("application/json", "{ not json"))
            .await
            .unwrap();

        assert_eq!(msg(response).await, "error trace log");
        assert!(rx.try_recv().is_err());
        assert_eq!(stats.snapshot().decode_errors, 1);
    }

    #[tokio::test]
    async fn test_push_full_channel_returns_default_without_blocking() {
        let (app, mut rx, stats) = app(1);
        let first = app
            .clone()
            .oneshot(post("application/x-protobuf", payload()))
            .await
            .unwrap();
        assert_eq!(msg(first).await, "accepted");

        // Nothing drains the channel; the handler must still answer promptly
        let second = tokio::time::timeout(
            Duration::from_millis(500),
            app.oneshot(post("application/x-protobuf", payload())),
        )
        .await
        .expect("handler blocked on a full channel")
        .unwrap();
        assert_eq!(msg(second).await, "default");

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(stats.snapshot().spans_dropped, 1);
    }

    #[tokio::test]
    async fn test_push_empty_request() {
        let (app, mut rx, _) = app(4);
        let response = app
            .oneshot(post("application/json", r#"{"resourceSpans":[]}"#))
            .await
            .unwrap();

        assert_eq!(msg(response).await, "accepted");
        assert!(rx.try_recv().is_err());
    }
}
