//! Queue publish endpoint
//!
//! Stores the raw request body on the trace stream for the queue consumer.
//! The body is not decoded here; undecodable payloads are rejected by the
//! consumer.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::CollectorState;
use crate::api::types::ApiError;
use crate::core::constants::{
    QUEUE_PUBLISH_BASE_DELAY_MS, QUEUE_PUBLISH_MAX_ATTEMPTS, QUEUE_RETRY_AFTER_SECS,
};
use crate::utils::retry::retry_with_backoff_async;

pub async fn publish(State(state): State<CollectorState>, body: Bytes) -> Response {
    let Some(topic) = &state.queue_topic else {
        return ApiError::not_found("QUEUE_DISABLED", "Queue intake is disabled").into_response();
    };

    match retry_with_backoff_async(QUEUE_PUBLISH_MAX_ATTEMPTS, QUEUE_PUBLISH_BASE_DELAY_MS, || {
        topic.publish(&body)
    })
    .await
    {
        Ok((id, attempts)) => {
            if attempts > 1 {
                tracing::debug!(attempts, "Queue publish succeeded after retry");
            }
            (StatusCode::ACCEPTED, Json(json!({ "id": id }))).into_response()
        }
        Err((e, attempts)) => {
            tracing::warn!(error = %e, attempts, topic = %topic.name(), "Failed to publish to queue after retries");
            (
                [(header::RETRY_AFTER, QUEUE_RETRY_AFTER_SECS.to_string())],
                ApiError::service_unavailable("Queue unavailable"),
            )
                .into_response()
        }
    }
}
