//! Pipeline statistics endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::data::cache::ExistenceCache;
use crate::data::topics::{StreamStats, TopicService};
use crate::domain::pipeline::{PipelineStats, PipelineStatsSnapshot};

#[derive(Clone)]
pub struct StatsState {
    pub stats: Arc<PipelineStats>,
    pub cache: Arc<ExistenceCache>,
    /// Topic service with the consumed topic and group, when the queue is enabled
    pub queue: Option<(Arc<TopicService>, String, String)>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub pipeline: PipelineStatsSnapshot,
    pub cached_indices: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<StreamStats>,
}

pub async fn stats(State(state): State<StatsState>) -> Response {
    let queue = match &state.queue {
        Some((topics, topic, group)) => match topics.stream_stats(topic, group).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read queue stream stats");
                None
            }
        },
        None => None,
    };

    Json(StatsResponse {
        pipeline: state.stats.snapshot(),
        cached_indices: state.cache.entry_count(),
        queue,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn get_stats(state: StatsState) -> serde_json::Value {
        let app = Router::new()
            .route("/api/v1/stats", get(stats))
            .with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_stats_without_queue() {
        let stats = Arc::new(PipelineStats::new());
        PipelineStats::add(&stats.spans_dropped, 3);
        let cache = Arc::new(ExistenceCache::new(Duration::from_secs(60)));
        cache.mark_present("idx/span".to_string());
        cache.sweep();

        let json = get_stats(StatsState {
            stats,
            cache,
            queue: None,
        })
        .await;

        assert_eq!(json["pipeline"]["spans_dropped"], 3);
        assert_eq!(json["cached_indices"], 1);
        assert!(json.get("queue").is_none());
    }

    #[tokio::test]
    async fn test_stats_with_queue() {
        let topics = Arc::new(TopicService::new());
        topics.stream_topic("traces").publish(b"payload").await.unwrap();

        let json = get_stats(StatsState {
            stats: Arc::new(PipelineStats::new()),
            cache: Arc::new(ExistenceCache::new(Duration::from_secs(60))),
            queue: Some((topics, "traces".to_string(), "tracedock".to_string())),
        })
        .await;

        assert_eq!(json["queue"]["length"], 1);
    }
}
