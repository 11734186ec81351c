//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

use super::middleware;
use super::routes::collector::{self, CollectorState};
use super::routes::health;
use super::routes::stats::{self, StatsState};
use crate::core::CoreApp;
use crate::core::constants::INGEST_BODY_LIMIT;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Serve until shutdown is triggered; returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;
        let shutdown = app.shutdown.clone();

        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let addr = SocketAddr::new(
            host.parse()
                .with_context(|| format!("Invalid server host: {host}"))?,
            port,
        );

        let queue_topic = app
            .topics
            .as_ref()
            .map(|topics| topics.stream_topic(&app.config.queue.topic));
        let router = build_router(
            CollectorState {
                intake: app.intake.clone(),
                queue_topic,
            },
            StatsState {
                stats: Arc::clone(&app.stats),
                cache: Arc::clone(&app.cache),
                queue: app.topics.as_ref().map(|topics| {
                    (
                        Arc::clone(topics),
                        app.config.queue.topic.clone(),
                        app.config.queue.group.clone(),
                    )
                }),
            },
        );

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        tracing::info!(%addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}

/// Assemble the full router
pub fn build_router(collector: CollectorState, stats: StatsState) -> Router {
    let stats_routes = Router::new()
        .route("/api/v1/stats", get(stats::stats))
        .with_state(stats);

    Router::new()
        .route("/api/v1/health", get(health::health))
        .nest("/api/v1", collector::routes(collector))
        .merge(stats_routes)
        .fallback(middleware::handle_404)
        .layer(DefaultBodyLimit::max(INGEST_BODY_LIMIT))
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
