//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::api::ApiServer;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{
    APP_NAME, DEFAULT_LOG_FILTER, ENV_LOG, ENV_LOG_FORMAT, SHUTDOWN_TIMEOUT_SECS,
};
use crate::core::shutdown::ShutdownService;
use crate::data::cache::ExistenceCache;
use crate::data::store::{self, DocumentStore};
use crate::data::topics::TopicService;
use crate::domain::pipeline::{CollectorService, PipelineError, PipelineStats, SpanIntake};
use crate::domain::traces::AssembleOptions;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    /// `None` when the queue is disabled
    pub topics: Option<Arc<TopicService>>,
    pub cache: Arc<ExistenceCache>,
    pub intake: SpanIntake,
    pub stats: Arc<PipelineStats>,
    collector: Option<CollectorService>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::CheckConfig) => return Self::check_config(&cli_config),
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let store = store::from_config(&config.store)
            .map_err(|e| anyhow::anyhow!("Failed to initialize document store: {}", e))?;
        if let Err(e) = store.health_check().await {
            tracing::warn!(error = %e, backend = store.backend_name(), "Document store is not reachable yet");
        }
        tracing::debug!(backend = store.backend_name(), "Document store initialized");

        let registry = Arc::new(store::mapping_registry(&config.store)?);
        let cache = Arc::new(ExistenceCache::new(Duration::from_secs(
            config.pipeline.cache_ttl_secs,
        )));

        let mut collector = CollectorService::new(
            &config.pipeline,
            AssembleOptions::from_store_config(&config.store),
            Arc::clone(&store),
            registry,
            Arc::clone(&cache),
        );

        let topics = if config.queue.enabled {
            let topics = Arc::new(
                TopicService::from_queue_config(&config.queue)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to initialize queue: {}", e))?,
            );
            tracing::debug!(backend = topics.backend_name(), "Queue initialized");
            collector = collector.with_queue(topics.stream_topic(&config.queue.topic), &config.queue);
            Some(topics)
        } else {
            tracing::debug!("Queue disabled");
            None
        };

        Ok(Self {
            shutdown: ShutdownService::new(),
            intake: collector.intake(),
            stats: collector.stats(),
            config,
            store,
            topics,
            cache,
            collector: Some(collector),
        })
    }

    fn check_config(cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;
        let registry = store::mapping_registry(&config.store)?;

        println!("{} configuration OK\n", APP_NAME);
        println!("{:#?}", config.redacted());
        println!("\nIndex mappings: {}", registry.base_names().join(", "));
        Ok(())
    }

    fn init_logging() {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let json = std::env::var(ENV_LOG_FORMAT)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_env_filter(filter);

        if json {
            builder.json().init();
        } else {
            builder.with_ansi(true).compact().init();
        }
    }

    async fn start_server(mut app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;
        let shutdown = app.shutdown.clone();
        let pipeline = spawn_pipeline(app.collector.take(), &shutdown);

        tracing::info!(
            host = %app.config.server.host,
            port = app.config.server.port,
            store = app.store.backend_name(),
            queue = app.topics.as_ref().map(|t| t.backend_name()).unwrap_or("disabled"),
            "{} started",
            APP_NAME
        );

        let server = ApiServer::new(app);
        let served = server.start().await;

        // Cancels the pipeline even when the server failed
        shutdown.shutdown().await;
        let stopped = await_pipeline(pipeline, Duration::from_secs(SHUTDOWN_TIMEOUT_SECS)).await;

        served?;
        stopped
    }

    pub async fn start_background_tasks(&self) {
        self.shutdown
            .register(self.cache.start_sweep_task(self.shutdown.subscribe()))
            .await;

        tracing::debug!("Background tasks started");
    }
}

/// Spawn the pipeline; when it stops on its own, the whole process shuts down
fn spawn_pipeline(
    collector: Option<CollectorService>,
    shutdown: &ShutdownService,
) -> JoinHandle<Result<(), PipelineError>> {
    let token = shutdown.cancellation_token();
    let shutdown = shutdown.clone();
    let handle = collector.map(|collector| collector.start(token));

    tokio::spawn(async move {
        let Some(handle) = handle else {
            return Ok(());
        };
        let result = handle
            .await
            .unwrap_or_else(|e| Err(PipelineError::WorkerAborted(e.to_string())));

        if !shutdown.is_triggered() {
            match &result {
                Err(e) => tracing::error!(error = %e, "Collector pipeline failed, shutting down"),
                Ok(()) => tracing::warn!("Collector pipeline stopped, shutting down"),
            }
            shutdown.trigger();
        }
        result
    })
}

/// Wait for a cancelled pipeline to finish draining
async fn await_pipeline(
    pipeline: JoinHandle<Result<(), PipelineError>>,
    timeout: Duration,
) -> Result<()> {
    match tokio::time::timeout(timeout, pipeline).await {
        Ok(Ok(result)) => result.context("Collector pipeline failed"),
        Ok(Err(e)) => Err(anyhow::anyhow!("Collector pipeline task failed: {}", e)),
        Err(_) => {
            tracing::warn!("Timeout waiting for collector pipeline to stop");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::config::{PipelineConfig, StoreConfig};
    use crate::data::store::{MappingRegistry, MemoryStore};
    use crate::domain::pipeline::EnqueueOutcome;

    fn collector() -> CollectorService {
        CollectorService::new(
            &PipelineConfig::default(),
            AssembleOptions::from_store_config(&StoreConfig::default()),
            Arc::new(MemoryStore::new()),
            Arc::new(MappingRegistry::new("span", false)),
            Arc::new(ExistenceCache::new(Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn test_shutdown_stops_pipeline_workers() {
        let shutdown = ShutdownService::new();
        let collector = collector();
        let intake = collector.intake();
        let pipeline = spawn_pipeline(Some(collector), &shutdown);

        assert_eq!(intake.try_enqueue(Vec::new()), EnqueueOutcome::Enqueued);
        shutdown.trigger();

        await_pipeline(pipeline, Duration::from_secs(2)).await.unwrap();
        // The accumulator has exited and closed the span channel
        assert_eq!(intake.try_enqueue(Vec::new()), EnqueueOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_pipeline_error_is_reported() {
        let pipeline = tokio::spawn(async { Err(PipelineError::SpanChannelClosed) });
        let result = await_pipeline(pipeline, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_without_collector_finishes_immediately() {
        let shutdown = ShutdownService::new();
        let pipeline = spawn_pipeline(None, &shutdown);
        await_pipeline(pipeline, Duration::from_secs(1)).await.unwrap();
        assert!(!shutdown.is_triggered());
    }
}
