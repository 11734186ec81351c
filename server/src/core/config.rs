use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BATCH_CHANNEL_CAPACITY, DEFAULT_BULK_SIZE,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_INDEX_PREFIX,
    DEFAULT_PORT, DEFAULT_QUEUE_BUFFER, DEFAULT_QUEUE_GROUP, DEFAULT_QUEUE_TOPIC,
    DEFAULT_SPAN_CHANNEL_CAPACITY, DEFAULT_STORE_TIMEOUT_SECS, DEFAULT_STORE_URL,
    DEFAULT_TYPE_NAME, MAX_QUEUE_BUFFER,
};

// =============================================================================
// Backend Enums
// =============================================================================

/// Queue backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendType {
    #[default]
    Memory,
    Redis,
}

impl fmt::Display for QueueBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueBackendType::Memory => write!(f, "memory"),
            QueueBackendType::Redis => write!(f, "redis"),
        }
    }
}

/// Document store backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendType {
    #[default]
    Elasticsearch,
    Memory,
}

impl fmt::Display for StoreBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackendType::Elasticsearch => write!(f, "elasticsearch"),
            StoreBackendType::Memory => write!(f, "memory"),
        }
    }
}

/// Where a consumer group with no committed position starts reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Only messages published after the group joined
    #[default]
    Newest,
    /// Everything still retained in the stream
    Oldest,
}

impl OffsetReset {
    /// Parse an offset policy, falling back to `Newest` with a warning
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "newest" => OffsetReset::Newest,
            "oldest" => OffsetReset::Oldest,
            other => {
                tracing::warn!(
                    offset = %other,
                    "Invalid queue.offset (expected newest or oldest), using newest"
                );
                OffsetReset::Newest
            }
        }
    }
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetReset::Newest => write!(f, "newest"),
            OffsetReset::Oldest => write!(f, "oldest"),
        }
    }
}

/// Clamp the signed consumer buffer to the accepted range, warning on fallback
///
/// Zero is kept; backends read at least one message per fetch.
pub fn resolve_queue_buffer(raw: i64) -> usize {
    if !(0..=MAX_QUEUE_BUFFER).contains(&raw) {
        tracing::warn!(
            buffer = raw,
            fallback = DEFAULT_QUEUE_BUFFER,
            "queue.buffer out of range, using fallback"
        );
        return DEFAULT_QUEUE_BUFFER as usize;
    }
    raw as usize
}

// =============================================================================
// File Config Sections
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Pipeline configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PipelineFileConfig {
    pub bulk_size: Option<usize>,
    pub span_channel_capacity: Option<usize>,
    pub batch_channel_capacity: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub flush_on_shutdown: Option<bool>,
    pub drain_timeout_ms: Option<u64>,
}

/// Queue configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueueFileConfig {
    pub enabled: Option<bool>,
    pub backend: Option<QueueBackendType>,
    pub redis_url: Option<String>,
    pub topic: Option<String>,
    pub group: Option<String>,
    pub buffer: Option<i64>,
    pub offset: Option<String>,
}

/// Document store configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StoreFileConfig {
    pub backend: Option<StoreBackendType>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
    pub index_prefix: Option<String>,
    pub type_name: Option<String>,
    pub legacy_types: Option<bool>,
    pub mappings_dir: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub pipeline: Option<PipelineFileConfig>,
    pub queue: Option<QueueFileConfig>,
    pub store: Option<StoreFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `$target` with `$source` when the source is set
macro_rules! merge_field {
    ($target:expr, $source:expr, $name:literal) => {
        if $source.is_some() {
            tracing::trace!(field = $name, value = ?$source, "Merging config field");
            $target = $source;
        }
    };
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            merge_field!(current.host, server.host, "server.host");
            merge_field!(current.port, server.port, "server.port");
        }

        if let Some(pipeline) = other.pipeline {
            let current = self.pipeline.get_or_insert_with(PipelineFileConfig::default);
            merge_field!(current.bulk_size, pipeline.bulk_size, "pipeline.bulk_size");
            merge_field!(
                current.span_channel_capacity,
                pipeline.span_channel_capacity,
                "pipeline.span_channel_capacity"
            );
            merge_field!(
                current.batch_channel_capacity,
                pipeline.batch_channel_capacity,
                "pipeline.batch_channel_capacity"
            );
            merge_field!(
                current.cache_ttl_secs,
                pipeline.cache_ttl_secs,
                "pipeline.cache_ttl_secs"
            );
            merge_field!(
                current.flush_on_shutdown,
                pipeline.flush_on_shutdown,
                "pipeline.flush_on_shutdown"
            );
            merge_field!(
                current.drain_timeout_ms,
                pipeline.drain_timeout_ms,
                "pipeline.drain_timeout_ms"
            );
        }

        if let Some(queue) = other.queue {
            let current = self.queue.get_or_insert_with(QueueFileConfig::default);
            merge_field!(current.enabled, queue.enabled, "queue.enabled");
            merge_field!(current.backend, queue.backend, "queue.backend");
            merge_field!(current.redis_url, queue.redis_url, "queue.redis_url");
            merge_field!(current.topic, queue.topic, "queue.topic");
            merge_field!(current.group, queue.group, "queue.group");
            merge_field!(current.buffer, queue.buffer, "queue.buffer");
            merge_field!(current.offset, queue.offset, "queue.offset");
        }

        if let Some(store) = other.store {
            let current = self.store.get_or_insert_with(StoreFileConfig::default);
            merge_field!(current.backend, store.backend, "store.backend");
            merge_field!(current.url, store.url, "store.url");
            merge_field!(current.username, store.username, "store.username");
            if store.password.is_some() {
                tracing::trace!("Merging store.password");
                current.password = store.password;
            }
            merge_field!(current.timeout_secs, store.timeout_secs, "store.timeout_secs");
            merge_field!(current.index_prefix, store.index_prefix, "store.index_prefix");
            merge_field!(current.type_name, store.type_name, "store.type_name");
            merge_field!(current.legacy_types, store.legacy_types, "store.legacy_types");
            merge_field!(current.mappings_dir, store.mappings_dir, "store.mappings_dir");
        }
    }
}

// =============================================================================
// Resolved Config
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bulk threshold: a batch never holds more documents than this
    pub bulk_size: usize,
    pub span_channel_capacity: usize,
    pub batch_channel_capacity: usize,
    pub cache_ttl_secs: u64,
    pub flush_on_shutdown: bool,
    pub drain_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bulk_size: DEFAULT_BULK_SIZE,
            span_channel_capacity: DEFAULT_SPAN_CHANNEL_CAPACITY,
            batch_channel_capacity: DEFAULT_BATCH_CHANNEL_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            flush_on_shutdown: true,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub enabled: bool,
    pub backend: QueueBackendType,
    pub redis_url: Option<String>,
    pub topic: String,
    pub group: String,
    /// Messages fetched per read, already clamped
    pub buffer: usize,
    pub offset: OffsetReset,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: QueueBackendType::Memory,
            redis_url: None,
            topic: DEFAULT_QUEUE_TOPIC.to_string(),
            group: DEFAULT_QUEUE_GROUP.to_string(),
            buffer: DEFAULT_QUEUE_BUFFER as usize,
            offset: OffsetReset::Newest,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackendType,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    pub index_prefix: String,
    pub type_name: String,
    /// Emit `_type` on bulk actions and nest mappings under the type name
    pub legacy_types: bool,
    pub mappings_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendType::Elasticsearch,
            url: DEFAULT_STORE_URL.to_string(),
            username: None,
            password: None,
            timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            type_name: DEFAULT_TYPE_NAME.to_string(),
            legacy_types: false,
            mappings_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub queue: QueueConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.tracedock/tracedock.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(file_config, cli);
        config.validate()?;

        tracing::debug!(config = ?config.redacted(), "Configuration loaded");
        Ok(config)
    }

    /// Layer defaults -> file config -> CLI/env overrides
    fn resolve(file_config: FileConfig, cli: &CliConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_pipeline = file_config.pipeline.unwrap_or_default();
        let file_queue = file_config.queue.unwrap_or_default();
        let file_store = file_config.store.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let pipeline_defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            bulk_size: cli
                .bulk_size
                .or(file_pipeline.bulk_size)
                .unwrap_or(pipeline_defaults.bulk_size),
            span_channel_capacity: cli
                .span_channel_capacity
                .or(file_pipeline.span_channel_capacity)
                .unwrap_or(pipeline_defaults.span_channel_capacity),
            batch_channel_capacity: file_pipeline
                .batch_channel_capacity
                .unwrap_or(pipeline_defaults.batch_channel_capacity),
            cache_ttl_secs: cli
                .cache_ttl_secs
                .or(file_pipeline.cache_ttl_secs)
                .unwrap_or(pipeline_defaults.cache_ttl_secs),
            flush_on_shutdown: cli
                .flush_on_shutdown
                .or(file_pipeline.flush_on_shutdown)
                .unwrap_or(pipeline_defaults.flush_on_shutdown),
            drain_timeout_ms: file_pipeline
                .drain_timeout_ms
                .unwrap_or(pipeline_defaults.drain_timeout_ms),
        };

        let queue_defaults = QueueConfig::default();
        let queue = QueueConfig {
            enabled: cli
                .queue_enabled
                .or(file_queue.enabled)
                .unwrap_or(queue_defaults.enabled),
            backend: cli
                .queue_backend
                .or(file_queue.backend)
                .unwrap_or(queue_defaults.backend),
            redis_url: cli
                .queue_redis_url
                .clone()
                .or(file_queue.redis_url)
                .filter(|u| !u.is_empty()),
            topic: cli
                .queue_topic
                .clone()
                .or(file_queue.topic)
                .unwrap_or(queue_defaults.topic),
            group: cli
                .queue_group
                .clone()
                .or(file_queue.group)
                .unwrap_or(queue_defaults.group),
            buffer: cli
                .queue_buffer
                .or(file_queue.buffer)
                .map(resolve_queue_buffer)
                .unwrap_or(queue_defaults.buffer),
            offset: cli
                .queue_offset
                .as_deref()
                .or(file_queue.offset.as_deref())
                .map(OffsetReset::parse_lenient)
                .unwrap_or(queue_defaults.offset),
        };

        let store_defaults = StoreConfig::default();
        let store = StoreConfig {
            backend: cli
                .store_backend
                .or(file_store.backend)
                .unwrap_or(store_defaults.backend),
            url: cli
                .store_url
                .clone()
                .or(file_store.url)
                .unwrap_or(store_defaults.url),
            username: cli.store_username.clone().or(file_store.username),
            password: cli.store_password.clone().or(file_store.password),
            timeout_secs: file_store
                .timeout_secs
                .unwrap_or(store_defaults.timeout_secs),
            index_prefix: cli
                .index_prefix
                .clone()
                .or(file_store.index_prefix)
                .unwrap_or(store_defaults.index_prefix),
            type_name: file_store.type_name.unwrap_or(store_defaults.type_name),
            legacy_types: file_store
                .legacy_types
                .unwrap_or(store_defaults.legacy_types),
            mappings_dir: file_store.mappings_dir.map(|d| expand_path(&d)),
        };

        Self {
            server,
            pipeline,
            queue,
            store,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if is_all_interfaces(&self.server.host) {
            tracing::warn!(
                host = %self.server.host,
                "Server binds to all interfaces; ingestion endpoints are unauthenticated"
            );
        }

        if self.pipeline.bulk_size == 0 {
            anyhow::bail!("Configuration error: pipeline.bulk_size must be greater than 0");
        }
        if self.pipeline.span_channel_capacity == 0 {
            anyhow::bail!(
                "Configuration error: pipeline.span_channel_capacity must be greater than 0"
            );
        }
        if self.pipeline.batch_channel_capacity == 0 {
            anyhow::bail!(
                "Configuration error: pipeline.batch_channel_capacity must be greater than 0"
            );
        }
        if self.pipeline.cache_ttl_secs == 0 {
            anyhow::bail!("Configuration error: pipeline.cache_ttl_secs must be greater than 0");
        }

        if self.queue.enabled {
            if self.queue.topic.is_empty() {
                anyhow::bail!("Configuration error: queue.topic must not be empty");
            }
            if self.queue.group.is_empty() {
                anyhow::bail!("Configuration error: queue.group must not be empty");
            }
            if self.queue.backend == QueueBackendType::Redis && self.queue.redis_url.is_none() {
                anyhow::bail!(
                    "Configuration error: queue.redis_url is required when queue.backend is 'redis'"
                );
            }
        }

        if self.store.index_prefix.is_empty() {
            anyhow::bail!("Configuration error: store.index_prefix must not be empty");
        }
        if self.store.type_name.is_empty() {
            anyhow::bail!("Configuration error: store.type_name must not be empty");
        }
        if self.store.backend == StoreBackendType::Elasticsearch
            && !self.store.url.starts_with("http://")
            && !self.store.url.starts_with("https://")
        {
            anyhow::bail!(
                "Configuration error: store.url must start with http:// or https://. Got: {}",
                self.store.url
            );
        }
        if self.store.username.is_some() != self.store.password.is_some() {
            anyhow::bail!(
                "Configuration error: store.username and store.password must be set together"
            );
        }

        Ok(())
    }

    /// Copy of the config with credentials masked, for logging and display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.store.password.is_some() {
            copy.store.password = Some("***".to_string());
        }
        copy
    }
}

/// Get the profile config path (~/.tracedock/tracedock.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Check if host binds to all network interfaces
fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_backend_serde() {
        let backend: QueueBackendType = serde_json::from_str(r#""redis""#).unwrap();
        assert_eq!(backend, QueueBackendType::Redis);

        let backend: StoreBackendType = serde_json::from_str(r#""memory""#).unwrap();
        assert_eq!(backend, StoreBackendType::Memory);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(QueueBackendType::Memory.to_string(), "memory");
        assert_eq!(StoreBackendType::Elasticsearch.to_string(), "elasticsearch");
        assert_eq!(OffsetReset::Oldest.to_string(), "oldest");
    }

    #[test]
    fn test_offset_reset_parse() {
        assert_eq!(OffsetReset::parse_lenient("oldest"), OffsetReset::Oldest);
        assert_eq!(OffsetReset::parse_lenient(" NEWEST "), OffsetReset::Newest);
        assert_eq!(OffsetReset::parse_lenient("earliest"), OffsetReset::Newest);
        assert_eq!(OffsetReset::parse_lenient(""), OffsetReset::Newest);
    }

    #[test]
    fn test_resolve_queue_buffer() {
        assert_eq!(resolve_queue_buffer(256), 256);
        assert_eq!(resolve_queue_buffer(1024), 1024);
        assert_eq!(resolve_queue_buffer(1025), 10);
        assert_eq!(resolve_queue_buffer(-1), 10);
        assert_eq!(resolve_queue_buffer(0), 0);
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "server": { "host": "0.0.0.0", "port": 8080 },
            "pipeline": { "bulk_size": 100, "cache_ttl_secs": 30 },
            "queue": { "backend": "redis", "redis_url": "redis://localhost", "buffer": -3 },
            "store": { "backend": "memory", "index_prefix": "traces" }
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(server.port, Some(8080));
        let pipeline = config.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.bulk_size, Some(100));
        assert_eq!(pipeline.cache_ttl_secs, Some(30));
        let queue = config.queue.as_ref().unwrap();
        assert_eq!(queue.backend, Some(QueueBackendType::Redis));
        assert_eq!(queue.buffer, Some(-3));
        let store = config.store.as_ref().unwrap();
        assert_eq!(store.backend, Some(StoreBackendType::Memory));
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "server": { "port": 9000 }, "bulk": 10 }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let extra = config.extra.as_object().unwrap();
        assert!(extra.contains_key("bulk"));
    }

    #[test]
    fn test_file_config_merge() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{ "server": { "host": "base", "port": 1000 }, "pipeline": { "bulk_size": 5 } }"#,
        )
        .unwrap();
        let overlay: FileConfig = serde_json::from_str(
            r#"{ "server": { "port": 2000 }, "store": { "type_name": "doc" } }"#,
        )
        .unwrap();
        base.merge(overlay);

        let server = base.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("base"));
        assert_eq!(server.port, Some(2000));
        assert_eq!(base.pipeline.unwrap().bulk_size, Some(5));
        assert_eq!(base.store.unwrap().type_name.as_deref(), Some("doc"));
    }

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve(FileConfig::default(), &CliConfig::default());

        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.pipeline.bulk_size, DEFAULT_BULK_SIZE);
        assert_eq!(config.pipeline.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
        assert!(config.pipeline.flush_on_shutdown);
        assert!(config.queue.enabled);
        assert_eq!(config.queue.offset, OffsetReset::Newest);
        assert_eq!(config.queue.buffer, 10);
        assert_eq!(config.store.backend, StoreBackendType::Elasticsearch);
        assert_eq!(config.store.index_prefix, DEFAULT_INDEX_PREFIX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(
            r#"{ "server": { "port": 9000 }, "pipeline": { "bulk_size": 50 }, "queue": { "offset": "oldest" } }"#,
        );
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            bulk_size: Some(7),
            store_backend: Some(StoreBackendType::Memory),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.pipeline.bulk_size, 7);
        assert_eq!(config.queue.offset, OffsetReset::Oldest);
        assert_eq!(config.store.backend, StoreBackendType::Memory);
    }

    #[test]
    fn test_config_file_not_found() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/tracedock.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let file = write_config("{ not json");
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_validation_bulk_size_zero() {
        let cli = CliConfig {
            bulk_size: Some(0),
            ..Default::default()
        };
        let config = AppConfig::resolve(FileConfig::default(), &cli);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pipeline.bulk_size"));
    }

    #[test]
    fn test_validation_port_zero() {
        let cli = CliConfig {
            port: Some(0),
            ..Default::default()
        };
        let config = AppConfig::resolve(FileConfig::default(), &cli);
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("server.port must be greater than 0")
        );
    }

    #[test]
    fn test_validation_redis_requires_url() {
        let cli = CliConfig {
            queue_backend: Some(QueueBackendType::Redis),
            ..Default::default()
        };
        let config = AppConfig::resolve(FileConfig::default(), &cli);
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("queue.redis_url")
        );
    }

    #[test]
    fn test_validation_redis_ignored_when_queue_disabled() {
        let cli = CliConfig {
            queue_enabled: Some(false),
            queue_backend: Some(QueueBackendType::Redis),
            ..Default::default()
        };
        let config = AppConfig::resolve(FileConfig::default(), &cli);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_index_prefix() {
        let cli = CliConfig {
            index_prefix: Some(String::new()),
            ..Default::default()
        };
        let config = AppConfig::resolve(FileConfig::default(), &cli);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_credentials_together() {
        let cli = CliConfig {
            store_username: Some("elastic".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(FileConfig::default(), &cli);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_masks_password() {
        let cli = CliConfig {
            store_username: Some("elastic".to_string()),
            store_password: Some("secret".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(FileConfig::default(), &cli);
        assert_eq!(config.redacted().store.password.as_deref(), Some("***"));
        assert_eq!(config.store.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_is_all_interfaces() {
        assert!(is_all_interfaces("0.0.0.0"));
        assert!(is_all_interfaces("::"));
        assert!(!is_all_interfaces("127.0.0.1"));
    }
}
