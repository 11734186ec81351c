// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "TraceDock";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".tracedock";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "tracedock.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "TRACEDOCK_CONFIG";

// =============================================================================
// Environment Variables - Logging
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "TRACEDOCK_LOG";

/// Environment variable for log output format (`compact` or `json`)
pub const ENV_LOG_FORMAT: &str = "TRACEDOCK_LOG_FORMAT";

/// Filter used when neither TRACEDOCK_LOG nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str = "info,tracedock=info,tracedock_server=info";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "TRACEDOCK_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "TRACEDOCK_PORT";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 4780;

/// Body limit for trace ingestion endpoints (16 MB)
pub const INGEST_BODY_LIMIT: usize = 16 * 1024 * 1024;

// =============================================================================
// Environment Variables - Pipeline
// =============================================================================

pub const ENV_BULK_SIZE: &str = "TRACEDOCK_BULK_SIZE";
pub const ENV_SPAN_CHANNEL_CAPACITY: &str = "TRACEDOCK_SPAN_CHANNEL_CAPACITY";
pub const ENV_CACHE_TTL_SECS: &str = "TRACEDOCK_CACHE_TTL_SECS";
pub const ENV_FLUSH_ON_SHUTDOWN: &str = "TRACEDOCK_FLUSH_ON_SHUTDOWN";

// =============================================================================
// Pipeline Defaults
// =============================================================================

/// Default bulk threshold (documents per batch)
pub const DEFAULT_BULK_SIZE: usize = 500;

/// Default span channel capacity (decoded requests/messages in flight)
pub const DEFAULT_SPAN_CHANNEL_CAPACITY: usize = 64;

/// Default batch channel capacity (flushed batches waiting for the persister)
pub const DEFAULT_BATCH_CHANNEL_CAPACITY: usize = 4;

/// Default existence cache TTL in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

/// Default time to drain a channel after cancellation, in milliseconds
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 100;

// =============================================================================
// Environment Variables - Queue
// =============================================================================

pub const ENV_QUEUE_ENABLED: &str = "TRACEDOCK_QUEUE_ENABLED";
pub const ENV_QUEUE_BACKEND: &str = "TRACEDOCK_QUEUE_BACKEND";
pub const ENV_QUEUE_REDIS_URL: &str = "TRACEDOCK_QUEUE_REDIS_URL";
pub const ENV_QUEUE_TOPIC: &str = "TRACEDOCK_QUEUE_TOPIC";
pub const ENV_QUEUE_GROUP: &str = "TRACEDOCK_QUEUE_GROUP";
pub const ENV_QUEUE_BUFFER: &str = "TRACEDOCK_QUEUE_BUFFER";
pub const ENV_QUEUE_OFFSET: &str = "TRACEDOCK_QUEUE_OFFSET";

// =============================================================================
// Queue Defaults
// =============================================================================

/// Default queue topic carrying raw trace payloads
pub const DEFAULT_QUEUE_TOPIC: &str = "traces";

/// Default consumer group name
pub const DEFAULT_QUEUE_GROUP: &str = "tracedock";

/// Consumer read count used when the configured buffer is out of range
pub const DEFAULT_QUEUE_BUFFER: i64 = 10;

/// Largest accepted consumer read count
pub const MAX_QUEUE_BUFFER: i64 = 1024;

/// Max entries kept per stream (approximate trimming)
pub const QUEUE_STREAM_MAX_LEN: u64 = 100_000;

/// Publish retry attempts for the queue publish endpoint
pub const QUEUE_PUBLISH_MAX_ATTEMPTS: u32 = 3;

/// Base delay for publish retry backoff in milliseconds
pub const QUEUE_PUBLISH_BASE_DELAY_MS: u64 = 50;

/// Retry-After seconds returned when publishing to the queue fails
pub const QUEUE_RETRY_AFTER_SECS: u64 = 1;

// =============================================================================
// Redis Queue Backend
// =============================================================================

/// Key prefix for Redis streams
pub const REDIS_STREAM_PREFIX: &str = "{tracedock}:stream:";

/// Block timeout for XREADGROUP in milliseconds
pub const REDIS_READ_BLOCK_MS: u64 = 5000;

/// Redis connection pool size
pub const REDIS_POOL_MAX_SIZE: usize = 32;

/// Redis pool wait/create/recycle timeout in seconds
pub const REDIS_POOL_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Environment Variables - Store
// =============================================================================

pub const ENV_STORE_BACKEND: &str = "TRACEDOCK_STORE_BACKEND";
pub const ENV_STORE_URL: &str = "TRACEDOCK_STORE_URL";
pub const ENV_STORE_USERNAME: &str = "TRACEDOCK_STORE_USERNAME";
pub const ENV_STORE_PASSWORD: &str = "TRACEDOCK_STORE_PASSWORD";
pub const ENV_STORE_INDEX_PREFIX: &str = "TRACEDOCK_STORE_INDEX_PREFIX";

// =============================================================================
// Store Defaults
// =============================================================================

/// Default Elasticsearch URL
pub const DEFAULT_STORE_URL: &str = "http://127.0.0.1:9200";

/// Default store request timeout in seconds
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Default index name prefix
pub const DEFAULT_INDEX_PREFIX: &str = "tracedock";

/// Default document type name
pub const DEFAULT_TYPE_NAME: &str = "span";

/// Index base name (mapping family) for span documents
pub const SPAN_INDEX_BASE_NAME: &str = "span";

// =============================================================================
// Shutdown
// =============================================================================

/// Timeout for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
