use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::{QueueBackendType, StoreBackendType};
use super::constants::{
    ENV_BULK_SIZE, ENV_CACHE_TTL_SECS, ENV_CONFIG, ENV_FLUSH_ON_SHUTDOWN, ENV_HOST,
    ENV_PORT, ENV_QUEUE_BACKEND, ENV_QUEUE_BUFFER, ENV_QUEUE_ENABLED, ENV_QUEUE_GROUP,
    ENV_QUEUE_OFFSET, ENV_QUEUE_REDIS_URL, ENV_QUEUE_TOPIC, ENV_SPAN_CHANNEL_CAPACITY,
    ENV_STORE_BACKEND, ENV_STORE_INDEX_PREFIX, ENV_STORE_PASSWORD, ENV_STORE_URL,
    ENV_STORE_USERNAME,
};

#[derive(Parser)]
#[command(name = "tracedock")]
#[command(version, about = "Trace span collector", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    // Pipeline options
    /// Documents per bulk write
    #[arg(long, global = true, env = ENV_BULK_SIZE)]
    pub bulk_size: Option<usize>,

    /// Capacity of the span channel between intake and accumulator
    #[arg(long, global = true, env = ENV_SPAN_CHANNEL_CAPACITY)]
    pub span_channel_capacity: Option<usize>,

    /// Index existence cache TTL in seconds
    #[arg(long, global = true, env = ENV_CACHE_TTL_SECS)]
    pub cache_ttl_secs: Option<u64>,

    /// Flush the partially filled batch on shutdown
    #[arg(long, global = true, env = ENV_FLUSH_ON_SHUTDOWN)]
    pub flush_on_shutdown: Option<bool>,

    // Queue options
    /// Enable or disable the queue consumer
    #[arg(long, global = true, env = ENV_QUEUE_ENABLED)]
    pub queue_enabled: Option<bool>,

    /// Queue backend (memory or redis)
    #[arg(long, global = true, env = ENV_QUEUE_BACKEND, value_parser = parse_queue_backend)]
    pub queue_backend: Option<QueueBackendType>,

    /// Redis URL for the redis queue backend
    #[arg(long, global = true, env = ENV_QUEUE_REDIS_URL)]
    pub queue_redis_url: Option<String>,

    /// Topic carrying raw trace payloads
    #[arg(long, global = true, env = ENV_QUEUE_TOPIC)]
    pub queue_topic: Option<String>,

    /// Consumer group name
    #[arg(long, global = true, env = ENV_QUEUE_GROUP)]
    pub queue_group: Option<String>,

    /// Messages fetched per read (0..=1024, anything else falls back to 10)
    #[arg(long, global = true, env = ENV_QUEUE_BUFFER, allow_negative_numbers = true)]
    pub queue_buffer: Option<i64>,

    /// Where a new consumer group starts reading (newest or oldest)
    #[arg(long, global = true, env = ENV_QUEUE_OFFSET)]
    pub queue_offset: Option<String>,

    // Store options
    /// Document store backend (elasticsearch or memory)
    #[arg(long, global = true, env = ENV_STORE_BACKEND, value_parser = parse_store_backend)]
    pub store_backend: Option<StoreBackendType>,

    /// Document store URL
    #[arg(long, global = true, env = ENV_STORE_URL)]
    pub store_url: Option<String>,

    /// Document store basic auth username
    #[arg(long, global = true, env = ENV_STORE_USERNAME)]
    pub store_username: Option<String>,

    /// Document store basic auth password
    #[arg(long, global = true, env = ENV_STORE_PASSWORD, hide_env_values = true)]
    pub store_password: Option<String>,

    /// Prefix for time-sharded index names
    #[arg(long, global = true, env = ENV_STORE_INDEX_PREFIX)]
    pub index_prefix: Option<String>,
}

/// Parse queue backend from CLI/env string
fn parse_queue_backend(s: &str) -> Result<QueueBackendType, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(QueueBackendType::Memory),
        "redis" => Ok(QueueBackendType::Redis),
        _ => Err(format!(
            "Invalid queue backend '{}'. Valid options: memory, redis",
            s
        )),
    }
}

/// Parse store backend from CLI/env string
fn parse_store_backend(s: &str) -> Result<StoreBackendType, String> {
    match s.to_lowercase().as_str() {
        "elasticsearch" | "es" => Ok(StoreBackendType::Elasticsearch),
        "memory" => Ok(StoreBackendType::Memory),
        _ => Err(format!(
            "Invalid store backend '{}'. Valid options: elasticsearch, memory",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the collector (default command)
    Start,
    /// Load and validate configuration, print the effective settings, then exit
    CheckConfig,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub bulk_size: Option<usize>,
    pub span_channel_capacity: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub flush_on_shutdown: Option<bool>,
    pub queue_enabled: Option<bool>,
    pub queue_backend: Option<QueueBackendType>,
    pub queue_redis_url: Option<String>,
    pub queue_topic: Option<String>,
    pub queue_group: Option<String>,
    pub queue_buffer: Option<i64>,
    pub queue_offset: Option<String>,
    pub store_backend: Option<StoreBackendType>,
    pub store_url: Option<String>,
    pub store_username: Option<String>,
    pub store_password: Option<String>,
    pub index_prefix: Option<String>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        bulk_size: cli.bulk_size,
        span_channel_capacity: cli.span_channel_capacity,
        cache_ttl_secs: cli.cache_ttl_secs,
        flush_on_shutdown: cli.flush_on_shutdown,
        queue_enabled: cli.queue_enabled,
        queue_backend: cli.queue_backend,
        queue_redis_url: cli.queue_redis_url,
        queue_topic: cli.queue_topic,
        queue_group: cli.queue_group,
        queue_buffer: cli.queue_buffer,
        queue_offset: cli.queue_offset,
        store_backend: cli.store_backend,
        store_url: cli.store_url,
        store_username: cli.store_username,
        store_password: cli.store_password,
        index_prefix: cli.index_prefix,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_backend() {
        assert_eq!(parse_queue_backend("Redis"), Ok(QueueBackendType::Redis));
        assert!(parse_queue_backend("kafka").is_err());
    }

    #[test]
    fn test_parse_store_backend() {
        assert_eq!(
            parse_store_backend("es"),
            Ok(StoreBackendType::Elasticsearch)
        );
        assert_eq!(parse_store_backend("memory"), Ok(StoreBackendType::Memory));
    }

    #[test]
    fn test_cli_check_config_subcommand() {
        let cli = Cli::try_parse_from(["tracedock", "check-config", "--bulk-size", "10"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
        assert_eq!(cli.bulk_size, Some(10));
    }

    #[test]
    fn test_cli_negative_queue_buffer() {
        let cli = Cli::try_parse_from(["tracedock", "--queue-buffer", "-5"]).unwrap();
        assert_eq!(cli.queue_buffer, Some(-5));
    }
}
