//! Document store layer
//!
//! Pluggable backends behind [`DocumentStore`]:
//! - `elasticsearch` - REST client (existence checks, index creation, bulk)
//! - `memory` - in-process store for development and tests
//!
//! The [`MappingRegistry`] supplies the body used to provision each index
//! family.

mod backend;
mod elasticsearch;
mod error;
mod mappings;
mod memory;
mod types;

use std::sync::Arc;

use anyhow::Result;

pub use backend::DocumentStore;
pub use elasticsearch::ElasticsearchStore;
pub use error::StoreError;
pub use mappings::MappingRegistry;
pub use memory::MemoryStore;
pub use types::{BulkIndexOp, BulkItemResult, BulkResponse};

use crate::core::config::{StoreBackendType, StoreConfig};

/// Build the configured store backend
pub fn from_config(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackendType::Elasticsearch => Arc::new(ElasticsearchStore::new(config)?),
        StoreBackendType::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

/// Build the mapping registry, applying directory overrides when configured
pub fn mapping_registry(config: &StoreConfig) -> Result<MappingRegistry> {
    let mut registry = MappingRegistry::new(&config.type_name, config.legacy_types);
    if let Some(dir) = &config.mappings_dir {
        let loaded = registry.load_dir(dir)?;
        tracing::debug!(dir = %dir.display(), loaded, "Index mappings loaded");
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_memory() {
        let config = StoreConfig {
            backend: StoreBackendType::Memory,
            ..Default::default()
        };
        assert_eq!(from_config(&config).unwrap().backend_name(), "memory");
    }

    #[test]
    fn test_mapping_registry_missing_dir_fails() {
        let config = StoreConfig {
            mappings_dir: Some("/nonexistent/mappings".into()),
            ..Default::default()
        };
        assert!(mapping_registry(&config).is_err());
    }
}
