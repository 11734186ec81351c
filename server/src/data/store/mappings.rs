//! Index mapping registry
//!
//! Maps an index base name (the schema family of a document) to the body
//! sent when creating an index of that family. Ships a built-in mapping for
//! span documents; `<base>.json` files in the configured mappings directory
//! override or extend it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Value as JsonValue, json};

use crate::core::constants::SPAN_INDEX_BASE_NAME;

/// Registry of index creation bodies keyed by base name
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    mappings: HashMap<String, JsonValue>,
    type_name: String,
    legacy_types: bool,
}

impl MappingRegistry {
    /// Registry with the built-in span mapping
    pub fn new(type_name: &str, legacy_types: bool) -> Self {
        let mut mappings = HashMap::new();
        mappings.insert(SPAN_INDEX_BASE_NAME.to_string(), span_mapping());
        Self {
            mappings,
            type_name: type_name.to_string(),
            legacy_types,
        }
    }

    /// Load `<base>.json` files from a directory
    ///
    /// Each file holds a mapping document (`{"properties": {...}}`).
    /// Returns the number of mappings loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read mappings directory: {}", dir.display()))?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(base_name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read mapping: {}", path.display()))?;
            let mapping: JsonValue = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse mapping: {}", path.display()))?;
            if !mapping.is_object() {
                anyhow::bail!("Mapping must be a JSON object: {}", path.display());
            }

            tracing::debug!(base_name, path = %path.display(), "Loaded index mapping");
            self.mappings.insert(base_name.to_string(), mapping);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Index creation body for a base name, `None` when unknown
    ///
    /// With legacy types the mapping is nested under the type name.
    pub fn create_body(&self, base_name: &str) -> Option<JsonValue> {
        let mapping = self.mappings.get(base_name)?.clone();
        let mappings = if self.legacy_types {
            let mut nested = serde_json::Map::new();
            nested.insert(self.type_name.clone(), mapping);
            JsonValue::Object(nested)
        } else {
            mapping
        };
        Some(json!({ "mappings": mappings }))
    }

    pub fn base_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mappings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Built-in mapping for span documents
fn span_mapping() -> JsonValue {
    json!({
        "dynamic": true,
        "properties": {
            "trace_id": { "type": "keyword" },
            "span_id": { "type": "keyword" },
            "parent_span_id": { "type": "keyword" },
            "trace_state": { "type": "keyword" },
            "name": { "type": "keyword" },
            "kind": { "type": "keyword" },
            "status_code": { "type": "keyword" },
            "status_message": { "type": "text" },
            "service_name": { "type": "keyword" },
            "start_time": { "type": "date" },
            "end_time": { "type": "date" },
            "duration_ms": { "type": "double" },
            "attributes": { "type": "object", "dynamic": true },
            "resource": { "type": "object", "dynamic": true },
            "scope": {
                "properties": {
                    "name": { "type": "keyword" },
                    "version": { "type": "keyword" }
                }
            },
            "events": {
                "type": "nested",
                "properties": {
                    "name": { "type": "keyword" },
                    "timestamp": { "type": "date" },
                    "attributes": { "type": "object", "dynamic": true }
                }
            },
            "links": {
                "type": "nested",
                "properties": {
                    "trace_id": { "type": "keyword" },
                    "span_id": { "type": "keyword" },
                    "attributes": { "type": "object", "dynamic": true }
                }
            }
        }
    })
}
