//! Target-shape entities for OpenSearch 2.x.
//!
//! Transformers emit these. The canonical index body is
//! `{aliases, mappings, settings}` with mappings as a plain properties
//! object (no type wrapper) and settings nested under `index`.

use serde_json::Value;

use crate::error::Result;
use crate::metadata::{GlobalMetadata, IndexMetadata, require_field};
use crate::versions::shard_count_from_settings;

/// Cluster metadata in the target shape.
pub struct GlobalMetadataOs211 {
    root: Value,
}

impl GlobalMetadataOs211 {
    /// Wrap a transformed document tree.
    pub fn new(root: Value) -> Self {
        GlobalMetadataOs211 { root }
    }
}

impl GlobalMetadata for GlobalMetadataOs211 {
    fn document(&self) -> &Value {
        &self.root
    }

    fn templates_path(&self) -> &'static str {
        "/templates"
    }

    fn index_templates_path(&self) -> &'static str {
        "/index_template/index_template"
    }

    fn component_templates_path(&self) -> &'static str {
        "/component_template/component_template"
    }
}

/// Index metadata in the target shape.
#[derive(Debug, Clone)]
pub struct IndexMetadataOs211 {
    id: String,
    name: String,
    body: Value,
    number_of_shards: u32,
}

impl IndexMetadataOs211 {
    /// Wrap a transformed index body. The body must already be in the
    /// canonical shape; construction re-validates the invariants the
    /// writer relies on.
    pub fn new(body: Value, id: &str, name: &str) -> Result<Self> {
        require_field(&body, "mappings")?;
        let settings = require_field(&body, "settings")?;
        let number_of_shards = shard_count_from_settings(settings)?;
        Ok(IndexMetadataOs211 {
            id: id.to_string(),
            name: name.to_string(),
            body,
            number_of_shards,
        })
    }
}

impl IndexMetadata for IndexMetadataOs211 {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn document(&self) -> &Value {
        &self.body
    }

    fn aliases(&self) -> &Value {
        self.body.get("aliases").unwrap_or(&Value::Null)
    }

    fn mappings(&self) -> &Value {
        &self.body["mappings"]
    }

    fn settings(&self) -> &Value {
        &self.body["settings"]
    }

    fn number_of_shards(&self) -> u32 {
        self.number_of_shards
    }

    fn deep_copy(&self) -> Box<dyn IndexMetadata> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_entity_reads_nested_settings() {
        let body = json!({
            "aliases": {},
            "mappings": {"properties": {"field": {"type": "keyword"}}},
            "settings": {"index": {"number_of_shards": "2", "number_of_replicas": "1"}}
        });
        let meta = IndexMetadataOs211::new(body, "idx-1", "logs").unwrap();
        assert_eq!(meta.number_of_shards(), 2);
        assert_eq!(meta.name(), "logs");
    }

    #[test]
    fn test_target_entity_requires_canonical_fields() {
        let body = json!({"settings": {"index": {"number_of_shards": 1}}});
        assert!(IndexMetadataOs211::new(body, "idx-1", "logs").is_err());
    }
}
