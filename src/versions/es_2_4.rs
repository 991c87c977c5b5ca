//! Elasticsearch 2.x repository generation (also read for 5.x sources).
//!
//! The oldest supported generation: the root catalog is a flat `index` file
//! listing snapshot names, internal ids are the names themselves, and
//! metadata blobs carry no envelope at all; the binary-JSON payload is
//! embedded in a larger blob and located by its start marker.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::{CatalogProvider, IndexEntry, SnapshotEntry};
use crate::envelope;
use crate::error::{ReliquaryError, Result};
use crate::metadata::{
    GlobalMetadata, GlobalMetadataFactory, IndexMetadata, IndexMetadataFactory, ShardMetadata,
    ShardMetadataFactory, require_field,
};
use crate::repo::SourceRepo;
use crate::versions::{parse_shard_manifest, shard_count_from_settings};

/// Root catalog shape of the flat `index` file.
#[derive(Debug, Deserialize)]
struct LegacyCatalog {
    snapshots: Vec<String>,
}

/// Catalog provider for the flat-catalog generation.
pub struct Es24CatalogProvider {
    repo: Arc<dyn SourceRepo>,
    cache: Mutex<Option<Arc<LegacyCatalog>>>,
}

impl Es24CatalogProvider {
    /// Create a provider over one repository location.
    pub fn new(repo: Arc<dyn SourceRepo>) -> Self {
        Es24CatalogProvider {
            repo,
            cache: Mutex::new(None),
        }
    }

    /// Load and memoize the root catalog. The lock makes concurrent first
    /// access load at most once; later calls clone the Arc and drop the
    /// lock immediately.
    fn catalog(&self) -> Result<Arc<LegacyCatalog>> {
        let mut guard = self.cache.lock();
        if let Some(catalog) = guard.as_ref() {
            return Ok(catalog.clone());
        }
        let path = self.repo.catalog_root_path()?;
        let bytes = std::fs::read(&path)?;
        let catalog: LegacyCatalog = serde_json::from_slice(&bytes)?;
        let catalog = Arc::new(catalog);
        *guard = Some(catalog.clone());
        Ok(catalog)
    }
}

impl std::fmt::Debug for Es24CatalogProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Es24CatalogProvider").finish_non_exhaustive()
    }
}

impl CatalogProvider for Es24CatalogProvider {
    fn snapshots(&self) -> Result<Vec<SnapshotEntry>> {
        Ok(self
            .catalog()?
            .snapshots
            .iter()
            .map(|name| SnapshotEntry {
                name: name.clone(),
                id: name.clone(),
            })
            .collect())
    }

    fn indices_in(&self, snapshot_name: &str) -> Result<Vec<IndexEntry>> {
        let snapshot_id = self.snapshot_id(snapshot_name)?.ok_or_else(|| {
            ReliquaryError::name_not_found(format!("snapshot {snapshot_name}"))
        })?;
        let path = self.repo.snapshot_metadata_path(&snapshot_id);
        let bytes = std::fs::read(&path)?;
        let tree = envelope::decode_embedded(&bytes)
            .map_err(|e| e.with_context(format!("snapshot metadata for {snapshot_name}")))?;

        let Some(snapshot) = tree.get("snapshot").filter(|n| n.is_object()) else {
            tracing::warn!(snapshot = snapshot_name, "no snapshot object in metadata");
            return Ok(Vec::new());
        };
        let Some(indices) = snapshot.get("indices").and_then(Value::as_array) else {
            tracing::warn!(snapshot = snapshot_name, "no indices array in metadata");
            return Ok(Vec::new());
        };

        Ok(indices
            .iter()
            .filter_map(Value::as_str)
            .map(|name| IndexEntry {
                name: name.to_string(),
                id: name.to_string(),
            })
            .collect())
    }

    fn snapshot_id(&self, snapshot_name: &str) -> Result<Option<String>> {
        Ok(self
            .catalog()?
            .snapshots
            .iter()
            .find(|name| name.as_str() == snapshot_name)
            .cloned())
    }

    fn index_id(&self, index_name: &str) -> Result<Option<String>> {
        // This generation has no index id indirection.
        Ok(Some(index_name.to_string()))
    }

    fn repo(&self) -> &dyn SourceRepo {
        self.repo.as_ref()
    }
}

/// Cluster metadata of the flat-catalog generation.
pub struct GlobalMetadataEs24 {
    root: Value,
}

impl GlobalMetadata for GlobalMetadataEs24 {
    fn document(&self) -> &Value {
        &self.root
    }

    fn templates_path(&self) -> &'static str {
        "/templates"
    }

    fn index_templates_path(&self) -> &'static str {
        "/index_template"
    }

    fn component_templates_path(&self) -> &'static str {
        "/component_template"
    }
}

/// Index metadata of the flat-catalog generation. Settings are flat dotted
/// keys; mappings are keyed by document type (possibly several).
#[derive(Debug, Clone)]
pub struct IndexMetadataEs24 {
    id: String,
    name: String,
    body: Value,
    number_of_shards: u32,
}

impl IndexMetadataEs24 {
    fn new(body: Value, id: &str, name: &str) -> Result<Self> {
        require_field(&body, "mappings")?;
        let settings = require_field(&body, "settings")?;
        let number_of_shards = shard_count_from_settings(settings)?;
        Ok(IndexMetadataEs24 {
            id: id.to_string(),
            name: name.to_string(),
            body,
            number_of_shards,
        })
    }
}

impl IndexMetadata for IndexMetadataEs24 {
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
        // Presence checked at construction.
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

/// Unwrap the `{ "<index name>": { ... } }` root layer this generation
/// writes around index metadata.
fn unwrap_index_root(tree: Value, index_name: &str) -> Result<Value> {
    match tree {
        Value::Object(mut map) => {
            if let Some(body) = map.remove(index_name) {
                return Ok(body);
            }
            // Renamed indices keep their snapshot-time name in the blob.
            if map.len() == 1 {
                let (_, body) = map.into_iter().next().unwrap_or_default();
                return Ok(body);
            }
            Err(ReliquaryError::malformed(format!(
                "index metadata root does not contain \"{index_name}\""
            )))
        }
        _ => Err(ReliquaryError::malformed("index metadata root is not an object")),
    }
}

/// Global metadata factory for this generation.
pub struct Es24GlobalMetadataFactory {
    provider: Arc<Es24CatalogProvider>,
}

impl Es24GlobalMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es24CatalogProvider>) -> Self {
        Es24GlobalMetadataFactory { provider }
    }
}

impl GlobalMetadataFactory for Es24GlobalMetadataFactory {
    fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        envelope::decode_embedded(bytes)
    }

    fn from_tree(&self, tree: Value) -> Result<Box<dyn GlobalMetadata>> {
        // The blob nests the cluster state under a "meta-data" key.
        let root = match tree {
            Value::Object(mut map) => map
                .remove("meta-data")
                .ok_or_else(|| ReliquaryError::malformed("global metadata lacks \"meta-data\""))?,
            _ => return Err(ReliquaryError::malformed("global metadata root is not an object")),
        };
        Ok(Box::new(GlobalMetadataEs24 { root }))
    }
}

/// Index metadata factory for this generation.
pub struct Es24IndexMetadataFactory {
    provider: Arc<Es24CatalogProvider>,
}

impl Es24IndexMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es24CatalogProvider>) -> Self {
        Es24IndexMetadataFactory { provider }
    }
}

impl IndexMetadataFactory for Es24IndexMetadataFactory {
    fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    fn index_file_id(&self, snapshot_name: &str, _index_name: &str) -> Result<String> {
        // Index metadata files are keyed by snapshot name here.
        Ok(snapshot_name.to_string())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        envelope::decode_embedded(bytes)
    }

    fn from_tree(
        &self,
        tree: Value,
        index_id: &str,
        index_name: &str,
    ) -> Result<Box<dyn IndexMetadata>> {
        let body = unwrap_index_root(tree, index_name)?;
        Ok(Box::new(IndexMetadataEs24::new(body, index_id, index_name)?))
    }
}

/// Shard metadata factory for this generation.
pub struct Es24ShardMetadataFactory {
    provider: Arc<Es24CatalogProvider>,
}

impl Es24ShardMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es24CatalogProvider>) -> Self {
        Es24ShardMetadataFactory { provider }
    }
}

impl ShardMetadataFactory for Es24ShardMetadataFactory {
    fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        envelope::decode_embedded(bytes)
    }

    fn from_tree(
        &self,
        tree: &Value,
        snapshot_name: &str,
        index_id: &str,
        index_name: &str,
        shard_id: u32,
    ) -> Result<ShardMetadata> {
        parse_shard_manifest(tree, snapshot_name, index_id, index_name, shard_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_index_root_by_name() {
        let tree = json!({"logs": {"settings": {"index.number_of_shards": "1"}, "mappings": {}}});
        let body = unwrap_index_root(tree, "logs").unwrap();
        assert!(body.get("settings").is_some());
    }

    #[test]
    fn test_unwrap_index_root_single_key_fallback() {
        let tree = json!({"old-name": {"settings": {}}});
        let body = unwrap_index_root(tree, "new-name").unwrap();
        assert!(body.get("settings").is_some());
    }

    #[test]
    fn test_unwrap_index_root_rejects_ambiguity() {
        let tree = json!({"a": {}, "b": {}});
        assert!(unwrap_index_root(tree, "c").is_err());
    }

    #[test]
    fn test_index_metadata_requires_settings() {
        let body = json!({"mappings": {"doc": {}}});
        let err = IndexMetadataEs24::new(body, "logs", "logs").unwrap_err();
        assert!(matches!(err, ReliquaryError::MalformedDocument(_)));
    }

    #[test]
    fn test_index_metadata_accessors() {
        let body = json!({
            "aliases": {"logs-read": {}},
            "mappings": {"event": {"properties": {"msg": {"type": "string"}}}},
            "settings": {"index.number_of_shards": "3", "index.number_of_replicas": "1"}
        });
        let meta = IndexMetadataEs24::new(body, "logs", "logs").unwrap();
        assert_eq!(meta.number_of_shards(), 3);
        assert!(meta.aliases().get("logs-read").is_some());
        assert!(meta.mappings().get("event").is_some());
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let body = json!({
            "aliases": {},
            "mappings": {"event": {}},
            "settings": {"index.number_of_shards": "1"}
        });
        let original = IndexMetadataEs24::new(body, "logs", "logs").unwrap();
        let copied = original.deep_copy();
        // The copy owns its tree; both expose equal but distinct documents.
        assert_eq!(original.document(), copied.document());
        assert!(!std::ptr::eq(original.document(), copied.document()));
    }
}
