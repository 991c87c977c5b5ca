//! Elasticsearch 7.x repository generation (also read for 8.x and
//! OpenSearch 1.x/2.x sources, which kept the layout).
//!
//! Extends the `index-N` catalog with an index-metadata indirection: each
//! snapshot records a lookup from index id to a metadata identifier, and a
//! top-level table maps identifiers to the blob's file-generation id. Index
//! metadata blobs are deduplicated across snapshots this way. Repositories
//! written before the indirection existed fall back to snapshot-uuid-keyed
//! metadata files.

use std::collections::{BTreeMap, HashMap};
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

const GLOBAL_METADATA_FORMAT: &str = "metadata";
const INDEX_METADATA_FORMAT: &str = "index-metadata";
const SHARD_METADATA_FORMAT: &str = "snapshot";

#[derive(Debug, Deserialize)]
struct CatalogSnapshot {
    name: String,
    uuid: String,
    #[serde(default)]
    index_metadata_lookup: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CatalogIndex {
    id: String,
    #[serde(default)]
    snapshots: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationalCatalog {
    snapshots: Vec<CatalogSnapshot>,
    #[serde(default)]
    indices: BTreeMap<String, CatalogIndex>,
    /// Identifier → metadata blob file-generation id.
    #[serde(default)]
    index_metadata_identifiers: HashMap<String, String>,
}

/// Catalog provider for the generational-lookup generation.
pub struct Es710CatalogProvider {
    repo: Arc<dyn SourceRepo>,
    cache: Mutex<Option<Arc<GenerationalCatalog>>>,
}

impl Es710CatalogProvider {
    /// Create a provider over one repository location.
    pub fn new(repo: Arc<dyn SourceRepo>) -> Self {
        Es710CatalogProvider {
            repo,
            cache: Mutex::new(None),
        }
    }

    fn catalog(&self) -> Result<Arc<GenerationalCatalog>> {
        let mut guard = self.cache.lock();
        if let Some(catalog) = guard.as_ref() {
            return Ok(catalog.clone());
        }
        let path = self.repo.catalog_root_path()?;
        let bytes = std::fs::read(&path)?;
        let catalog: GenerationalCatalog = serde_json::from_slice(&bytes)?;
        let catalog = Arc::new(catalog);
        *guard = Some(catalog.clone());
        Ok(catalog)
    }

    /// Resolve the index metadata file-generation id for (snapshot, index).
    pub fn index_metadata_file_id(
        &self,
        snapshot_name: &str,
        index_id: &str,
    ) -> Result<String> {
        let catalog = self.catalog()?;
        let snapshot = catalog
            .snapshots
            .iter()
            .find(|s| s.name == snapshot_name)
            .ok_or_else(|| {
                ReliquaryError::name_not_found(format!("snapshot {snapshot_name}"))
            })?;

        match snapshot.index_metadata_lookup.get(index_id) {
            Some(identifier) => catalog
                .index_metadata_identifiers
                .get(identifier)
                .cloned()
                .ok_or_else(|| {
                    ReliquaryError::malformed(format!(
                        "catalog lookup names identifier \"{identifier}\" but the identifier table lacks it"
                    ))
                }),
            // Pre-indirection repositories key metadata files by snapshot uuid.
            None => Ok(snapshot.uuid.clone()),
        }
    }
}

impl std::fmt::Debug for Es710CatalogProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Es710CatalogProvider").finish_non_exhaustive()
    }
}

impl CatalogProvider for Es710CatalogProvider {
    fn snapshots(&self) -> Result<Vec<SnapshotEntry>> {
        Ok(self
            .catalog()?
            .snapshots
            .iter()
            .map(|s| SnapshotEntry {
                name: s.name.clone(),
                id: s.uuid.clone(),
            })
            .collect())
    }

    fn indices_in(&self, snapshot_name: &str) -> Result<Vec<IndexEntry>> {
        let catalog = self.catalog()?;
        let uuid = catalog
            .snapshots
            .iter()
            .find(|s| s.name == snapshot_name)
            .map(|s| s.uuid.clone())
            .ok_or_else(|| {
                ReliquaryError::name_not_found(format!("snapshot {snapshot_name}"))
            })?;

        Ok(catalog
            .indices
            .iter()
            .filter(|(_, index)| index.snapshots.iter().any(|s| *s == uuid))
            .map(|(name, index)| IndexEntry {
                name: name.clone(),
                id: index.id.clone(),
            })
            .collect())
    }

    fn snapshot_id(&self, snapshot_name: &str) -> Result<Option<String>> {
        Ok(self
            .catalog()?
            .snapshots
            .iter()
            .find(|s| s.name == snapshot_name)
            .map(|s| s.uuid.clone()))
    }

    fn index_id(&self, index_name: &str) -> Result<Option<String>> {
        Ok(self
            .catalog()?
            .indices
            .get(index_name)
            .map(|index| index.id.clone()))
    }

    fn repo(&self) -> &dyn SourceRepo {
        self.repo.as_ref()
    }
}

/// Cluster metadata of this generation. Composable templates gained an
/// extra nesting level under their top-level keys.
pub struct GlobalMetadataEs710 {
    root: Value,
}

impl GlobalMetadata for GlobalMetadataEs710 {
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

/// Index metadata of this generation. Mappings may sit inside a one-element
/// array or under a `_doc` wrapper; settings may be flat dotted keys or
/// nested under `index`. Accessors expose the native shape; normalization
/// is the transformers' concern.
#[derive(Debug, Clone)]
pub struct IndexMetadataEs710 {
    id: String,
    name: String,
    body: Value,
    number_of_shards: u32,
}

impl IndexMetadataEs710 {
    fn new(body: Value, id: &str, name: &str) -> Result<Self> {
        require_field(&body, "mappings")?;
        let settings = require_field(&body, "settings")?;
        let number_of_shards = shard_count_from_settings(settings)?;
        Ok(IndexMetadataEs710 {
            id: id.to_string(),
            name: name.to_string(),
            body,
            number_of_shards,
        })
    }
}

impl IndexMetadata for IndexMetadataEs710 {
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

fn unwrap_index_root(tree: Value, index_name: &str) -> Result<Value> {
    match tree {
        Value::Object(mut map) => {
            if let Some(body) = map.remove(index_name) {
                return Ok(body);
            }
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
pub struct Es710GlobalMetadataFactory {
    provider: Arc<Es710CatalogProvider>,
}

impl Es710GlobalMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es710CatalogProvider>) -> Self {
        Es710GlobalMetadataFactory { provider }
    }
}

impl GlobalMetadataFactory for Es710GlobalMetadataFactory {
    fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        envelope::decode_checksummed(bytes, GLOBAL_METADATA_FORMAT, 1, 1)
    }

    fn from_tree(&self, tree: Value) -> Result<Box<dyn GlobalMetadata>> {
        let root = match tree {
            Value::Object(mut map) => map
                .remove("meta-data")
                .ok_or_else(|| ReliquaryError::malformed("global metadata lacks \"meta-data\""))?,
            _ => return Err(ReliquaryError::malformed("global metadata root is not an object")),
        };
        Ok(Box::new(GlobalMetadataEs710 { root }))
    }
}

/// Index metadata factory for this generation.
pub struct Es710IndexMetadataFactory {
    provider: Arc<Es710CatalogProvider>,
}

impl Es710IndexMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es710CatalogProvider>) -> Self {
        Es710IndexMetadataFactory { provider }
    }
}

impl IndexMetadataFactory for Es710IndexMetadataFactory {
    fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    fn index_file_id(&self, snapshot_name: &str, index_name: &str) -> Result<String> {
        let index_id = self
            .provider
            .index_id(index_name)?
            .ok_or_else(|| ReliquaryError::name_not_found(format!("index {index_name}")))?;
        self.provider.index_metadata_file_id(snapshot_name, &index_id)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        envelope::decode_checksummed(bytes, INDEX_METADATA_FORMAT, 1, 1)
    }

    fn from_tree(
        &self,
        tree: Value,
        index_id: &str,
        index_name: &str,
    ) -> Result<Box<dyn IndexMetadata>> {
        let body = unwrap_index_root(tree, index_name)?;
        Ok(Box::new(IndexMetadataEs710::new(body, index_id, index_name)?))
    }
}

/// Shard metadata factory for this generation.
pub struct Es710ShardMetadataFactory {
    provider: Arc<Es710CatalogProvider>,
}

impl Es710ShardMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es710CatalogProvider>) -> Self {
        Es710ShardMetadataFactory { provider }
    }
}

impl ShardMetadataFactory for Es710ShardMetadataFactory {
    fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        envelope::decode_checksummed(bytes, SHARD_METADATA_FORMAT, 1, 1)
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
    use std::fs;
    use tempfile::tempdir;

    use crate::repo::FileSystemRepo;

    fn write_catalog(dir: &std::path::Path) {
        let catalog = json!({
            "snapshots": [{
                "name": "snap-1",
                "uuid": "uuid-1",
                "state": 1,
                "index_metadata_lookup": {"idx-logs": "ident-A"}
            }],
            "indices": {
                "logs": {"id": "idx-logs", "snapshots": ["uuid-1"]}
            },
            "index_metadata_identifiers": {"ident-A": "gen-7"}
        });
        fs::write(dir.join("index-3"), serde_json::to_vec(&catalog).unwrap()).unwrap();
    }

    #[test]
    fn test_index_metadata_file_id_via_lookup() {
        let dir = tempdir().unwrap();
        write_catalog(dir.path());
        let provider = Es710CatalogProvider::new(Arc::new(FileSystemRepo::new(dir.path())));

        let file_id = provider.index_metadata_file_id("snap-1", "idx-logs").unwrap();
        assert_eq!(file_id, "gen-7");
    }

    #[test]
    fn test_index_metadata_file_id_falls_back_to_uuid() {
        let dir = tempdir().unwrap();
        let catalog = json!({
            "snapshots": [{"name": "snap-1", "uuid": "uuid-1"}],
            "indices": {"logs": {"id": "idx-logs", "snapshots": ["uuid-1"]}}
        });
        fs::write(dir.path().join("index-0"), serde_json::to_vec(&catalog).unwrap()).unwrap();
        let provider = Es710CatalogProvider::new(Arc::new(FileSystemRepo::new(dir.path())));

        let file_id = provider.index_metadata_file_id("snap-1", "idx-logs").unwrap();
        assert_eq!(file_id, "uuid-1");
    }

    #[test]
    fn test_dangling_identifier_is_malformed() {
        let dir = tempdir().unwrap();
        let catalog = json!({
            "snapshots": [{
                "name": "snap-1",
                "uuid": "uuid-1",
                "index_metadata_lookup": {"idx-logs": "ident-missing"}
            }],
            "indices": {"logs": {"id": "idx-logs", "snapshots": ["uuid-1"]}},
            "index_metadata_identifiers": {}
        });
        fs::write(dir.path().join("index-0"), serde_json::to_vec(&catalog).unwrap()).unwrap();
        let provider = Es710CatalogProvider::new(Arc::new(FileSystemRepo::new(dir.path())));

        let err = provider.index_metadata_file_id("snap-1", "idx-logs").unwrap_err();
        assert!(matches!(err, ReliquaryError::MalformedDocument(_)));
    }

    #[test]
    fn test_global_metadata_template_pointers() {
        let meta = GlobalMetadataEs710 {
            root: json!({
                "templates": {"t1": {}},
                "index_template": {"index_template": {"it1": {}}},
                "component_template": {"component_template": {"ct1": {}}}
            }),
        };
        assert!(meta.templates().unwrap().get("t1").is_some());
        assert!(meta.index_templates().unwrap().get("it1").is_some());
        assert!(meta.component_templates().unwrap().get("ct1").is_some());
    }
}
