//! Elasticsearch 6.x repository generation.
//!
//! First generation with the numbered `index-N` root catalog: snapshots
//! carry uuids, indices carry ids, and every metadata blob is wrapped in the
//! checksummed envelope. Index metadata files are still keyed by snapshot
//! uuid; the per-index file-generation indirection arrives in the next
//! generation.

use std::collections::BTreeMap;
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

/// Envelope kinds this generation writes.
const GLOBAL_METADATA_FORMAT: &str = "metadata";
const INDEX_METADATA_FORMAT: &str = "index-metadata";
const SHARD_METADATA_FORMAT: &str = "snapshot";

#[derive(Debug, Deserialize)]
struct CatalogSnapshot {
    name: String,
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct CatalogIndex {
    id: String,
    #[serde(default)]
    snapshots: Vec<String>,
}

/// Root catalog shape of the `index-N` file.
#[derive(Debug, Deserialize)]
struct IndexedCatalog {
    snapshots: Vec<CatalogSnapshot>,
    // BTreeMap keeps listing order deterministic.
    #[serde(default)]
    indices: BTreeMap<String, CatalogIndex>,
}

/// Catalog provider for the `index-N` generation.
pub struct Es68CatalogProvider {
    repo: Arc<dyn SourceRepo>,
    cache: Mutex<Option<Arc<IndexedCatalog>>>,
}

impl Es68CatalogProvider {
    /// Create a provider over one repository location.
    pub fn new(repo: Arc<dyn SourceRepo>) -> Self {
        Es68CatalogProvider {
            repo,
            cache: Mutex::new(None),
        }
    }

    fn catalog(&self) -> Result<Arc<IndexedCatalog>> {
        let mut guard = self.cache.lock();
        if let Some(catalog) = guard.as_ref() {
            return Ok(catalog.clone());
        }
        let path = self.repo.catalog_root_path()?;
        let bytes = std::fs::read(&path)?;
        let catalog: IndexedCatalog = serde_json::from_slice(&bytes)?;
        let catalog = Arc::new(catalog);
        *guard = Some(catalog.clone());
        Ok(catalog)
    }
}

impl std::fmt::Debug for Es68CatalogProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Es68CatalogProvider").finish_non_exhaustive()
    }
}

impl CatalogProvider for Es68CatalogProvider {
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

/// Cluster metadata of this generation. Composable templates exist but sit
/// directly under their top-level keys.
pub struct GlobalMetadataEs68 {
    root: Value,
}

impl GlobalMetadata for GlobalMetadataEs68 {
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

/// Index metadata of this generation: flat dotted settings, a single
/// mapping type.
#[derive(Debug, Clone)]
pub struct IndexMetadataEs68 {
    id: String,
    name: String,
    body: Value,
    number_of_shards: u32,
}

impl IndexMetadataEs68 {
    fn new(body: Value, id: &str, name: &str) -> Result<Self> {
        require_field(&body, "mappings")?;
        let settings = require_field(&body, "settings")?;
        let number_of_shards = shard_count_from_settings(settings)?;
        Ok(IndexMetadataEs68 {
            id: id.to_string(),
            name: name.to_string(),
            body,
            number_of_shards,
        })
    }
}

impl IndexMetadata for IndexMetadataEs68 {
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
pub struct Es68GlobalMetadataFactory {
    provider: Arc<Es68CatalogProvider>,
}

impl Es68GlobalMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es68CatalogProvider>) -> Self {
        Es68GlobalMetadataFactory { provider }
    }
}

impl GlobalMetadataFactory for Es68GlobalMetadataFactory {
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
        Ok(Box::new(GlobalMetadataEs68 { root }))
    }
}

/// Index metadata factory for this generation.
pub struct Es68IndexMetadataFactory {
    provider: Arc<Es68CatalogProvider>,
}

impl Es68IndexMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es68CatalogProvider>) -> Self {
        Es68IndexMetadataFactory { provider }
    }
}

impl IndexMetadataFactory for Es68IndexMetadataFactory {
    fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    fn index_file_id(&self, snapshot_name: &str, _index_name: &str) -> Result<String> {
        // Keyed by snapshot uuid in this generation.
        self.provider
            .snapshot_id(snapshot_name)?
            .ok_or_else(|| ReliquaryError::name_not_found(format!("snapshot {snapshot_name}")))
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
        Ok(Box::new(IndexMetadataEs68::new(body, index_id, index_name)?))
    }
}

/// Shard metadata factory for this generation.
pub struct Es68ShardMetadataFactory {
    provider: Arc<Es68CatalogProvider>,
}

impl Es68ShardMetadataFactory {
    /// Create a factory bound to a catalog provider.
    pub fn new(provider: Arc<Es68CatalogProvider>) -> Self {
        Es68ShardMetadataFactory { provider }
    }
}

impl ShardMetadataFactory for Es68ShardMetadataFactory {
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
