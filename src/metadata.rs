//! Metadata entities and their decoding factories.
//!
//! Entities are immutable, version-tagged documents produced only by their
//! generation's factory from a decoded document tree; transformations emit
//! new entities instead of mutating. The factory contracts here implement
//! the shared resolve-ids → resolve-path → decode → map sequence once as
//! provided methods; the version-specific pieces (file id resolution, blob
//! decode style, field mapping) are required methods each generation
//! supplies. A field the mapping expects but cannot locate is fatal
//! ([`MalformedDocument`](crate::error::ReliquaryError::MalformedDocument)),
//! never defaulted.

use std::fs;

use serde_json::Value;

use crate::catalog::CatalogProvider;
use crate::error::{ReliquaryError, Result};

/// Cluster-wide metadata of one snapshot: templates plus the raw tree.
pub trait GlobalMetadata: Send + Sync {
    /// The decoded document tree.
    fn document(&self) -> &Value;

    /// JSON pointer to legacy templates within the tree.
    fn templates_path(&self) -> &'static str;

    /// JSON pointer to composable index templates within the tree.
    fn index_templates_path(&self) -> &'static str;

    /// JSON pointer to component templates within the tree.
    fn component_templates_path(&self) -> &'static str;

    /// Resolve the legacy templates node, if present.
    fn templates(&self) -> Option<&Value> {
        self.document().pointer(self.templates_path())
    }

    /// Resolve the composable index templates node, if present.
    fn index_templates(&self) -> Option<&Value> {
        self.document().pointer(self.index_templates_path())
    }

    /// Resolve the component templates node, if present.
    fn component_templates(&self) -> Option<&Value> {
        self.document().pointer(self.component_templates_path())
    }
}

/// Metadata of one index inside one snapshot.
pub trait IndexMetadata: Send + Sync + std::fmt::Debug {
    /// Internal index id.
    fn id(&self) -> &str;

    /// Index name.
    fn name(&self) -> &str;

    /// The decoded document tree for this index.
    fn document(&self) -> &Value;

    /// Alias definitions.
    fn aliases(&self) -> &Value;

    /// Mapping definitions, in the generation's native shape.
    fn mappings(&self) -> &Value;

    /// Settings, in the generation's native shape.
    fn settings(&self) -> &Value;

    /// Number of primary shards.
    fn number_of_shards(&self) -> u32;

    /// An independent clone that never aliases this entity's tree.
    /// Transformers mutate working copies, so aliasing would let a
    /// transformation corrupt its source entity.
    fn deep_copy(&self) -> Box<dyn IndexMetadata>;
}

/// One file in a shard's snapshot manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFileInfo {
    /// Blob name inside the repository (e.g. `__0`).
    pub name: String,
    /// Logical segment file name (e.g. `_0.cfs`).
    pub physical_name: String,
    /// File length in bytes.
    pub length: u64,
    /// Number of repository blobs the file is split into.
    pub part_count: u32,
    /// Source-engine checksum string for the file.
    pub checksum: String,
}

/// Manifest of one shard in one snapshot.
#[derive(Debug, Clone)]
pub struct ShardMetadata {
    /// Snapshot name.
    pub snapshot_name: String,
    /// Index name.
    pub index_name: String,
    /// Internal index id.
    pub index_id: String,
    /// Shard number.
    pub shard_id: u32,
    /// On-disk index format number of the source engine.
    pub index_version: i64,
    /// Snapshot start time, epoch milliseconds.
    pub start_time: i64,
    /// Elapsed snapshot time, milliseconds.
    pub time: i64,
    /// Number of files in the manifest.
    pub number_of_files: u32,
    /// Total size of all files, bytes.
    pub total_size_bytes: u64,
    /// The files, in manifest order.
    pub files: Vec<ShardFileInfo>,
}

/// Decodes one snapshot's global metadata blob.
pub trait GlobalMetadataFactory: Send + Sync {
    /// The catalog used to resolve names.
    fn provider(&self) -> &dyn CatalogProvider;

    /// Version-specific blob decode (enveloped or legacy embedded).
    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Version-specific mapping from decoded tree to entity.
    fn from_tree(&self, tree: Value) -> Result<Box<dyn GlobalMetadata>>;

    /// Shared orchestration: resolve the snapshot id, read the blob at its
    /// resolved path, decode, and map.
    fn from_repo(&self, snapshot_name: &str) -> Result<Box<dyn GlobalMetadata>> {
        let provider = self.provider();
        let snapshot_id = provider
            .snapshot_id(snapshot_name)?
            .ok_or_else(|| ReliquaryError::name_not_found(format!("snapshot {snapshot_name}")))?;
        let path = provider.repo().global_metadata_path(&snapshot_id);
        tracing::debug!(snapshot = snapshot_name, path = %path.display(), "reading global metadata");
        let bytes = fs::read(&path)?;
        let tree = self
            .decode(&bytes)
            .map_err(|e| e.with_context(format!("global metadata for snapshot {snapshot_name}")))?;
        self.from_tree(tree)
    }
}

/// Decodes one index's metadata blob.
pub trait IndexMetadataFactory: Send + Sync {
    /// The catalog used to resolve names.
    fn provider(&self) -> &dyn CatalogProvider;

    /// Version-specific resolution of the metadata file generation id.
    fn index_file_id(&self, snapshot_name: &str, index_name: &str) -> Result<String>;

    /// Version-specific blob decode.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Version-specific mapping from decoded tree to entity.
    fn from_tree(&self, tree: Value, index_id: &str, index_name: &str)
    -> Result<Box<dyn IndexMetadata>>;

    /// Shared orchestration: resolve ids, read the blob, decode, map.
    fn from_repo(&self, snapshot_name: &str, index_name: &str) -> Result<Box<dyn IndexMetadata>> {
        let provider = self.provider();
        let index_id = provider
            .index_id(index_name)?
            .ok_or_else(|| ReliquaryError::name_not_found(format!("index {index_name}")))?;
        let file_id = self.index_file_id(snapshot_name, index_name)?;
        let path = provider.repo().index_metadata_path(&index_id, &file_id);
        tracing::debug!(index = index_name, path = %path.display(), "reading index metadata");
        let bytes = fs::read(&path)?;
        let tree = self.decode(&bytes).map_err(|e| {
            e.with_context(format!("index metadata for {index_name} (id {index_id})"))
        })?;
        self.from_tree(tree, &index_id, index_name)
    }
}

/// Decodes one shard's metadata blob.
pub trait ShardMetadataFactory: Send + Sync {
    /// The catalog used to resolve names.
    fn provider(&self) -> &dyn CatalogProvider;

    /// Version-specific blob decode.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Version-specific mapping from decoded tree to entity.
    fn from_tree(
        &self,
        tree: &Value,
        snapshot_name: &str,
        index_id: &str,
        index_name: &str,
        shard_id: u32,
    ) -> Result<ShardMetadata>;

    /// Shared orchestration: resolve ids, read the blob, decode, map.
    fn from_repo(
        &self,
        snapshot_name: &str,
        index_name: &str,
        shard_id: u32,
    ) -> Result<ShardMetadata> {
        let provider = self.provider();
        let snapshot_id = provider
            .snapshot_id(snapshot_name)?
            .ok_or_else(|| ReliquaryError::name_not_found(format!("snapshot {snapshot_name}")))?;
        let index_id = provider
            .index_id(index_name)?
            .ok_or_else(|| ReliquaryError::name_not_found(format!("index {index_name}")))?;
        let path = provider
            .repo()
            .shard_metadata_path(&snapshot_id, &index_id, shard_id);
        tracing::debug!(
            index = index_name,
            shard = shard_id,
            path = %path.display(),
            "reading shard metadata"
        );
        let bytes = fs::read(&path)?;
        let tree = self.decode(&bytes).map_err(|e| {
            e.with_context(format!(
                "shard metadata for snapshot {snapshot_name}, index {index_id}, shard {shard_id}"
            ))
        })?;
        self.from_tree(&tree, snapshot_name, &index_id, index_name, shard_id)
    }
}

/// Look up a required object field, failing with the field's path context.
pub(crate) fn require_field<'a>(tree: &'a Value, field: &str) -> Result<&'a Value> {
    tree.get(field)
        .ok_or_else(|| ReliquaryError::malformed(format!("expected field \"{field}\" is absent")))
}

/// Look up a required string field.
pub(crate) fn require_str<'a>(tree: &'a Value, field: &str) -> Result<&'a str> {
    require_field(tree, field)?
        .as_str()
        .ok_or_else(|| ReliquaryError::malformed(format!("field \"{field}\" is not a string")))
}

/// Look up a required integer field.
pub(crate) fn require_i64(tree: &Value, field: &str) -> Result<i64> {
    require_field(tree, field)?
        .as_i64()
        .ok_or_else(|| ReliquaryError::malformed(format!("field \"{field}\" is not an integer")))
}

/// Read a shard-count-like value that generations store either as a number
/// or as a decimal string.
pub(crate) fn count_from(value: &Value, field: &str) -> Result<u32> {
    let node = require_field(value, field)?;
    match node {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v as u32)
            .ok_or_else(|| ReliquaryError::malformed(format!("field \"{field}\" is negative"))),
        Value::String(s) => s
            .parse::<u32>()
            .map_err(|_| ReliquaryError::malformed(format!("field \"{field}\" is not a count"))),
        _ => Err(ReliquaryError::malformed(format!(
            "field \"{field}\" is neither number nor string"
        ))),
    }
}
