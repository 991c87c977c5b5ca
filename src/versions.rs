//! Per-generation catalog providers, entities, and factories.
//!
//! Each module pins one repository generation's document shapes: how the
//! root catalog is laid out, where index/shard metadata fields live, and
//! which envelope kind wraps each blob. Elasticsearch 5.x sources ride the
//! [`es_2_4`] generation end to end; 8.x and OpenSearch sources ride
//! [`es_7_10`]. [`os_2_11`] holds the target-shape entities transformers
//! emit.

pub mod es_2_4;
pub mod es_6_8;
pub mod es_7_10;
pub mod os_2_11;

use std::sync::Arc;

use serde_json::Value;

use crate::catalog::CatalogProvider;
use crate::error::{ReliquaryError, Result};
use crate::metadata::count_from;
use crate::repo::SourceRepo;
use crate::version::{Version, matchers};

/// Pick the catalog provider matching a detected source version.
pub fn catalog_provider_for(
    version: &Version,
    repo: Arc<dyn SourceRepo>,
) -> Result<Arc<dyn CatalogProvider>> {
    if matchers::IS_ES_2_X.matches(version) || matchers::IS_ES_5_X.matches(version) {
        Ok(Arc::new(es_2_4::Es24CatalogProvider::new(repo)))
    } else if matchers::IS_ES_6_X.matches(version) {
        Ok(Arc::new(es_6_8::Es68CatalogProvider::new(repo)))
    } else if matchers::IS_ES_7_X.matches(version)
        || matchers::IS_ES_8_X.matches(version)
        || matchers::ANY_OS.matches(version)
    {
        Ok(Arc::new(es_7_10::Es710CatalogProvider::new(repo)))
    } else {
        Err(ReliquaryError::unsupported_format(format!(
            "no repository catalog decoder for source version {version}"
        )))
    }
}

/// Shard counts live in different places across generations: flat dotted
/// keys, a nested `index` object, or bare top-level keys in the oldest
/// repositories. The mapping is still injective per generation; this helper
/// just centralizes the probe order.
pub(crate) fn shard_count_from_settings(settings: &Value) -> Result<u32> {
    if settings.get("index.number_of_shards").is_some() {
        return count_from(settings, "index.number_of_shards");
    }
    if let Some(index) = settings.get("index")
        && index.get("number_of_shards").is_some()
    {
        return count_from(index, "number_of_shards");
    }
    if settings.get("number_of_shards").is_some() {
        return count_from(settings, "number_of_shards");
    }
    Err(ReliquaryError::malformed(
        "settings carry no number_of_shards in any known location",
    ))
}

/// Map a decoded shard manifest tree onto [`ShardMetadata`].
///
/// The manifest spellings (`name`, `index_version`, `start_time`, `time`,
/// `number_of_files`, `total_size`, `files[]`) are stable across the
/// generations this crate reads; per-generation factories still own the
/// decode step and any fields that moved.
pub(crate) fn parse_shard_manifest(
    tree: &Value,
    snapshot_name: &str,
    index_id: &str,
    index_name: &str,
    shard_id: u32,
) -> Result<crate::metadata::ShardMetadata> {
    use crate::metadata::{ShardFileInfo, ShardMetadata, require_field, require_i64, require_str};

    let files_node = require_field(tree, "files")?
        .as_array()
        .ok_or_else(|| ReliquaryError::malformed("field \"files\" is not an array"))?;

    let mut files = Vec::with_capacity(files_node.len());
    for file in files_node {
        let length = require_i64(file, "length")?;
        if length < 0 {
            return Err(ReliquaryError::malformed("file length is negative"));
        }
        let length = length as u64;
        // Large files are split into fixed-size parts; absent part_size
        // means the blob is stored whole.
        let part_count = match file.get("part_size").and_then(Value::as_u64) {
            Some(part_size) if part_size > 0 && length > 0 => length.div_ceil(part_size) as u32,
            _ => 1,
        };
        files.push(ShardFileInfo {
            name: require_str(file, "name")?.to_string(),
            physical_name: require_str(file, "physical_name")?.to_string(),
            length,
            part_count,
            checksum: require_str(file, "checksum")?.to_string(),
        });
    }

    let total_size = require_i64(tree, "total_size")?;
    if total_size < 0 {
        return Err(ReliquaryError::malformed("total_size is negative"));
    }

    Ok(ShardMetadata {
        snapshot_name: snapshot_name.to_string(),
        index_name: index_name.to_string(),
        index_id: index_id.to_string(),
        shard_id,
        index_version: require_i64(tree, "index_version")?,
        start_time: require_i64(tree, "start_time")?,
        time: require_i64(tree, "time")?,
        number_of_files: require_i64(tree, "number_of_files")? as u32,
        total_size_bytes: total_size as u64,
        files,
    })
}
