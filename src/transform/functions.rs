//! Shared document-tree rewrites used by the concrete transformers.
//!
//! Every function here takes and returns plain trees; transformers call
//! them on working copies, so nothing in this module can touch a source
//! entity.

use serde_json::{Map, Value, json};

use crate::error::{ReliquaryError, Result};
use crate::metadata::IndexMetadata;

/// Source-engine bookkeeping settings with no target equivalent. Compared
/// after the `index.` prefix is stripped, so both spellings are covered.
const LEGACY_SETTING_KEYS: &[&str] = &[
    "version",
    "version.created",
    "version.upgraded",
    "creation_date",
    "uuid",
    "provided_name",
    "mapper.dynamic",
    "mapping.single_type",
];

/// Legacy per-type mapping metafields removed by every upgrade path.
const LEGACY_MAPPING_KEYS: &[&str] = &["_all", "_ttl", "_timestamp", "_parent"];

/// Normalize an index settings tree into the canonical
/// `{"index": { <flat keys> }}` shape: the `index.` prefix and any
/// intermediate `index` object are folded away, and legacy bookkeeping keys
/// are dropped.
pub fn normalize_settings(settings: &Value) -> Result<Value> {
    let source = settings
        .as_object()
        .ok_or_else(|| ReliquaryError::malformed("settings tree is not an object"))?;

    let mut index_settings = Map::new();
    for (key, value) in source {
        if key == "index" {
            // Intermediate nesting level: lift its children up.
            let nested = value.as_object().ok_or_else(|| {
                ReliquaryError::malformed("settings \"index\" node is not an object")
            })?;
            for (nested_key, nested_value) in nested {
                insert_unless_legacy(&mut index_settings, nested_key, nested_value);
            }
        } else {
            let stripped = key.strip_prefix("index.").unwrap_or(key);
            insert_unless_legacy(&mut index_settings, stripped, value);
        }
    }

    Ok(json!({ "index": index_settings }))
}

fn insert_unless_legacy(target: &mut Map<String, Value>, key: &str, value: &Value) {
    if LEGACY_SETTING_KEYS.contains(&key) {
        return;
    }
    target.insert(key.to_string(), value.clone());
}

/// Collapse the wrappers older generations put around mapping definitions:
/// a one-element array, then a single type-name level (`_doc` or a custom
/// type). Legacy metafields are dropped from the result.
pub fn unwrap_mappings(mappings: &Value) -> Value {
    let mut node = mappings;
    if let Some(items) = node.as_array() {
        match items.len() {
            0 => return json!({}),
            1 => node = &items[0],
            _ => return node.clone(),
        }
    }

    let Some(map) = node.as_object() else {
        return node.clone();
    };
    // Already unwrapped mappings describe fields directly.
    if map.contains_key("properties") || map.contains_key("dynamic_templates") {
        return strip_legacy_mapping_keys(node.clone());
    }
    if map.len() == 1
        && let Some((_, inner)) = map.iter().next()
        && inner.is_object()
    {
        return strip_legacy_mapping_keys(inner.clone());
    }
    strip_legacy_mapping_keys(node.clone())
}

/// Split a multi-type mapping tree into `(type name, mapping)` pairs, in
/// document order. Single-type trees produce one pair.
pub fn split_mappings_by_type(mappings: &Value) -> Result<Vec<(String, Value)>> {
    let map = mappings
        .as_object()
        .ok_or_else(|| ReliquaryError::malformed("mappings tree is not an object"))?;

    let mut split = Vec::with_capacity(map.len());
    for (type_name, mapping) in map {
        if !mapping.is_object() {
            return Err(ReliquaryError::malformed(format!(
                "mapping for type \"{type_name}\" is not an object"
            )));
        }
        split.push((
            type_name.clone(),
            strip_legacy_mapping_keys(mapping.clone()),
        ));
    }
    Ok(split)
}

fn strip_legacy_mapping_keys(mut mapping: Value) -> Value {
    if let Some(map) = mapping.as_object_mut() {
        for key in LEGACY_MAPPING_KEYS {
            map.remove(*key);
        }
    }
    mapping
}

/// Round the replica count up so that (replicas + 1) is a multiple of the
/// awareness-attribute dimensionality, keeping one full copy per zone.
pub fn fix_replicas_for_dimensionality(settings: &mut Value, dimensionality: u32) {
    if dimensionality <= 1 {
        return;
    }
    let Some(index_settings) = settings
        .get_mut("index")
        .and_then(Value::as_object_mut)
    else {
        return;
    };

    let replicas = match index_settings.get("number_of_replicas") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(1) as u32,
        Some(Value::String(s)) => s.parse::<u32>().unwrap_or(1),
        _ => 1,
    };
    let dimensionality = dimensionality as u64;
    let copies = (replicas as u64 + 1).div_ceil(dimensionality) * dimensionality;
    index_settings.insert(
        "number_of_replicas".to_string(),
        Value::String((copies - 1).to_string()),
    );
}

/// Assemble the canonical target index body from a working copy's parts.
pub fn canonical_index_body(
    source: &dyn IndexMetadata,
    mappings: Value,
    dimensionality: u32,
) -> Result<Value> {
    let aliases = match source.aliases() {
        Value::Null => json!({}),
        other => other.clone(),
    };
    let mut settings = normalize_settings(source.settings())?;
    fix_replicas_for_dimensionality(&mut settings, dimensionality);
    Ok(json!({
        "aliases": aliases,
        "mappings": mappings,
        "settings": settings,
    }))
}
