//! End-to-end scenarios over a synthetic legacy-generation repository
//! (flat catalog, unframed blobs located by the binary-JSON start marker).

mod common;

use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use reliquary::error::ReliquaryError;
use reliquary::metadata::{GlobalMetadataFactory, IndexMetadataFactory, ShardMetadataFactory};
use reliquary::catalog::CatalogProvider;
use reliquary::repo::{FileSystemRepo, SourceRepo};
use reliquary::transform::{TransformerConfig, select_transformer};
use reliquary::version::Version;
use reliquary::versions::es_2_4::{
    Es24CatalogProvider, Es24GlobalMetadataFactory, Es24IndexMetadataFactory,
    Es24ShardMetadataFactory,
};

/// Unframed blobs start with whatever bytes the legacy writer put before
/// the payload; the reader must skip them.
const BLOB_PREFIX: &[u8] = &[0x00, 0x08, 0x73, 0x6E, 0x61, 0x70, 0x3A, 0x29];

fn build_repo(root: &std::path::Path) {
    fs::write(
        root.join("index"),
        serde_json::to_vec(&json!({"snapshots": ["snap-old"]})).unwrap(),
    )
    .unwrap();

    let snapshot_info = json!({
        "snapshot": {
            "name": "snap-old",
            "indices": ["catalog", "inventory"]
        }
    });
    common::write_blob(
        &root.join("snap-snap-old.dat"),
        &common::embedded_blob(BLOB_PREFIX, &snapshot_info),
    );

    let global = json!({
        "meta-data": {
            "templates": {"catalog-template": {"order": 1}}
        }
    });
    common::write_blob(
        &root.join("meta-snap-old.dat"),
        &common::embedded_blob(BLOB_PREFIX, &global),
    );

    // A multi-type index: two document types under one legacy index, with
    // old-style settings at the top level of the settings object.
    let index_meta = json!({
        "catalog": {
            "aliases": {},
            "mappings": {
                "book": {"properties": {"title": {"type": "string"}}},
                "author": {"properties": {"name": {"type": "string"}}}
            },
            "settings": {
                "number_of_shards": "2",
                "number_of_replicas": "0",
                "version": {"created": "2040699"},
                "uuid": "legacy-uuid"
            }
        }
    });
    common::write_blob(
        &root.join("indices/catalog/meta-snap-old.dat"),
        &common::embedded_blob(BLOB_PREFIX, &index_meta),
    );

    let manifest = common::shard_manifest("snap-old", &[("__0", "_0.cfs", 1024, "abcd1234")]);
    common::write_blob(
        &root.join("indices/catalog/0/snap-snap-old.dat"),
        &common::embedded_blob(BLOB_PREFIX, &manifest),
    );
}

fn provider(root: &std::path::Path) -> Arc<Es24CatalogProvider> {
    let repo: Arc<dyn SourceRepo> = Arc::new(FileSystemRepo::new(root));
    Arc::new(Es24CatalogProvider::new(repo))
}

#[test]
fn test_catalog_ids_are_names() {
    let dir = tempdir().unwrap();
    build_repo(dir.path());
    let provider = provider(dir.path());

    let snapshots = provider.snapshots().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].name, "snap-old");
    assert_eq!(snapshots[0].id, "snap-old");

    assert_eq!(
        provider.snapshot_id("snap-old").unwrap(),
        Some("snap-old".to_string())
    );
    assert_eq!(provider.snapshot_id("missing").unwrap(), None);
}

#[test]
fn test_indices_listed_from_unframed_snapshot_blob() {
    let dir = tempdir().unwrap();
    build_repo(dir.path());
    let provider = provider(dir.path());

    let indices: Vec<String> = provider
        .indices_in("snap-old")
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(indices, vec!["catalog", "inventory"]);
}

#[test]
fn test_extracts_global_metadata_without_envelope() {
    let dir = tempdir().unwrap();
    build_repo(dir.path());
    let factory = Es24GlobalMetadataFactory::new(provider(dir.path()));

    let meta = factory.from_repo("snap-old").unwrap();
    assert!(meta.templates().unwrap().get("catalog-template").is_some());
    assert!(meta.index_templates().is_none());
}

#[test]
fn test_extracts_multi_type_index_metadata() {
    let dir = tempdir().unwrap();
    build_repo(dir.path());
    let factory = Es24IndexMetadataFactory::new(provider(dir.path()));

    let meta = factory.from_repo("snap-old", "catalog").unwrap();
    assert_eq!(meta.number_of_shards(), 2);
    assert!(meta.mappings().get("book").is_some());
    assert!(meta.mappings().get("author").is_some());
}

#[test]
fn test_extracts_shard_metadata_without_envelope() {
    let dir = tempdir().unwrap();
    build_repo(dir.path());
    let factory = Es24ShardMetadataFactory::new(provider(dir.path()));

    let shard = factory.from_repo("snap-old", "catalog", 0).unwrap();
    assert_eq!(shard.files.len(), 1);
    assert_eq!(shard.files[0].name, "__0");
    assert_eq!(shard.files[0].checksum, "abcd1234");
}

#[test]
fn test_truncated_blob_is_malformed_not_empty() {
    let dir = tempdir().unwrap();
    build_repo(dir.path());

    // Keep only the prefix and the SMILE header: the parse yields nothing.
    let path = dir.path().join("indices/catalog/meta-snap-old.dat");
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..BLOB_PREFIX.len() + 4]).unwrap();

    let factory = Es24IndexMetadataFactory::new(provider(dir.path()));
    let err = factory.from_repo("snap-old", "catalog").unwrap_err();
    assert!(matches!(err, ReliquaryError::MalformedDocument(_)));
}

#[test]
fn test_legacy_index_splits_into_one_target_per_type() {
    let dir = tempdir().unwrap();
    build_repo(dir.path());
    let factory = Es24IndexMetadataFactory::new(provider(dir.path()));
    let source = factory.from_repo("snap-old", "catalog").unwrap();

    let transformer = select_transformer(
        &Version::parse("ES 2.4.6").unwrap(),
        &Version::parse("OS 2.11").unwrap(),
        &TransformerConfig::default(),
    )
    .unwrap();

    let outputs = transformer.transform_index_metadata(source.as_ref()).unwrap();
    assert_eq!(outputs.len(), 2);

    let names: Vec<&str> = outputs.iter().map(|o| o.name()).collect();
    assert_eq!(names, vec!["catalog-book", "catalog-author"]);

    for target in &outputs {
        // Shard count carries over; old-generation-only keys are gone.
        assert_eq!(target.number_of_shards(), 2);
        let index_settings = &target.settings()["index"];
        assert_eq!(index_settings["number_of_shards"], "2");
        assert!(index_settings.get("version").is_none());
        assert!(index_settings.get("uuid").is_none());
    }

    // Each target carries only its own type's fields.
    assert!(outputs[0].mappings()["properties"].get("title").is_some());
    assert!(outputs[0].mappings()["properties"].get("name").is_none());
    assert!(outputs[1].mappings()["properties"].get("name").is_some());
    assert!(outputs[1].mappings()["properties"].get("title").is_none());
}
