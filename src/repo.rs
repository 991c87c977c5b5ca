//! Snapshot repository locations.
//!
//! A [`SourceRepo`] is an opaque root handle over a snapshot repository plus
//! deterministic path-resolution functions of (root, ids). There is no
//! caching at this seam and no decoding: callers read the resolved files
//! themselves. Implementations may be backed by a local filesystem (provided
//! here) or by remote object storage that materializes blobs locally first.

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Result;

/// Path resolution over one snapshot repository root.
pub trait SourceRepo: Send + Sync + std::fmt::Debug {
    /// The repository root directory.
    fn root(&self) -> &Path;

    /// Path of the root catalog file listing snapshots and indices.
    ///
    /// Newer repository generations write `index-N` and bump `N` on every
    /// snapshot; the highest generation present is the live catalog. The
    /// oldest generation wrote a flat `index` file instead.
    fn catalog_root_path(&self) -> Result<PathBuf>;

    /// Path of the global (cluster) metadata blob for one snapshot.
    fn global_metadata_path(&self, snapshot_id: &str) -> PathBuf;

    /// Path of the per-snapshot info blob (name, state, contained indices).
    fn snapshot_metadata_path(&self, snapshot_id: &str) -> PathBuf;

    /// Path of the index metadata blob for one index, by file generation.
    fn index_metadata_path(&self, index_id: &str, file_generation: &str) -> PathBuf;

    /// Path of the shard metadata blob for one (snapshot, index, shard).
    fn shard_metadata_path(&self, snapshot_id: &str, index_id: &str, shard_id: u32) -> PathBuf;

    /// Path of a raw shard data file by its physical name.
    fn shard_blob_path(&self, index_id: &str, shard_id: u32, physical_name: &str) -> PathBuf;
}

lazy_static! {
    static ref CATALOG_GENERATION: Regex = Regex::new(r"^index-(\d+)$").unwrap();
}

/// A snapshot repository on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSystemRepo {
    root: PathBuf,
}

impl FileSystemRepo {
    /// Open a repository rooted at `root`. The directory is not validated
    /// beyond existing; a missing catalog surfaces on first resolution.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FileSystemRepo {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn shard_dir(&self, index_id: &str, shard_id: u32) -> PathBuf {
        self.root
            .join("indices")
            .join(index_id)
            .join(shard_id.to_string())
    }
}

impl SourceRepo for FileSystemRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn catalog_root_path(&self) -> Result<PathBuf> {
        let mut highest: Option<(u64, PathBuf)> = None;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(caps) = CATALOG_GENERATION.captures(name)
                && let Ok(generation) = caps[1].parse::<u64>()
                && highest.as_ref().is_none_or(|(best, _)| generation > *best)
            {
                highest = Some((generation, entry.path()));
            }
        }
        match highest {
            Some((_, path)) => Ok(path),
            // Legacy repositories wrote an unnumbered catalog file.
            None => Ok(self.root.join("index")),
        }
    }

    fn global_metadata_path(&self, snapshot_id: &str) -> PathBuf {
        self.root.join(format!("meta-{snapshot_id}.dat"))
    }

    fn snapshot_metadata_path(&self, snapshot_id: &str) -> PathBuf {
        self.root.join(format!("snap-{snapshot_id}.dat"))
    }

    fn index_metadata_path(&self, index_id: &str, file_generation: &str) -> PathBuf {
        self.root
            .join("indices")
            .join(index_id)
            .join(format!("meta-{file_generation}.dat"))
    }

    fn shard_metadata_path(&self, snapshot_id: &str, index_id: &str, shard_id: u32) -> PathBuf {
        self.shard_dir(index_id, shard_id)
            .join(format!("snap-{snapshot_id}.dat"))
    }

    fn shard_blob_path(&self, index_id: &str, shard_id: u32, physical_name: &str) -> PathBuf {
        self.shard_dir(index_id, shard_id).join(physical_name)
    }
}
