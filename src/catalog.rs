//! Repository catalog contract.
//!
//! The catalog is the root document of a repository listing known snapshots
//! and indices and their internal ids. Each supported repository generation
//! has its own provider (see [`crate::versions`]) implementing this contract
//! against that generation's document shape; the shape difference is
//! entirely internal to the provider. Providers load the root catalog
//! lazily, exactly once per instance, and treat the repository as immutable
//! once published.

use crate::error::Result;
use crate::repo::SourceRepo;

/// One snapshot known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Human-readable snapshot name.
    pub name: String,
    /// Internal snapshot id (equal to the name in legacy generations).
    pub id: String,
}

/// One index contained in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Human-readable index name.
    pub name: String,
    /// Internal index id (equal to the name in legacy generations).
    pub id: String,
}

/// Per-generation read access to a repository's root catalog.
///
/// `snapshot_id` and `index_id` return `Ok(None)` for names the catalog does
/// not know, so callers can distinguish "doesn't exist" from a decode
/// failure of the catalog itself.
pub trait CatalogProvider: Send + Sync + std::fmt::Debug {
    /// All snapshots in the repository.
    fn snapshots(&self) -> Result<Vec<SnapshotEntry>>;

    /// The indices contained in one snapshot, in catalog order.
    fn indices_in(&self, snapshot_name: &str) -> Result<Vec<IndexEntry>>;

    /// Resolve a snapshot name to its internal id.
    fn snapshot_id(&self, snapshot_name: &str) -> Result<Option<String>>;

    /// Resolve an index name to its internal id.
    fn index_id(&self, index_name: &str) -> Result<Option<String>>;

    /// The repository location this catalog reads from.
    fn repo(&self) -> &dyn SourceRepo;
}
