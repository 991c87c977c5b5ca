//! # Reliquary
//!
//! Extraction and normalization of cluster metadata stored in on-disk
//! snapshot repositories, covering the repository generations written by
//! historical Elasticsearch and OpenSearch versions.
//!
//! ## Features
//!
//! - Checksummed binary envelope decoding (header/footer validation,
//!   compression framing, raw inflate, binary-JSON parsing)
//! - Per-generation repository catalogs mapping snapshot/index names to
//!   internal ids and file paths
//! - Typed global/index/shard metadata entities with per-version factories
//! - Version predicates and an ordered transformer chain producing
//!   target-shaped entities for a migration writer
//!
//! Reads never mutate a repository; corrupt or ambiguous data fails
//! explicitly instead of being guessed at.

pub mod batch;
pub mod catalog;
pub mod envelope;
pub mod error;
pub mod metadata;
pub mod repo;
pub mod transform;
pub mod version;
pub mod versions;

pub mod prelude {}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
