//! Version-aware metadata transformation.
//!
//! A [`Transformer`] converts one source generation's entities into the
//! target generation's shape: global metadata one-to-one, index metadata
//! one-to-many (a multi-type legacy index splits into one target index per
//! type). Transformers are stateless aside from construction-time
//! configuration and safe to reuse across any number of calls.
//!
//! Selection walks an ordered table of (source predicate, constructor)
//! pairs and takes the first predicate matching the detected source
//! version; no match is a fatal
//! [`UnsupportedMigrationPath`](crate::error::ReliquaryError::UnsupportedMigrationPath).

pub mod functions;
pub mod os_2_11;

use std::sync::Arc;

use lazy_static::lazy_static;

use crate::error::{ReliquaryError, Result};
use crate::metadata::{GlobalMetadata, IndexMetadata};
use crate::version::matchers::{self, VersionPredicate};
use crate::version::Version;

pub use self::os_2_11::{
    Es8xToOs211Transformer, Es24ToOs211Transformer, Es68ToOs211Transformer,
    Es710ToOs211Transformer,
};

/// Converts source entities into the target version's shape.
pub trait Transformer: Send + Sync + std::fmt::Debug {
    /// Transform one snapshot's global metadata.
    fn transform_global_metadata(
        &self,
        global: &dyn GlobalMetadata,
    ) -> Result<Box<dyn GlobalMetadata>>;

    /// Transform one index's metadata into one or more target indices.
    fn transform_index_metadata(
        &self,
        index: &dyn IndexMetadata,
    ) -> Result<Vec<Box<dyn IndexMetadata>>>;
}

/// Construction-time transformer configuration.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    /// Awareness-attribute dimensionality of the target cluster, used when
    /// rewriting replica settings. 1 disables the rewrite.
    pub awareness_attribute_dimensionality: u32,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        TransformerConfig {
            awareness_attribute_dimensionality: 1,
        }
    }
}

type TransformerBuilder = Box<dyn Fn(&TransformerConfig) -> Arc<dyn Transformer> + Send + Sync>;

struct RegisteredTransformer {
    source: VersionPredicate,
    build: TransformerBuilder,
}

/// An ordered table of transformers keyed by source-version predicates.
///
/// Registration order is significant: selection is deterministic and the
/// first matching entry wins, so narrower predicates must be registered
/// before broader ones that subsume them.
#[derive(Default)]
pub struct TransformerRegistry {
    entries: Vec<RegisteredTransformer>,
}

impl TransformerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        TransformerRegistry {
            entries: Vec::new(),
        }
    }

    /// Append an entry. Later entries only run when no earlier predicate
    /// matched.
    pub fn register<F>(&mut self, source: VersionPredicate, build: F)
    where
        F: Fn(&TransformerConfig) -> Arc<dyn Transformer> + Send + Sync + 'static,
    {
        self.entries.push(RegisteredTransformer {
            source,
            build: Box::new(build),
        });
    }

    /// The standard migration paths, in declaration order.
    pub fn standard() -> Self {
        let mut registry = TransformerRegistry::new();
        registry.register(matchers::IS_ES_2_X.or(&matchers::IS_ES_5_X), |config| {
            Arc::new(Es24ToOs211Transformer::new(
                config.awareness_attribute_dimensionality,
            ))
        });
        registry.register(matchers::IS_ES_6_X.clone(), |config| {
            Arc::new(Es68ToOs211Transformer::new(
                config.awareness_attribute_dimensionality,
            ))
        });
        registry.register(matchers::IS_ES_7_X.clone(), |config| {
            Arc::new(Es710ToOs211Transformer::new(
                config.awareness_attribute_dimensionality,
            ))
        });
        registry.register(matchers::IS_ES_8_X.clone(), |config| {
            Arc::new(Es8xToOs211Transformer::new(
                config.awareness_attribute_dimensionality,
            ))
        });
        // OpenSearch sources already carry the modern shape.
        registry.register(matchers::ANY_OS.clone(), |config| {
            Arc::new(Es710ToOs211Transformer::new(
                config.awareness_attribute_dimensionality,
            ))
        });
        registry
    }

    /// Select the transformer for a (source, target) pair. The target must
    /// be in the OpenSearch-lineage group; the source is matched against
    /// the registered predicates in order, first match wins.
    pub fn select(
        &self,
        source: &Version,
        target: &Version,
        config: &TransformerConfig,
    ) -> Result<Arc<dyn Transformer>> {
        if !matchers::ANY_OS.matches(target) {
            return Err(ReliquaryError::unsupported_migration(format!(
                "target version {target} is not a supported migration target"
            )));
        }
        for entry in &self.entries {
            if entry.source.matches(source) {
                tracing::debug!(source = %source, target = %target, "selected transformer");
                return Ok((entry.build)(config));
            }
        }
        Err(ReliquaryError::unsupported_migration(format!(
            "no transformer accepts source version {source}"
        )))
    }
}

lazy_static! {
    static ref STANDARD_REGISTRY: TransformerRegistry = TransformerRegistry::standard();
}

/// Select from the standard migration paths. See
/// [`TransformerRegistry::select`].
pub fn select_transformer(
    source: &Version,
    target: &Version,
    config: &TransformerConfig,
) -> Result<Arc<dyn Transformer>> {
    STANDARD_REGISTRY.select(source, target, config)
}
