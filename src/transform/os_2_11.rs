//! Concrete transformers targeting OpenSearch 2.x.
//!
//! One transformer per source-version class. The 8.x transformer delegates
//! to the 7.10 one by holding it as an owned field and forwarding both
//! calls; the source shapes are behaviorally identical. Delegation is
//! always explicit composition here, never a subtype relationship.

use serde_json::{Value, json};

use crate::error::Result;
use crate::metadata::{GlobalMetadata, IndexMetadata};
use crate::transform::functions::{
    canonical_index_body, split_mappings_by_type, unwrap_mappings,
};
use crate::transform::Transformer;
use crate::versions::os_2_11::{GlobalMetadataOs211, IndexMetadataOs211};

/// Carry the template trees into a fresh target-shaped global document.
fn carry_templates(global: &dyn GlobalMetadata) -> Result<Box<dyn GlobalMetadata>> {
    let mut root = json!({});
    if let Some(templates) = global.templates() {
        root["templates"] = templates.clone();
    }
    if let Some(index_templates) = global.index_templates() {
        root["index_template"] = json!({ "index_template": index_templates.clone() });
    }
    if let Some(component_templates) = global.component_templates() {
        root["component_template"] =
            json!({ "component_template": component_templates.clone() });
    }
    Ok(Box::new(GlobalMetadataOs211::new(root)))
}

/// Elasticsearch 7.x → OpenSearch 2.x; the canonical modern path.
#[derive(Debug)]
pub struct Es710ToOs211Transformer {
    awareness_attribute_dimensionality: u32,
}

impl Es710ToOs211Transformer {
    /// `awareness_attribute_dimensionality` is the target cluster's zone
    /// count used for replica rounding; pass 1 when awareness is off.
    pub fn new(awareness_attribute_dimensionality: u32) -> Self {
        Es710ToOs211Transformer {
            awareness_attribute_dimensionality,
        }
    }
}

impl Transformer for Es710ToOs211Transformer {
    fn transform_global_metadata(
        &self,
        global: &dyn GlobalMetadata,
    ) -> Result<Box<dyn GlobalMetadata>> {
        carry_templates(global)
    }

    fn transform_index_metadata(
        &self,
        index: &dyn IndexMetadata,
    ) -> Result<Vec<Box<dyn IndexMetadata>>> {
        let working = index.deep_copy();
        let mappings = unwrap_mappings(working.mappings());
        let body = canonical_index_body(
            working.as_ref(),
            mappings,
            self.awareness_attribute_dimensionality,
        )?;
        Ok(vec![Box::new(IndexMetadataOs211::new(
            body,
            index.id(),
            index.name(),
        )?)])
    }
}

/// Elasticsearch 6.x → OpenSearch 2.x. The single mapping type is unwrapped
/// and its legacy metafields dropped; otherwise the modern path applies.
#[derive(Debug)]
pub struct Es68ToOs211Transformer {
    awareness_attribute_dimensionality: u32,
}

impl Es68ToOs211Transformer {
    /// See [`Es710ToOs211Transformer::new`] for the dimensionality knob.
    pub fn new(awareness_attribute_dimensionality: u32) -> Self {
        Es68ToOs211Transformer {
            awareness_attribute_dimensionality,
        }
    }
}

impl Transformer for Es68ToOs211Transformer {
    fn transform_global_metadata(
        &self,
        global: &dyn GlobalMetadata,
    ) -> Result<Box<dyn GlobalMetadata>> {
        carry_templates(global)
    }

    fn transform_index_metadata(
        &self,
        index: &dyn IndexMetadata,
    ) -> Result<Vec<Box<dyn IndexMetadata>>> {
        let working = index.deep_copy();
        let mappings = unwrap_mappings(working.mappings());
        let body = canonical_index_body(
            working.as_ref(),
            mappings,
            self.awareness_attribute_dimensionality,
        )?;
        Ok(vec![Box::new(IndexMetadataOs211::new(
            body,
            index.id(),
            index.name(),
        )?)])
    }
}

/// Elasticsearch 2.x/5.x → OpenSearch 2.x. An index may carry several
/// document types; each becomes its own target index so the transformation
/// is one-to-many. A single-type index keeps its name; multi-type indices
/// emit `{index}-{type}` per type.
#[derive(Debug)]
pub struct Es24ToOs211Transformer {
    awareness_attribute_dimensionality: u32,
}

impl Es24ToOs211Transformer {
    /// See [`Es710ToOs211Transformer::new`] for the dimensionality knob.
    pub fn new(awareness_attribute_dimensionality: u32) -> Self {
        Es24ToOs211Transformer {
            awareness_attribute_dimensionality,
        }
    }
}

impl Transformer for Es24ToOs211Transformer {
    fn transform_global_metadata(
        &self,
        global: &dyn GlobalMetadata,
    ) -> Result<Box<dyn GlobalMetadata>> {
        carry_templates(global)
    }

    fn transform_index_metadata(
        &self,
        index: &dyn IndexMetadata,
    ) -> Result<Vec<Box<dyn IndexMetadata>>> {
        let working = index.deep_copy();
        let types = split_mappings_by_type(working.mappings())?;

        if types.len() <= 1 {
            let mappings = match types.into_iter().next() {
                Some((_, mapping)) => mapping,
                None => json!({}),
            };
            let body = canonical_index_body(
                working.as_ref(),
                mappings,
                self.awareness_attribute_dimensionality,
            )?;
            return Ok(vec![Box::new(IndexMetadataOs211::new(
                body,
                index.id(),
                index.name(),
            )?)]);
        }

        tracing::debug!(
            index = index.name(),
            types = types.len(),
            "splitting multi-type index"
        );
        let mut outputs: Vec<Box<dyn IndexMetadata>> = Vec::with_capacity(types.len());
        for (type_name, mapping) in types {
            let body = canonical_index_body(
                working.as_ref(),
                mapping,
                self.awareness_attribute_dimensionality,
            )?;
            let name = format!("{}-{type_name}", index.name());
            let id = format!("{}-{type_name}", index.id());
            outputs.push(Box::new(IndexMetadataOs211::new(body, &id, &name)?));
        }
        Ok(outputs)
    }
}

/// Elasticsearch 8.x → OpenSearch 2.x. Behaviorally identical to the 7.10
/// source shape; both calls forward to an owned delegate.
#[derive(Debug)]
pub struct Es8xToOs211Transformer {
    delegate: Es710ToOs211Transformer,
}

impl Es8xToOs211Transformer {
    /// See [`Es710ToOs211Transformer::new`] for the dimensionality knob.
    pub fn new(awareness_attribute_dimensionality: u32) -> Self {
        Es8xToOs211Transformer {
            delegate: Es710ToOs211Transformer::new(awareness_attribute_dimensionality),
        }
    }
}

impl Transformer for Es8xToOs211Transformer {
    fn transform_global_metadata(
        &self,
        global: &dyn GlobalMetadata,
    ) -> Result<Box<dyn GlobalMetadata>> {
        tracing::debug!("delegating global metadata transform to the 7.10 path");
        self.delegate.transform_global_metadata(global)
    }

    fn transform_index_metadata(
        &self,
        index: &dyn IndexMetadata,
    ) -> Result<Vec<Box<dyn IndexMetadata>>> {
        tracing::debug!("delegating index metadata transform to the 7.10 path");
        self.delegate.transform_index_metadata(index)
    }
}
