//! End-to-end rendering of deployment templates.
//!
//! Structured mode: evaluate, extract, assemble a `List` document.
//! Flat mode: expand `${...}` placeholders in text.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::assembler::{OutputDocument, ResourceList};
use crate::config::PipelineConfig;
use crate::error::TemplateResult;
use crate::evaluator::{Importer, StructuredEvaluator};
use crate::expander::FlatExpander;
use crate::extractor::ResourceExtractor;
use crate::natives::standard_natives;
use crate::registry::ResolverRegistry;

/// Renders templates with one configuration and one registry.
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<ResolverRegistry>,
    expander: FlatExpander,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, registry: Arc<ResolverRegistry>) -> Self {
        Self {
            config,
            registry,
            expander: FlatExpander::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.registry
    }

    /// Build the evaluator used for structured templates.
    pub fn evaluator(&self) -> StructuredEvaluator {
        let mut evaluator =
            StructuredEvaluator::new(Importer::new(&self.config.includes), &self.registry.release())
                .with_external_vars(&self.config.external_vars);
        for function in standard_natives(self.registry.clone()) {
            evaluator = evaluator.with_native(function);
        }
        evaluator
    }

    /// Render a Jsonnet script into a resource list.
    pub fn render_structured(&self, path: &Path) -> TemplateResult<OutputDocument> {
        info!("Rendering structured template {:?}", path);

        let root = self.evaluator().evaluate(path)?;
        let extractor = ResourceExtractor::new(self.config.marker_field.clone());
        let resources = extractor.extract(root, &self.config.filter)?;
        debug!(
            "Extracted {} resources with filter '{}'",
            resources.len(),
            self.config.filter
        );

        let list = ResourceList::assemble(&resources)?;
        info!("Assembled {} resources", list.len());
        Ok(OutputDocument::List(list))
    }

    /// Expand placeholders in a text file.
    pub fn render_flat(&self, path: &Path) -> TemplateResult<OutputDocument> {
        info!("Expanding flat template {:?}", path);
        let text = self.expander.expand_file(path, &self.registry)?;
        Ok(OutputDocument::Text(text))
    }

    /// Expand placeholders in in-memory text.
    pub fn render_flat_str(&self, text: &str) -> TemplateResult<OutputDocument> {
        let text = self.expander.expand(text, &self.registry)?;
        Ok(OutputDocument::Text(text))
    }
}
