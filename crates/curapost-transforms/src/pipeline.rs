//! Transform pipeline and registry

use std::collections::HashMap;
use std::sync::Arc;

use curapost_core::{Diagnostics, PrinterConfig, TransformError};
use curapost_parser::Document;

use crate::config::TransformConfig;
use crate::transform::{Capability, Transform, TransformContext, TransformHandle};

/// Ordered sequence of transforms applied to one document
///
/// Each transform receives the previous one's output. A transform whose
/// required markers were removed by an earlier one is skipped with a
/// diagnostic instead of running on a document it cannot understand.
///
/// # Example
/// ```ignore
/// let mut pipeline = Pipeline::new();
/// pipeline.register(Arc::new(SpeedLimits::default()));
/// pipeline.register(Arc::new(RemoveComments::default()));
///
/// let (blocks, diagnostics) = pipeline.process_blocks(&blocks, printer);
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    transforms: Vec<TransformHandle>,
    annotate_header: bool,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append diagnostics as comments at the end of the header block
    pub fn with_header_annotations(mut self, enabled: bool) -> Self {
        self.annotate_header = enabled;
        self
    }

    /// Register a transform; transforms run in registration order
    pub fn register(&mut self, transform: TransformHandle) -> &mut Self {
        self.transforms.push(transform);
        self
    }

    /// Register multiple transforms at once
    pub fn register_all(&mut self, transforms: Vec<TransformHandle>) -> &mut Self {
        self.transforms.extend(transforms);
        self
    }

    pub fn transform_count(&self) -> usize {
        self.transforms.len()
    }

    pub fn get_transform(&self, index: usize) -> Option<&TransformHandle> {
        self.transforms.get(index)
    }

    pub fn get_transform_by_name(&self, name: &str) -> Option<&TransformHandle> {
        self.transforms.iter().find(|t| t.name() == name)
    }

    /// Names and descriptions in run order
    pub fn list_transforms(&self) -> Vec<(&str, &str)> {
        self.transforms
            .iter()
            .map(|t| (t.name(), t.description()))
            .collect()
    }

    /// Ordering conflicts: a transform requiring what an earlier one invalidates
    pub fn check_order(&self) -> Vec<TransformError> {
        let mut invalidated: HashMap<Capability, &str> = HashMap::new();
        let mut conflicts = Vec::new();
        for transform in &self.transforms {
            conflicts.extend(conflicts_for(transform.as_ref(), &invalidated));
            for capability in transform.invalidates() {
                invalidated.entry(capability).or_insert(transform.name());
            }
        }
        conflicts
    }

    /// Run every transform over `doc`
    ///
    /// Never fails: skipped transforms leave the document as they found it
    /// and report through `ctx.diagnostics`.
    pub fn run(&self, mut doc: Document, ctx: &mut TransformContext) -> Document {
        let mut invalidated: HashMap<Capability, &str> = HashMap::new();

        for transform in &self.transforms {
            let name = transform.name();
            if let Some(conflict) = conflicts_for(transform.as_ref(), &invalidated).into_iter().next() {
                ctx.diagnostics.error(name, format!("Did not run: {}", conflict));
                continue;
            }

            tracing::debug!(transform = name, "applying transform");
            doc = match transform.apply(doc, ctx) {
                Ok(doc) => {
                    for capability in transform.invalidates() {
                        invalidated.entry(capability).or_insert(name);
                    }
                    doc
                }
                Err(skipped) => {
                    ctx.diagnostics
                        .warn(name, format!("Did not run: {}", skipped.reason));
                    skipped.document
                }
            };

            let problems = doc.invariant_violations();
            if !problems.is_empty() {
                tracing::warn!(transform = name, ?problems, "document invariants broken");
            }
        }

        if self.annotate_header && !ctx.diagnostics.is_empty() {
            annotate_header(&mut doc, &ctx.diagnostics);
        }
        doc
    }

    /// Host entry point: block texts in, block texts and diagnostics out
    pub fn process_blocks<S: AsRef<str>>(
        &self,
        blocks: &[S],
        printer: PrinterConfig,
    ) -> (Vec<String>, Diagnostics) {
        let mut ctx = TransformContext::new(printer);
        let doc = self.run(Document::from_blocks(blocks), &mut ctx);
        (doc.into_blocks(), ctx.diagnostics)
    }
}

fn conflicts_for(
    transform: &dyn Transform,
    invalidated: &HashMap<Capability, &str>,
) -> Vec<TransformError> {
    transform
        .requires()
        .into_iter()
        .filter_map(|capability| {
            invalidated
                .get(&capability)
                .map(|by| TransformError::OrderingViolation {
                    transform: transform.name().to_string(),
                    capability: capability.to_string(),
                    invalidated_by: by.to_string(),
                })
        })
        .collect()
}

fn annotate_header(doc: &mut Document, diagnostics: &Diagnostics) {
    let lines: Vec<String> = diagnostics.iter().map(|d| d.to_comment()).collect();
    match doc.edit_block(0) {
        Ok(mut header) => {
            let at = header.lines().len();
            header.insert_lines(at, lines);
        }
        Err(e) => tracing::warn!("cannot annotate header: {}", e),
    }
}

type TransformFactory = Arc<dyn Fn() -> TransformHandle + Send + Sync>;

/// Transform registry for dynamic creation
///
/// Allows registering transform factories and creating instances by name
/// with default settings, or from a [`TransformConfig`].
pub struct TransformRegistry {
    factories: HashMap<String, TransformFactory>,
}

impl TransformRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in transform
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for config in TransformConfig::all_defaults() {
            let name = config.kind().to_string();
            registry.register(name, move || config.build());
        }
        registry
    }

    /// Register a transform factory
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> TransformHandle + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Create a transform with default settings
    pub fn create(&self, name: &str) -> Option<TransformHandle> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Build a pipeline from transform names
    pub fn create_pipeline(&self, names: &[&str]) -> Result<Pipeline, TransformError> {
        let mut pipeline = Pipeline::new();
        for name in names {
            let transform = self.create(name).ok_or_else(|| {
                TransformError::invalid("transforms", format!("unknown transform '{}'", name))
            })?;
            pipeline.register(transform);
        }
        Ok(pipeline)
    }

    /// Build a pipeline from explicit configurations
    pub fn pipeline_from_configs(&self, configs: &[TransformConfig]) -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.register_all(configs.iter().map(TransformConfig::build).collect());
        pipeline
    }

    /// Sorted names of registered transforms
    pub fn list_registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{skip, TransformResult};

    struct Tag(&'static str, Vec<Capability>, Vec<Capability>);

    impl Transform for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "appends its name to the end block"
        }

        fn requires(&self) -> Vec<Capability> {
            self.1.clone()
        }

        fn invalidates(&self) -> Vec<Capability> {
            self.2.clone()
        }

        fn apply(&self, mut doc: Document, _ctx: &mut TransformContext) -> TransformResult {
            let Some(end) = doc.end_index() else {
                return skip(doc, TransformError::marker("end block"));
            };
            match doc.edit_block(end) {
                Ok(mut block) => {
                    let at = block.lines().len();
                    block.insert_lines(at, [format!(";{}", self.0)]);
                }
                Err(e) => return skip(doc, e.into()),
            }
            Ok(doc)
        }
    }

    fn doc() -> Document {
        Document::from_blocks([";FLAVOR:Marlin\n", "G28\n;LAYER_COUNT:1\n", ";LAYER:0\nG1 X1 Y1 E1\n", "M84\n"])
    }

    #[test]
    fn test_runs_in_order() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Arc::new(Tag("a", vec![], vec![])));
        pipeline.register(Arc::new(Tag("b", vec![], vec![])));
        let mut ctx = TransformContext::default();
        let out = pipeline.run(doc(), &mut ctx);
        assert_eq!(out.end().unwrap().to_text(), "M84\n;a\n;b\n");
        assert!(ctx.diagnostics.is_empty());
        assert_eq!(pipeline.list_transforms()[1], ("b", "appends its name to the end block"));
    }

    #[test]
    fn test_ordering_violation_skips() {
        let mut pipeline = Pipeline::new().with_header_annotations(true);
        pipeline.register(Arc::new(Tag("strip", vec![], vec![Capability::LayerMarkers])));
        pipeline.register(Arc::new(Tag("needs", vec![Capability::LayerMarkers], vec![])));
        assert_eq!(pipeline.check_order().len(), 1);

        let mut ctx = TransformContext::default();
        let out = pipeline.run(doc(), &mut ctx);
        assert_eq!(out.end().unwrap().to_text(), "M84\n;strip\n");
        assert_eq!(ctx.diagnostics.from_source("needs").count(), 1);
        assert!(out.header().unwrap().to_text().contains(";  [needs] Did not run"));
    }

    #[test]
    fn test_skipped_transform_keeps_document() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Arc::new(Tag("x", vec![], vec![])));
        let input = Document::from_blocks([";H\n"]);
        let mut ctx = TransformContext::default();
        let out = pipeline.run(input.clone(), &mut ctx);
        assert_eq!(out, input);
        assert_eq!(ctx.diagnostics.len(), 1);
    }

    #[test]
    fn test_registry_defaults() {
        let registry = TransformRegistry::with_defaults();
        assert!(registry.list_registered().contains(&"remove_comments".to_string()));
        assert!(registry.create("remove_comments").is_some());
        assert!(registry.create("nope").is_none());
        let pipeline = registry.create_pipeline(&["speed_limits", "final_z"]).unwrap();
        assert_eq!(pipeline.transform_count(), 2);
        assert!(registry.create_pipeline(&["bogus"]).is_err());
    }
}
