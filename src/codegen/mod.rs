//! Code Generation
//!
//! The seam between the loader and template engines.
//!
//! Architecture:
//! - [`RenderContext`]: the composed document plus everything an engine may
//!   ask for (project name, naming transforms, schema type resolution)
//! - [`TemplateEngine`]: renders a context for one language/style pair
//! - [`RenderOutcome`]: engines may decline to render without that being an
//!   error, e.g. when the document holds nothing for their style
//!
//! One engine ships built in: [`ComposedDocumentEngine`] (`xregistry`/`composed`)
//! writes the composed document and a message-to-type index.

pub mod config;
pub mod names;
pub mod schema_type;

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::document::Document;
use crate::error::Result;
use crate::loader::XRegistryLoader;

pub use config::NamingConfig;
pub use names::NameTransforms;
pub use schema_type::schema_type;

// =============================================================================
// Render Context
// =============================================================================

/// What a template engine gets to work with
pub struct RenderContext<'a> {
    pub document: &'a Document,
    pub project_name: String,
    pub output_dir: PathBuf,
    /// The definitions location the document was loaded from
    pub definitions_uri: String,
    pub names: NameTransforms,
    loader: &'a mut XRegistryLoader,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        loader: &'a mut XRegistryLoader,
        document: &'a Document,
        project_name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            document,
            project_name: project_name.into(),
            output_dir: output_dir.into(),
            definitions_uri: loader.current_url().unwrap_or_default().to_string(),
            names: NameTransforms::default(),
            loader,
        }
    }

    pub fn with_names(mut self, names: NameTransforms) -> Self {
        self.names = names;
        self
    }

    /// Resolve a schema reference to the qualified class name it generates
    pub fn schema_type(&mut self, reference: &str, schema_format: &str) -> Result<String> {
        schema_type(self.loader, reference, &self.project_name, self.document, schema_format)
    }

    /// Has this schema reference already been emitted in this run?
    pub fn is_schema_emitted(&self, reference: &str) -> bool {
        self.loader.schema_references_collected().contains(reference)
    }

    pub fn loader(&self) -> &XRegistryLoader {
        &*self.loader
    }
}

// =============================================================================
// Engines
// =============================================================================

/// Result of a render call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed { files: Vec<PathBuf> },
    /// The engine chose not to render; nothing was written
    Aborted { reason: String },
}

/// A code generator for one language and style
pub trait TemplateEngine {
    fn name(&self) -> &str;
    fn language(&self) -> &str;
    fn style(&self) -> &str;
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<RenderOutcome>;
}

/// All built-in engines
pub fn engines() -> Vec<Box<dyn TemplateEngine>> {
    vec![Box::new(ComposedDocumentEngine)]
}

/// Find the engine for a language/style pair (case-insensitive)
pub fn find_engine(language: &str, style: &str) -> Option<Box<dyn TemplateEngine>> {
    engines().into_iter().find(|e| {
        e.language().eq_ignore_ascii_case(language) && e.style().eq_ignore_ascii_case(style)
    })
}

/// Run an engine and report what it produced
pub fn render(engine: &dyn TemplateEngine, ctx: &mut RenderContext<'_>) -> Result<Vec<PathBuf>> {
    match engine.render(ctx)? {
        RenderOutcome::Completed { files } => {
            info!("{} wrote {} file(s) to {}", engine.name(), files.len(), ctx.output_dir.display());
            Ok(files)
        }
        RenderOutcome::Aborted { reason } => {
            warn!("{} skipped: {}", engine.name(), reason);
            Ok(Vec::new())
        }
    }
}

// =============================================================================
// Composed Document Engine
// =============================================================================

/// Writes `<project>.json` (the composed document) and, when messages
/// declare data schemas, `<project>.types.json` mapping each message to its
/// payload class.
pub struct ComposedDocumentEngine;

impl TemplateEngine for ComposedDocumentEngine {
    fn name(&self) -> &str {
        "composed"
    }

    fn language(&self) -> &str {
        "xregistry"
    }

    fn style(&self) -> &str {
        "composed"
    }

    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<RenderOutcome> {
        let document = ctx.document;
        let has_groups = ctx
            .loader()
            .model()
            .group_plurals()
            .any(|plural| document.get(plural).and_then(Value::as_object).is_some_and(|g| !g.is_empty()));
        if !has_groups {
            return Ok(RenderOutcome::Aborted {
                reason: "document has no groups".to_string(),
            });
        }

        let types = message_types(ctx)?;

        fs::create_dir_all(&ctx.output_dir)?;
        let mut files = vec![write_json(&ctx.output_dir, &format!("{}.json", ctx.project_name), document)?];
        if !types.is_empty() {
            files.push(write_json(
                &ctx.output_dir,
                &format!("{}.types.json", ctx.project_name),
                &Value::Object(types),
            )?);
        }
        Ok(RenderOutcome::Completed { files })
    }
}

/// `collection/group/message` -> class name, for messages with a data schema
fn message_types(ctx: &mut RenderContext<'_>) -> Result<Map<String, Value>> {
    let document = ctx.document;
    let mut types = Map::new();
    let Some(root) = document.as_object() else {
        return Ok(types);
    };

    for (collection, groups) in root {
        let Some(groups) = groups.as_object() else { continue };
        for (group_id, group) in groups {
            let Some(messages) = group.get("messages").and_then(Value::as_object) else {
                continue;
            };
            for (message_id, message) in messages {
                let reference = message.get("dataschemauri").and_then(Value::as_str);
                let format = message.get("dataschemaformat").and_then(Value::as_str);
                if let (Some(reference), Some(format)) = (reference, format) {
                    let class_name = ctx.schema_type(reference, format)?;
                    types.insert(
                        format!("{}/{}/{}", collection, group_id, message_id),
                        Value::String(class_name),
                    );
                }
            }
        }
    }
    Ok(types)
}

fn write_json(dir: &Path, file_name: &str, value: &Value) -> Result<PathBuf> {
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(value)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParsePolicy;
    use crate::error::RegistryError;
    use crate::model::Model;
    use crate::resolve::fetch::testing::MemorySource;
    use serde_json::json;
    use tempfile::TempDir;

    fn loader() -> XRegistryLoader {
        XRegistryLoader::with_source(
            Model::embedded().unwrap(),
            Box::new(MemorySource::new()),
            ParsePolicy::Permissive,
        )
    }

    fn document(format: &str) -> Value {
        json!({
            "messagegroups": {"Contoso.Orders": {"messages": {"created": {
                "dataschemauri": "#/schemagroups/Contoso.Orders/schemas/Created",
                "dataschemaformat": format
            }}}},
            "schemagroups": {"Contoso.Orders": {"schemas": {"Created": {"versions": {
                "1": {"format": "JsonSchema/draft-07", "schema": {"type": "object"}}
            }}}}}
        })
    }

    #[test]
    fn test_find_engine() {
        assert!(find_engine("xregistry", "composed").is_some());
        assert!(find_engine("XRegistry", "Composed").is_some());
        assert!(find_engine("cs", "producer").is_none());
    }

    #[test]
    fn test_composed_engine_writes_document_and_types() {
        let dir = TempDir::new().unwrap();
        let mut loader = loader();
        let doc = document("JsonSchema/draft-07");
        let mut ctx = RenderContext::new(&mut loader, &doc, "App", dir.path());

        let files = render(&ComposedDocumentEngine, &mut ctx).unwrap();
        assert_eq!(files.len(), 2);

        let written: Value = serde_json::from_str(&fs::read_to_string(dir.path().join("App.json")).unwrap()).unwrap();
        assert_eq!(written, doc);
        let types: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("App.types.json")).unwrap()).unwrap();
        assert_eq!(types["messagegroups/Contoso.Orders/created"], "App.Contoso.Orders.Created");
        assert!(ctx.is_schema_emitted("#/schemagroups/Contoso.Orders/schemas/Created"));
    }

    #[test]
    fn test_empty_document_aborts() {
        let dir = TempDir::new().unwrap();
        let mut loader = loader();
        let doc = json!({"messagegroups": {}});
        let mut ctx = RenderContext::new(&mut loader, &doc, "App", dir.path().join("out"));

        let outcome = ComposedDocumentEngine.render(&mut ctx).unwrap();
        assert!(matches!(outcome, RenderOutcome::Aborted { .. }));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_schema_format_mismatch_fails_render() {
        let dir = TempDir::new().unwrap();
        let mut loader = loader();
        let doc = document("Avro/1.11.3");
        let mut ctx = RenderContext::new(&mut loader, &doc, "App", dir.path());

        let err = ComposedDocumentEngine.render(&mut ctx).unwrap_err();
        assert!(matches!(err, RegistryError::SchemaFormatMismatch { .. }));
        assert!(!dir.path().join("App.json").exists());
    }
}
