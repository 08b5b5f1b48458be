//! Definitions Linting
//!
//! Structural checks on a composed xRegistry document, run by `validate`
//! after loading.
//!
//! ## Lints
//! 1. **Shape**: group collections, groups, resource collections and
//!    resources must be mappings
//! 2. **Versions**: `defaultversionid` must name an existing version
//! 3. **References**: `#/` fragment references must resolve in the document
//! 4. **Vocabulary**: `*groups` collections the model does not know (warning)

use serde_json::{Map, Value};

use crate::document::{lookup, Document};
use crate::model::{GroupDef, Model};
use crate::resolve::dependency::is_reference_key;
use crate::resolve::Reference;

/// Result of linting a document
#[derive(Debug, Default)]
pub struct LintResult {
    pub source: String,
    pub errors: Vec<LintError>,
    pub warnings: Vec<LintWarning>,
}

impl LintResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn error(&mut self, code: &'static str, path: &str, message: String) {
        self.errors.push(LintError {
            code,
            message,
            path: path.to_string(),
        });
    }

    fn warning(&mut self, code: &'static str, path: &str, message: String) {
        self.warnings.push(LintWarning {
            code,
            message,
            path: path.to_string(),
        });
    }
}

#[derive(Debug)]
pub struct LintError {
    pub code: &'static str,
    pub message: String,
    pub path: String,
}

#[derive(Debug)]
pub struct LintWarning {
    pub code: &'static str,
    pub message: String,
    pub path: String,
}

/// The definitions linter
pub struct DocumentLinter<'a> {
    model: &'a Model,
}

impl<'a> DocumentLinter<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    pub fn lint(&self, source: &str, doc: &Document) -> LintResult {
        let mut result = LintResult {
            source: source.to_string(),
            ..Default::default()
        };

        let Some(root) = doc.as_object() else {
            result.error("not-a-mapping", "", "document root is not a mapping".to_string());
            return result;
        };

        for (key, value) in root {
            match self.model.group(key).filter(|g| &g.plural == key) {
                Some(group_def) => self.lint_collection(group_def, value, key, &mut result),
                None if key.ends_with("groups") && value.is_object() => result.warning(
                    "unknown-collection",
                    key,
                    format!("'{}' is not a group collection of the registry model", key),
                ),
                None => {}
            }
        }

        self.lint_references(doc, doc, "", &mut result);
        result
    }

    fn lint_collection(&self, group_def: &GroupDef, value: &Value, path: &str, result: &mut LintResult) {
        let Some(groups) = value.as_object() else {
            result.error(
                "collection-not-mapping",
                path,
                format!("'{}' must be a mapping of group id to group", group_def.plural),
            );
            return;
        };

        for (group_id, group) in groups {
            let group_path = format!("{}.{}", path, group_id);
            let Some(group) = group.as_object() else {
                result.error(
                    "group-not-mapping",
                    &group_path,
                    format!("{} '{}' is not a mapping", group_def.singular, group_id),
                );
                continue;
            };

            for resource_def in &group_def.resources {
                let Some(resources) = group.get(&resource_def.plural) else {
                    continue;
                };
                let collection_path = format!("{}.{}", group_path, resource_def.plural);
                let Some(resources) = resources.as_object() else {
                    result.error(
                        "collection-not-mapping",
                        &collection_path,
                        format!("'{}' must be a mapping of id to {}", resource_def.plural, resource_def.singular),
                    );
                    continue;
                };
                for (resource_id, resource) in resources {
                    let resource_path = format!("{}.{}", collection_path, resource_id);
                    match resource.as_object() {
                        Some(resource) => lint_versions(resource, &resource_path, result),
                        None => result.error(
                            "resource-not-mapping",
                            &resource_path,
                            format!("{} '{}' is not a mapping", resource_def.singular, resource_id),
                        ),
                    }
                }
            }
        }
    }

    fn lint_references(&self, root: &Document, value: &Value, path: &str, result: &mut LintResult) {
        match value {
            Value::Object(map) => {
                for (key, val) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    if let Value::String(s) = val {
                        if is_reference_key(key) && s.starts_with('#') {
                            check_fragment(root, s, &child_path, result);
                        }
                        continue;
                    }
                    self.lint_references(root, val, &child_path, result);
                }
            }
            Value::Array(arr) => {
                for (i, val) in arr.iter().enumerate() {
                    self.lint_references(root, val, &format!("{}[{}]", path, i), result);
                }
            }
            _ => {}
        }
    }
}

fn lint_versions(resource: &Map<String, Value>, path: &str, result: &mut LintResult) {
    let versions = match resource.get("versions") {
        None => None,
        Some(Value::Object(versions)) => Some(versions),
        Some(_) => {
            result.error("versions-not-mapping", path, "'versions' must be a mapping".to_string());
            return;
        }
    };

    let Some(default) = resource.get("defaultversionid").and_then(Value::as_str) else {
        return;
    };
    match versions {
        Some(versions) if versions.contains_key(default) => {}
        Some(_) => result.error(
            "unknown-default-version",
            path,
            format!("defaultversionid '{}' names no existing version", default),
        ),
        None => result.warning(
            "unknown-default-version",
            path,
            format!("defaultversionid '{}' set but resource has no versions", default),
        ),
    }
}

fn check_fragment(root: &Document, reference: &str, path: &str, result: &mut LintResult) {
    let pointer = Reference::parse(reference).without_type_name();
    if lookup(root, &pointer).is_none() {
        result.error(
            "unresolved-reference",
            path,
            format!("reference '{}' does not resolve in this document", reference),
        );
    }
}

/// Lint a composed document against the registry model
pub fn lint_document(model: &Model, source: &str, doc: &Document) -> LintResult {
    DocumentLinter::new(model).lint(source, doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lint(doc: Value) -> LintResult {
        let model = Model::embedded().unwrap();
        lint_document(&model, "test", &doc)
    }

    #[test]
    fn test_valid_document() {
        let result = lint(json!({
            "messagegroups": {"g": {"messages": {"m": {
                "dataschemauri": "#/schemagroups/s/schemas/Order:Contoso.Order"
            }}}},
            "schemagroups": {"s": {"schemas": {"Order": {
                "defaultversionid": "1",
                "versions": {"1": {"format": "JsonSchema/draft-07"}}
            }}}}
        }));
        assert!(result.is_clean(), "{:?}", result.errors);
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_collection_must_be_mapping() {
        let result = lint(json!({"messagegroups": ["g"]}));
        assert_eq!(result.errors[0].code, "collection-not-mapping");
        assert_eq!(result.errors[0].path, "messagegroups");
    }

    #[test]
    fn test_group_and_resource_must_be_mappings() {
        let result = lint(json!({
            "messagegroups": {"g": "nope", "h": {"messages": {"m": 1}}}
        }));
        let codes: Vec<_> = result.errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&"group-not-mapping"));
        assert!(codes.contains(&"resource-not-mapping"));
    }

    #[test]
    fn test_unknown_default_version() {
        let result = lint(json!({
            "schemagroups": {"s": {"schemas": {"Order": {
                "defaultversionid": "3",
                "versions": {"1": {}, "2": {}}
            }}}}
        }));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "unknown-default-version");
        assert_eq!(result.errors[0].path, "schemagroups.s.schemas.Order");
    }

    #[test]
    fn test_unresolved_fragment_reference() {
        let result = lint(json!({
            "messagegroups": {"g": {"messages": {"m": {
                "dataschemauri": "#/schemagroups/missing/schemas/x"
            }}}}
        }));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "unresolved-reference");
        assert_eq!(result.errors[0].path, "messagegroups.g.messages.m.dataschemauri");
    }

    #[test]
    fn test_unknown_collection_warns() {
        let result = lint(json!({"widgetgroups": {}}));
        assert!(result.is_clean());
        assert_eq!(result.warnings[0].code, "unknown-collection");
    }
}
