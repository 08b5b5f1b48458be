//! Definitions Loader
//!
//! [`XRegistryLoader`] owns all run-scoped state (handled-set, resolved
//! resource cache, cycle guard, collected schema references) and runs the
//! loading pipeline:
//!
//! ```text
//! fetch -> normalize entry -> [compose dependencies] -> resolve payloads
//!       -> base messages -> preprocess -> filters
//! ```

use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::config::{ParsePolicy, XRegistryConfig};
use crate::document::{object_entry, Document};
use crate::error::{RegistryError, Result};
use crate::model::Model;
use crate::resolve::{
    BaseMessageResolver, DependencyResolver, DocumentFetcher, DocumentSource, FetchMode, Headers,
    ResourceResolver, StandardSource,
};

const CLOUDEVENTS_ENVELOPE: &str = "CloudEvents/1.0";

/// Options for a load call
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Return the fetched document without any processing (schema files)
    pub schema_style: bool,
    /// Keep only message groups whose id contains this string
    pub messagegroup_filter: Option<String>,
    /// Keep only endpoints whose id contains this string
    pub endpoint_filter: Option<String>,
}

impl LoadOptions {
    pub fn schema() -> Self {
        Self {
            schema_style: true,
            ..Self::default()
        }
    }

    pub fn with_messagegroup(mut self, filter: impl Into<String>) -> Self {
        self.messagegroup_filter = Some(filter.into());
        self
    }

    pub fn with_endpoint(mut self, filter: impl Into<String>) -> Self {
        self.endpoint_filter = Some(filter.into());
        self
    }
}

/// Loads and composes xRegistry definitions
pub struct XRegistryLoader {
    model: Model,
    fetcher: DocumentFetcher,
    dependencies: DependencyResolver,
    schema_references: BTreeSet<String>,
    schema_files: BTreeSet<String>,
}

impl XRegistryLoader {
    /// Loader reading from the filesystem and HTTP with default settings
    pub fn new(model: Model) -> Self {
        Self::with_source(model, Box::new(StandardSource::default()), ParsePolicy::default())
    }

    pub fn from_config(model: Model, config: &XRegistryConfig) -> Self {
        Self::with_source(
            model,
            Box::new(StandardSource::from_config(config)),
            config.loader.parse_policy,
        )
    }

    pub fn with_source(model: Model, source: Box<dyn DocumentSource>, policy: ParsePolicy) -> Self {
        Self {
            model,
            fetcher: DocumentFetcher::new(source, policy),
            dependencies: DependencyResolver::new(),
            schema_references: BTreeSet::new(),
            schema_files: BTreeSet::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load a single document with payload and inheritance resolution, but
    /// without following cross-document references.
    pub fn load(&mut self, uri: &str, headers: &Headers, options: &LoadOptions) -> Result<(String, Option<Document>)> {
        self.load_inner(uri, headers, options, false)
    }

    /// Load a document and everything it references into one composed document.
    pub fn load_with_dependencies(
        &mut self,
        uri: &str,
        headers: &Headers,
        options: &LoadOptions,
    ) -> Result<(String, Option<Document>)> {
        self.load_inner(uri, headers, options, true)
    }

    fn load_inner(
        &mut self,
        uri: &str,
        headers: &Headers,
        options: &LoadOptions,
        compose: bool,
    ) -> Result<(String, Option<Document>)> {
        let (resolved_uri, doc) = self.fetcher.fetch(uri, headers, FetchMode::Once);
        let Some(doc) = doc else {
            return Ok((resolved_uri, None));
        };
        if options.schema_style {
            return Ok((resolved_uri, Some(doc)));
        }

        let doc = self.process(&resolved_uri, doc, headers, options, compose)?;
        Ok((resolved_uri, Some(doc)))
    }

    /// Load several documents and overlay them in order.
    ///
    /// Group collections merge per group id and, inside a group, resource
    /// collections merge per resource id with later resources replacing
    /// earlier ones. Other attributes are replaced by later documents.
    pub fn load_stacked(
        &mut self,
        uris: &[String],
        headers: &Headers,
        options: &LoadOptions,
    ) -> Result<(String, Option<Document>)> {
        let mut stacked: Option<Document> = None;
        let mut last_uri = String::new();

        for uri in uris {
            let (resolved_uri, doc) = self.fetcher.fetch(uri, headers, FetchMode::Once);
            let Some(mut doc) = doc else {
                warn!("Could not load stacked document {}", uri);
                return Ok((uri.clone(), None));
            };
            if !doc.is_object() {
                return Err(invalid(&resolved_uri, "document is not a mapping"));
            }
            self.normalize_entry(&mut doc, headers);
            stacked = Some(match stacked {
                Some(mut base) => {
                    overlay(&self.model, &mut base, doc);
                    base
                }
                None => doc,
            });
            last_uri = resolved_uri;
        }

        let Some(stacked) = stacked else {
            return Ok((String::new(), None));
        };
        debug!("Stacked {} documents", uris.len());
        let doc = self.process(&last_uri, stacked, headers, options, true)?;
        Ok((last_uri, Some(doc)))
    }

    /// Fetch a schema document without processing, even if it was handled
    /// earlier in this run. External schemas are recorded as collected.
    pub fn load_schema_document(&mut self, uri: &str, headers: &Headers) -> Option<Document> {
        let (resolved_uri, doc) = self.fetcher.fetch(uri, headers, FetchMode::Reuse);
        if doc.is_some() {
            self.schema_files.insert(resolved_uri);
        }
        doc
    }

    fn process(
        &mut self,
        uri: &str,
        mut doc: Document,
        headers: &Headers,
        options: &LoadOptions,
        compose: bool,
    ) -> Result<Document> {
        if !doc.is_object() {
            return Err(invalid(uri, "document is not a mapping"));
        }

        self.normalize_entry(&mut doc, headers);
        if compose {
            doc = self.dependencies.build_composed_document(
                &self.model,
                &mut self.fetcher,
                uri,
                &doc,
                headers,
            );
        }
        ResourceResolver::new(&self.model, &mut self.fetcher).resolve_all_resources(&mut doc, headers);
        BaseMessageResolver::new(&self.model).resolve_base_messages(&mut doc);
        preprocess(&self.model, &mut doc)?;

        if let Some(filter) = &options.messagegroup_filter {
            retain_groups(&mut doc, "messagegroups", filter);
        }
        if let Some(filter) = &options.endpoint_filter {
            retain_groups(&mut doc, "endpoints", filter);
        }
        Ok(doc)
    }

    /// Turn group-level documents into registry-level ones and inline
    /// `<plural>url` collections.
    fn normalize_entry(&mut self, doc: &mut Document, headers: &Headers) {
        let Some(root) = doc.as_object_mut() else {
            return;
        };

        for group_def in self.model.groups() {
            let url_key = format!("{}url", group_def.plural);
            if root.contains_key(&group_def.plural) {
                continue;
            }
            let Some(Value::String(url)) = root.get(&url_key).cloned() else {
                continue;
            };
            root.remove(&url_key);
            let (_, sub) = self.fetcher.fetch(&url, headers, FetchMode::Reuse);
            match sub {
                Some(Value::Object(mut sub)) => {
                    // A registry-level response carries the collection as a key
                    let collection = match sub.remove(&group_def.plural) {
                        Some(inner @ Value::Object(_)) => inner,
                        _ => Value::Object(sub),
                    };
                    info!("Inlined {} from {}", group_def.plural, url);
                    root.insert(group_def.plural.clone(), collection);
                }
                _ => warn!("Could not load {} from {}", group_def.plural, url),
            }
        }

        if root.keys().any(|k| self.model.is_group_collection(k)) {
            return;
        }
        for group_def in self.model.groups() {
            if let Some(Value::String(id)) = root.get(&group_def.id_attribute()) {
                debug!("Wrapping {} document {} as registry", group_def.singular, id);
                let id = id.clone();
                let entry = std::mem::take(root);
                let mut groups = Map::new();
                groups.insert(id, Value::Object(entry));
                root.insert(group_def.plural.clone(), Value::Object(groups));
                return;
            }
        }
    }

    // =========================================================================
    // Run state
    // =========================================================================

    /// Clear all run-scoped state before a new generation run
    pub fn reset_run(&mut self) {
        self.fetcher.reset();
        self.dependencies.reset();
        self.schema_references.clear();
        self.schema_files.clear();
    }

    pub fn schemas_handled(&self) -> &HashSet<String> {
        self.fetcher.handled()
    }

    pub fn add_schema_to_handled(&mut self, uri: &str) {
        self.fetcher.mark_handled(uri);
    }

    pub fn is_schema_handled(&self, uri: &str) -> bool {
        self.fetcher.is_handled(uri)
    }

    pub fn reset_schemas_handled(&mut self) {
        self.fetcher.clear_handled();
    }

    pub fn current_url(&self) -> Option<&str> {
        self.fetcher.current_url()
    }

    pub fn set_current_url(&mut self, url: Option<String>) {
        self.fetcher.set_current_url(url);
    }

    /// Record an emitted schema reference; returns false if already recorded
    pub fn collect_schema_reference(&mut self, reference: &str) -> bool {
        self.schema_references.insert(reference.to_string())
    }

    pub fn schema_references_collected(&self) -> &BTreeSet<String> {
        &self.schema_references
    }

    /// Record an external schema document; returns false if already recorded
    pub fn collect_schema_file(&mut self, uri: &str) -> bool {
        self.schema_files.insert(uri.to_string())
    }

    pub fn schema_files_collected(&self) -> &BTreeSet<String> {
        &self.schema_files
    }
}

fn invalid(uri: &str, reason: &str) -> RegistryError {
    RegistryError::InvalidDocument {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

/// Overlay `top` onto `base` (see [`XRegistryLoader::load_stacked`])
fn overlay(model: &Model, base: &mut Document, top: Document) {
    let (Some(base), Value::Object(top)) = (base.as_object_mut(), top) else {
        return;
    };

    for (key, value) in top {
        let Some(group_def) = model.group(&key).filter(|g| g.plural == key) else {
            base.insert(key, value);
            continue;
        };
        let Value::Object(groups) = value else {
            base.insert(key, value);
            continue;
        };
        let base_groups = object_entry(base, &key);
        for (group_id, group) in groups {
            match (base_groups.get_mut(&group_id), group) {
                (Some(Value::Object(base_group)), Value::Object(group)) => {
                    for (attr, attr_value) in group {
                        match (group_def.resource(&attr), attr_value) {
                            (Some(_), Value::Object(resources)) => {
                                let base_resources = object_entry(base_group, &attr);
                                for (resource_id, resource) in resources {
                                    base_resources.insert(resource_id, resource);
                                }
                            }
                            (_, attr_value) => {
                                base_group.insert(attr, attr_value);
                            }
                        }
                    }
                }
                (_, group) => {
                    base_groups.insert(group_id, group);
                }
            }
        }
    }
}

/// Fill ids and CloudEvents envelope defaults
pub fn preprocess(model: &Model, doc: &mut Document) -> Result<()> {
    let Some(root) = doc.as_object_mut() else {
        return Ok(());
    };

    for group_def in model.groups() {
        let Some(Value::Object(groups)) = root.get_mut(&group_def.plural) else {
            continue;
        };
        for (group_id, group) in groups.iter_mut() {
            let Value::Object(group) = group else { continue };
            group
                .entry(group_def.id_attribute())
                .or_insert_with(|| Value::String(group_id.clone()));

            for resource_def in &group_def.resources {
                let Some(Value::Object(resources)) = group.get_mut(&resource_def.plural) else {
                    continue;
                };
                for (resource_id, resource) in resources.iter_mut() {
                    let Value::Object(resource) = resource else { continue };
                    resource
                        .entry(format!("{}id", resource_def.singular))
                        .or_insert_with(|| Value::String(resource_id.clone()));
                    if resource_def.singular == "message" {
                        apply_cloudevents_defaults(resource_id, resource)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Ensure CloudEvents messages declare `type` and default `id`, `time`, `source`
fn apply_cloudevents_defaults(message_id: &str, message: &mut Map<String, Value>) -> Result<()> {
    let is_cloudevents = |key: &str| {
        message
            .get(key)
            .and_then(Value::as_str)
            .map(|v| v.eq_ignore_ascii_case(CLOUDEVENTS_ENVELOPE))
            .unwrap_or(false)
    };
    let metadata_key = if is_cloudevents("envelope") {
        "envelopemetadata"
    } else if is_cloudevents("format") {
        "metadata"
    } else {
        return Ok(());
    };

    let metadata = message
        .entry(metadata_key)
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(metadata) = metadata else {
        return Err(RegistryError::InvalidDocument {
            uri: message_id.to_string(),
            reason: format!("'{}' is not a mapping", metadata_key),
        });
    };

    if !metadata.contains_key("type") {
        return Err(RegistryError::MissingMessageType {
            message: message_id.to_string(),
        });
    }
    metadata.entry("id").or_insert_with(|| {
        json!({"type": "string", "required": true, "description": "A unique identifier for the event"})
    });
    metadata.entry("time").or_insert_with(|| {
        json!({"type": "timestamp", "required": true, "description": "A ISO8601 timestamp of when the event happened"})
    });
    metadata.entry("source").or_insert_with(|| {
        json!({"type": "uritemplate", "required": true, "value": "{sourceuri}", "description": "The URI of the source of the event"})
    });
    Ok(())
}

/// Keep only the groups of `collection` whose id contains `filter`
fn retain_groups(doc: &mut Document, collection: &str, filter: &str) {
    match doc.get_mut(collection) {
        Some(Value::Object(groups)) => groups.retain(|id, _| id.contains(filter)),
        Some(_) => warn!("'{}' is not a mapping, filter ignored", collection),
        None => debug!("No '{}' to filter", collection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::fetch::testing::MemorySource;

    fn loader(source: &MemorySource) -> XRegistryLoader {
        XRegistryLoader::with_source(
            Model::embedded().unwrap(),
            Box::new(source.clone()),
            ParsePolicy::Permissive,
        )
    }

    #[test]
    fn test_preprocess_fills_ids() {
        let model = Model::embedded().unwrap();
        let mut doc = json!({
            "schemagroups": {"g": {"schemas": {"s": {}}}},
            "endpoints": {"e": {"messages": {"m": {}}}}
        });
        preprocess(&model, &mut doc).unwrap();
        assert_eq!(doc["schemagroups"]["g"]["schemagroupid"], "g");
        assert_eq!(doc["schemagroups"]["g"]["schemas"]["s"]["schemaid"], "s");
        assert_eq!(doc["endpoints"]["e"]["endpointid"], "e");
        assert_eq!(doc["endpoints"]["e"]["messages"]["m"]["messageid"], "m");
    }

    #[test]
    fn test_preprocess_cloudevents_defaults() {
        let model = Model::embedded().unwrap();
        let mut doc = json!({"messagegroups": {"g": {"messages": {
            "m": {"envelope": "CloudEvents/1.0", "envelopemetadata": {"type": {"value": "t"}}},
            "legacy": {"format": "CloudEvents/1.0", "metadata": {"type": {"value": "t"}, "source": {"value": "/s"}}}
        }}}});
        preprocess(&model, &mut doc).unwrap();
        let meta = &doc["messagegroups"]["g"]["messages"]["m"]["envelopemetadata"];
        assert_eq!(meta["source"]["value"], "{sourceuri}");
        assert!(meta.get("id").is_some());
        assert!(meta.get("time").is_some());
        let legacy = &doc["messagegroups"]["g"]["messages"]["legacy"]["metadata"];
        assert_eq!(legacy["source"]["value"], "/s");
    }

    #[test]
    fn test_preprocess_missing_type_is_error() {
        let model = Model::embedded().unwrap();
        let mut doc = json!({"messagegroups": {"g": {"messages": {
            "m": {"envelope": "CloudEvents/1.0"}
        }}}});
        let err = preprocess(&model, &mut doc).unwrap_err();
        assert!(matches!(err, RegistryError::MissingMessageType { message } if message == "m"));
    }

    #[test]
    fn test_overlay_replaces_resources_wholesale() {
        let model = Model::embedded().unwrap();
        let mut base = json!({
            "description": "base",
            "messagegroups": {"g": {
                "description": "base group",
                "messages": {"a": {"x": 1, "y": 2}, "b": {"x": 1}}
            }}
        });
        let top = json!({
            "description": "top",
            "messagegroups": {
                "g": {"messages": {"a": {"x": 9}}},
                "h": {"messages": {}}
            }
        });
        overlay(&model, &mut base, top);
        assert_eq!(base["description"], "top");
        let g = &base["messagegroups"]["g"];
        assert_eq!(g["description"], "base group");
        assert_eq!(g["messages"]["a"], json!({"x": 9}));
        assert_eq!(g["messages"]["b"], json!({"x": 1}));
        assert!(base["messagegroups"].get("h").is_some());
    }

    #[test]
    fn test_group_document_is_wrapped() {
        let source = MemorySource::new();
        source.insert("group.json", r#"{"messagegroupid": "orders", "messages": {"created": {}}}"#);
        let mut loader = loader(&source);
        let (_, doc) = loader.load("group.json", &Headers::new(), &LoadOptions::default()).unwrap();
        let doc = doc.unwrap();
        assert_eq!(doc["messagegroups"]["orders"]["messages"]["created"]["messageid"], "created");
    }

    #[test]
    fn test_plural_url_is_inlined() {
        let source = MemorySource::new();
        source.insert("root.json", r#"{"schemagroupsurl": "groups.json"}"#);
        source.insert("groups.json", r#"{"g": {"schemas": {}}}"#);
        let mut loader = loader(&source);
        let (_, doc) = loader.load("root.json", &Headers::new(), &LoadOptions::default()).unwrap();
        let doc = doc.unwrap();
        assert!(doc.get("schemagroupsurl").is_none());
        assert_eq!(doc["schemagroups"]["g"]["schemagroupid"], "g");
    }

    #[test]
    fn test_non_mapping_document_is_error() {
        let source = MemorySource::new();
        source.insert("list.json", "[1, 2]");
        let mut loader = loader(&source);
        let err = loader.load("list.json", &Headers::new(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDocument { .. }));
    }

    #[test]
    fn test_schema_style_returns_raw() {
        let source = MemorySource::new();
        source.insert("schema.avsc", r#"{"type": "record", "name": "Order"}"#);
        let mut loader = loader(&source);
        let (_, doc) = loader.load("schema.avsc", &Headers::new(), &LoadOptions::schema()).unwrap();
        assert_eq!(doc, Some(json!({"type": "record", "name": "Order"})));
    }

    #[test]
    fn test_state_accessors() {
        let source = MemorySource::new();
        let mut loader = loader(&source);
        loader.add_schema_to_handled("a.json#/x");
        assert!(loader.is_schema_handled("a.json"));
        assert!(loader.collect_schema_reference("#/schemagroups/g/schemas/s"));
        assert!(!loader.collect_schema_reference("#/schemagroups/g/schemas/s"));
        loader.set_current_url(Some("https://r.example.com/".to_string()));
        assert_eq!(loader.current_url(), Some("https://r.example.com/"));

        loader.reset_run();
        assert!(loader.schemas_handled().is_empty());
        assert!(loader.schema_references_collected().is_empty());
        assert!(loader.current_url().is_none());
    }
}
