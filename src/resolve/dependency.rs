//! Cross-document dependency resolution
//!
//! Builds a composed document from an entry document by discovering every
//! embedded reference to another registry location, fetching it once, and
//! merging it back at the place its URL names.
//!
//! Candidate references are string values that
//! - sit under a key ending in `uri`/`url` or containing `ref`, or are items of a sequence
//! - do not start with `#`
//! - contain a `/<group collection>/` path segment known to the model

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::fetch::{DocumentFetcher, FetchMode, Headers};
use super::reference::{has_scheme, is_http, join, strip_fragment};
use super::url_parser::{EntryType, RegistryUrl, UrlParser};
use crate::document::{deep_merge, object_entry, Document};
use crate::model::Model;

/// Collection name used when neither the URL nor the model names one
const DEFAULT_RESOURCE_COLLECTION: &str = "resources";

/// Is `key` the name of a field that may hold a reference?
pub fn is_reference_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.ends_with("uri") || lower.ends_with("url") || lower.contains("ref")
}

/// Is `value` an external reference into a known group collection?
pub fn is_registry_reference(value: &str, model: &Model) -> bool {
    !value.starts_with('#')
        && model
            .group_plurals()
            .any(|plural| value.contains(&format!("/{}/", plural)))
}

/// Collect all candidate references in document order, without duplicates
pub fn find_references(doc: &Value, model: &Model) -> Vec<String> {
    let mut found = Vec::new();
    collect_references(doc, model, &mut found);
    found
}

fn collect_references(value: &Value, model: &Model, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::String(s) => {
                        if is_reference_key(key) && is_registry_reference(s, model) {
                            push_unique(found, s);
                        }
                    }
                    other => collect_references(other, model, found),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => {
                        if is_registry_reference(s, model) {
                            push_unique(found, s);
                        }
                    }
                    other => collect_references(other, model, found),
                }
            }
        }
        _ => {}
    }
}

fn push_unique(found: &mut Vec<String>, value: &str) {
    if !found.iter().any(|f| f == value) {
        found.push(value.to_string());
    }
}

/// Turn a discovered reference into a fetchable location relative to the
/// document it was found in. Relative references only resolve against HTTP
/// registries.
fn fetch_location(reference: &str, context: &RegistryUrl) -> Option<String> {
    let reference = strip_fragment(reference);
    if has_scheme(reference) {
        return Some(reference.to_string());
    }
    if context.registry_root.is_empty() {
        return None;
    }
    join(
        &format!("{}/", context.registry_root),
        reference.trim_start_matches('/'),
    )
}

// =============================================================================
// Resolver
// =============================================================================

/// Run-scoped dependency resolution state
///
/// `resolved_resources` is a fetch cache shared by every composition in a
/// run. What ends up in a composed document is only what its own entry
/// reaches, tracked in `reached`.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    resolved_resources: IndexMap<String, Document>,
    pending_resolution: HashSet<String>,
    reached: IndexSet<String>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything from the previous run
    pub fn reset(&mut self) {
        self.resolved_resources.clear();
        self.pending_resolution.clear();
        self.reached.clear();
    }

    /// Documents resolved so far, in resolution order
    pub fn resolved_resources(&self) -> &IndexMap<String, Document> {
        &self.resolved_resources
    }

    /// Mark a location as being resolved
    pub fn mark_pending(&mut self, uri: &str) {
        self.pending_resolution.insert(uri.to_string());
    }

    pub fn is_pending(&self, uri: &str) -> bool {
        self.pending_resolution.contains(uri)
    }

    /// Locations reached from the entry of the latest composition
    pub fn reached(&self) -> &IndexSet<String> {
        &self.reached
    }

    /// Compose a self-contained document from an entry document.
    pub fn build_composed_document(
        &mut self,
        model: &Model,
        fetcher: &mut DocumentFetcher,
        entry_uri: &str,
        entry_data: &Document,
        headers: &Headers,
    ) -> Document {
        let entry = UrlParser::parse_with_model(entry_uri, model);
        let self_describing = entry_data
            .as_object()
            .map(|map| map.keys().any(|k| model.is_group_collection(k)))
            .unwrap_or(false);
        let entry_type = if self_describing {
            EntryType::Registry
        } else {
            entry.entry_type
        };
        debug!("Composing {} from {} entry", entry_uri, entry_type);

        let mut composed = seed(entry_type, &entry, entry_data);
        let entry_key = strip_fragment(entry_uri).to_string();
        self.reached.clear();

        for reference in find_references(&composed, model) {
            let Some(location) = fetch_location(&reference, &entry) else {
                debug!("Skipping relative reference {} in local document", reference);
                continue;
            };
            if location == entry_key || already_present(&composed, &location, model) {
                continue;
            }
            self.resolve_reference(model, fetcher, &location, headers);
        }

        for uri in &self.reached {
            if let Some(doc) = self.resolved_resources.get(uri) {
                merge_at_location(&mut composed, uri, doc, model);
            }
        }

        composed
    }

    /// Fetch a referenced location and, recursively, everything it references.
    ///
    /// Locations already fetched in this run come from the cache but are still
    /// walked, so their own references count as reached. Returns `None` on
    /// fetch failure or when the location is already being resolved further
    /// up the chain (a cycle).
    pub fn resolve_reference(
        &mut self,
        model: &Model,
        fetcher: &mut DocumentFetcher,
        uri: &str,
        headers: &Headers,
    ) -> Option<Document> {
        if let Some(doc) = self.resolved_resources.get(uri).cloned() {
            if self.reached.insert(uri.to_string()) {
                self.resolve_nested(model, fetcher, uri, uri, &doc, headers);
            }
            return Some(doc);
        }
        if self.pending_resolution.contains(uri) {
            warn!("Circular reference detected at {}", uri);
            return None;
        }

        self.pending_resolution.insert(uri.to_string());
        let (resolved_uri, doc) = fetcher.fetch(uri, headers, FetchMode::Reuse);

        if let Some(doc) = &doc {
            self.resolved_resources.insert(uri.to_string(), doc.clone());
            self.reached.insert(uri.to_string());
            self.resolve_nested(model, fetcher, uri, &resolved_uri, doc, headers);
        } else {
            warn!("Could not resolve reference {}", uri);
        }

        self.pending_resolution.remove(uri);
        doc
    }

    fn resolve_nested(
        &mut self,
        model: &Model,
        fetcher: &mut DocumentFetcher,
        uri: &str,
        context_uri: &str,
        doc: &Document,
        headers: &Headers,
    ) {
        let context = UrlParser::parse_with_model(context_uri, model);
        for nested in find_references(doc, model) {
            match fetch_location(&nested, &context) {
                Some(location) if location != uri => {
                    self.resolve_reference(model, fetcher, &location, headers);
                }
                _ => {}
            }
        }
    }
}

/// Place the entry document in an otherwise empty composed document
fn seed(entry_type: EntryType, entry: &RegistryUrl, entry_data: &Document) -> Document {
    match (entry_type, entry.group_type.as_deref()) {
        (EntryType::Registry, _) | (_, None) => match entry_data {
            Value::Object(_) => entry_data.clone(),
            _ => Value::Object(Map::new()),
        },
        (EntryType::GroupType, Some(group_type)) => {
            let mut root = Map::new();
            root.insert(group_type.to_string(), entry_data.clone());
            Value::Object(root)
        }
        (_, Some(group_type)) => {
            let mut groups = Map::new();
            groups.insert(
                entry.group_id.clone().unwrap_or_default(),
                entry_data.clone(),
            );
            let mut root = Map::new();
            root.insert(group_type.to_string(), Value::Object(groups));
            Value::Object(root)
        }
    }
}

/// The resource collection name for a parsed URL
fn collection_name(location: &RegistryUrl, model: &Model) -> String {
    if let Some(segment) = &location.resource_collection {
        if model.resource_by_plural(segment).is_some() {
            return segment.clone();
        }
    }
    location
        .group_type
        .as_deref()
        .and_then(|gt| model.first_resource(gt))
        .map(|r| r.plural.clone())
        .unwrap_or_else(|| DEFAULT_RESOURCE_COLLECTION.to_string())
}

/// Does the composed document already hold the location's resource?
fn already_present(composed: &Document, location: &str, model: &Model) -> bool {
    let parsed = UrlParser::parse_with_model(location, model);
    if !is_http(location) || parsed.entry_type != EntryType::Resource {
        return false;
    }
    let (Some(gt), Some(gid), Some(rid)) = (&parsed.group_type, &parsed.group_id, &parsed.resource_id) else {
        return false;
    };
    composed
        .get(gt)
        .and_then(|g| g.get(gid))
        .and_then(|g| g.get(collection_name(&parsed, model)))
        .and_then(|r| r.get(rid))
        .is_some()
}

/// Put `doc` into `slot`; if `slot` already holds a mapping, only fill what it lacks
fn fill(slot: &mut Map<String, Value>, key: &str, doc: &Value) {
    match (slot.get_mut(key), doc) {
        (None, _) => {
            slot.insert(key.to_string(), doc.clone());
        }
        (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
        (Some(_), _) => {}
    }
}

/// Fill every entry of a `{id: object}` mapping into `target`
fn fill_each(target: &mut Map<String, Value>, doc: &Value) {
    if let Value::Object(entries) = doc {
        for (id, entry) in entries {
            fill(target, id, entry);
        }
    }
}

/// Merge a resolved document at the structural location its URL names
fn merge_at_location(composed: &mut Document, uri: &str, doc: &Document, model: &Model) {
    let location = UrlParser::parse_with_model(uri, model);
    let Some(root) = composed.as_object_mut() else {
        return;
    };

    if location.entry_type == EntryType::Registry {
        if let Value::Object(groups) = doc {
            for (group_type, instances) in groups {
                if model.is_group_collection(group_type) {
                    fill_each(object_entry(root, group_type), instances);
                }
            }
        }
        return;
    }
    if location.entry_type == EntryType::Unknown {
        warn!("Cannot place {} in the composed document", uri);
        return;
    }

    let Some(group_type) = location.group_type.as_deref() else {
        return;
    };
    let groups = object_entry(root, group_type);
    let Some(group_id) = location.group_id.as_deref() else {
        fill_each(groups, doc);
        return;
    };
    if location.entry_type == EntryType::GroupInstance {
        fill(groups, group_id, doc);
        return;
    }

    let group = object_entry(groups, group_id);
    let resources = object_entry(group, &collection_name(&location, model));
    let Some(resource_id) = location.resource_id.as_deref() else {
        fill_each(resources, doc);
        return;
    };
    if location.entry_type == EntryType::Resource {
        fill(resources, resource_id, doc);
        return;
    }

    let versions = object_entry(object_entry(resources, resource_id), "versions");
    match location.version_id.as_deref() {
        Some(version_id) => fill(versions, version_id, doc),
        None => fill_each(versions, doc),
    }
}
