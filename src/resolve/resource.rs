//! Resource payload resolution
//!
//! A version (or a version-less resource) carries its payload in one of
//! several forms. Resolution populates the canonical field named after the
//! resource's singular form, trying sources in this order:
//!
//! 1. `<singular>` (already inline)
//! 2. `resource` (legacy inline)
//! 3. `<singular>url`
//! 4. `resourceurl` (legacy)
//! 5. `<singular>base64`
//! 6. `resourcebase64` (legacy)

use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::fetch::{DocumentFetcher, FetchMode, Headers};
use crate::config::ParsePolicy;
use crate::document::{parse_text, Document};
use crate::model::Model;

/// Where a payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadSource {
    Inline,
    Url,
    Base64,
}

pub struct ResourceResolver<'a> {
    model: &'a Model,
    fetcher: &'a mut DocumentFetcher,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(model: &'a Model, fetcher: &'a mut DocumentFetcher) -> Self {
        Self { model, fetcher }
    }

    /// Populate `entity[singular]` from the first available source.
    ///
    /// Returns whether the canonical field is populated afterwards. A second
    /// call on the same entity is a no-op.
    pub fn resolve_resource(
        &mut self,
        entity: &mut Map<String, Value>,
        headers: &Headers,
        singular: &str,
    ) -> bool {
        if entity.contains_key(singular) {
            return true;
        }

        let candidates = [
            (singular.to_string(), PayloadSource::Inline),
            ("resource".to_string(), PayloadSource::Inline),
            (format!("{}url", singular), PayloadSource::Url),
            ("resourceurl".to_string(), PayloadSource::Url),
            (format!("{}base64", singular), PayloadSource::Base64),
            ("resourcebase64".to_string(), PayloadSource::Base64),
        ];

        let Some((field, source)) = candidates
            .into_iter()
            .find(|(field, _)| entity.contains_key(field))
        else {
            return false;
        };

        let payload = match (source, &entity[&field]) {
            (PayloadSource::Inline, value) => Some(value.clone()),
            (PayloadSource::Url, Value::String(url)) => {
                let url = url.clone();
                let (_, doc) = self.fetcher.fetch(&url, headers, FetchMode::Reuse);
                if doc.is_none() {
                    warn!("Could not load {} from {}", singular, url);
                }
                doc
            }
            (PayloadSource::Base64, Value::String(encoded)) => decode_payload(encoded, &field),
            (_, other) => {
                warn!("Field '{}' must be a string, found {}", field, other);
                None
            }
        };

        match payload {
            Some(value) => {
                debug!("Resolved '{}' from '{}'", singular, field);
                entity.insert(singular.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Resolve every resource payload in the document.
    ///
    /// Walks group collections, group instances, and the resource
    /// collections the model declares for each group type. Resources with a
    /// `versions` mapping have each version resolved; others are resolved
    /// directly.
    pub fn resolve_all_resources(&mut self, document: &mut Document, headers: &Headers) {
        let model = self.model;
        let Some(root) = document.as_object_mut() else {
            return;
        };

        for group_def in model.groups() {
            let Some(Value::Object(groups)) = root.get_mut(&group_def.plural) else {
                continue;
            };
            for group in groups.values_mut() {
                let Value::Object(group) = group else { continue };
                for resource_def in &group_def.resources {
                    let Some(Value::Object(resources)) = group.get_mut(&resource_def.plural) else {
                        continue;
                    };
                    for resource in resources.values_mut() {
                        let Value::Object(resource) = resource else { continue };
                        match resource.get_mut("versions") {
                            Some(Value::Object(versions)) => {
                                for version in versions.values_mut() {
                                    if let Value::Object(version) = version {
                                        self.resolve_resource(version, headers, &resource_def.singular);
                                    }
                                }
                            }
                            _ => {
                                self.resolve_resource(resource, headers, &resource_def.singular);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// base64 -> UTF-8 -> JSON / YAML / text
fn decode_payload(encoded: &str, field: &str) -> Option<Value> {
    let bytes = match general_purpose::STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Invalid base64 in '{}': {}", field, e);
            return None;
        }
    };
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("Decoded '{}' is not UTF-8: {}", field, e);
            return None;
        }
    };
    parse_text(&text, ParsePolicy::Permissive).ok()
}
