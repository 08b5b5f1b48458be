//! Schema type resolution
//!
//! Turns a schema reference from a message definition into the qualified
//! class name a template engine emits for it. Unlike the loading pipeline,
//! every inconsistency here is a hard error: the definitions file names a
//! type that does not exist in the form it claims.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

use super::names::NameTransforms;
use crate::document::{fragment_pointer, lookup, Document};
use crate::error::{RegistryError, Result};
use crate::loader::XRegistryLoader;
use crate::resolve::{Headers, Reference};
use crate::version::latest_version;

fn proto_message() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"message\s+(\w+)\s*\{").unwrap())
}

/// Resolve `reference` to `<project_name>.<ClassName>`.
///
/// `reference` is a fragment into `root` or a URL (optionally with a
/// fragment), either with an optional `:ClassName` suffix. The referenced
/// schema's latest version must declare `schema_format`.
pub fn schema_type(
    loader: &mut XRegistryLoader,
    reference: &str,
    project_name: &str,
    root: &Document,
    schema_format: &str,
) -> Result<String> {
    debug!("Resolving schema type for {}", reference);
    let parsed = Reference::parse(reference);
    let mut class_name = parsed.type_name().unwrap_or_default().to_string();
    let explicit = !class_name.is_empty();

    let (schema_ref, schema_obj) = match &parsed {
        Reference::Fragment { pointer, .. } => {
            loader.collect_schema_reference(pointer);
            let obj = lookup(root, pointer)
                .filter(|v| v.is_object() || v.is_array() || v.is_string())
                .cloned()
                .ok_or_else(|| RegistryError::schema_reference(reference, "schema not found"))?;
            (pointer.clone(), obj)
        }
        Reference::External {
            location, fragment, ..
        } => {
            let doc = loader
                .load_schema_document(location, &Headers::new())
                .ok_or_else(|| RegistryError::schema_reference(reference, "document could not be loaded"))?;
            let obj = match fragment {
                Some(fragment) => lookup(&doc, fragment)
                    .cloned()
                    .ok_or_else(|| RegistryError::schema_reference(reference, "fragment not found"))?,
                None => doc,
            };
            (parsed.without_type_name(), obj)
        }
    };

    let path = path_segments(&schema_ref);
    let schema_version = if let Some((_, version)) = latest_version(&schema_obj) {
        if class_name.is_empty() {
            class_name = schema_obj
                .get("schemaid")
                .or_else(|| schema_obj.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| resource_id(&path))
                .unwrap_or_default();
        }
        version.clone()
    } else if schema_obj.is_object() {
        if class_name.is_empty() {
            class_name = resource_id(&path).unwrap_or_default();
        }
        schema_obj.clone()
    } else {
        return Err(RegistryError::schema_reference(reference, "schema version not found"));
    };

    if parsed.is_fragment() && !explicit {
        if let Some(prefix) = group_id(root, &path) {
            if !class_name.starts_with(&prefix) {
                class_name = format!("{}.{}", prefix, class_name);
            }
        }
    }

    let declared = schema_version
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !declared.eq_ignore_ascii_case(schema_format) {
        return Err(RegistryError::SchemaFormatMismatch {
            expected: schema_format.to_string(),
            found: declared.to_string(),
        });
    }
    let family = declared
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let payload = if let Some(url) = schema_version.get("schemaurl").and_then(Value::as_str) {
        loader
            .load_schema_document(url, &Headers::new())
            .ok_or_else(|| RegistryError::schema_reference(url, "schema not found"))?
    } else if let Some(schema) = schema_version.get("schema") {
        schema.clone()
    } else {
        return Err(RegistryError::schema_reference(reference, "version has no schema"));
    };

    if family.starts_with("avro") {
        avro_type(&payload, &class_name, project_name, reference)
    } else if family.starts_with("proto") {
        proto_type(&payload, &class_name, project_name, reference)
    } else if !class_name.is_empty() {
        Ok(format!("{}.{}", project_name, class_name))
    } else {
        let n = path.len();
        let name = if n >= 3 && path[n - 2] == "versions" {
            &path[n - 3]
        } else {
            path.last()
                .ok_or_else(|| RegistryError::schema_reference(reference, "no type name"))?
        };
        Ok(name.clone())
    }
}

fn avro_type(payload: &Value, class_name: &str, project_name: &str, reference: &str) -> Result<String> {
    let record_name = |record: &Value| -> Option<String> {
        if record.get("type").and_then(Value::as_str) != Some("record") {
            return None;
        }
        let name = record.get("name").and_then(Value::as_str)?;
        Some(match record.get("namespace").and_then(Value::as_str) {
            Some(ns) if !ns.is_empty() => format!("{}.{}", ns, name),
            _ => name.to_string(),
        })
    };

    match payload {
        Value::Object(_) => {
            let full = record_name(payload).ok_or_else(|| {
                RegistryError::schema_reference(reference, "Avro: top-level record not found")
            })?;
            if !class_name.is_empty() && !full.eq_ignore_ascii_case(class_name) {
                return Err(RegistryError::schema_reference(
                    reference,
                    format!("Avro: class name mismatch for top-level record: {} != {}", full, class_name),
                ));
            }
            Ok(format!("{}.{}", project_name, full))
        }
        Value::Array(records) => {
            if class_name.is_empty() {
                return Err(RegistryError::schema_reference(
                    reference,
                    "Avro: explicit ':ClassName' suffix required for a top-level union",
                ));
            }
            records
                .iter()
                .filter_map(record_name)
                .find(|full| full == class_name)
                .map(|full| format!("{}.{}", project_name, full))
                .ok_or_else(|| {
                    RegistryError::schema_reference(
                        reference,
                        format!("Avro: record {} not found in union", class_name),
                    )
                })
        }
        _ => Err(RegistryError::schema_reference(reference, "Avro: top-level record not found")),
    }
}

fn proto_type(payload: &Value, class_name: &str, project_name: &str, reference: &str) -> Result<String> {
    let text = payload.as_str().ok_or_else(|| {
        RegistryError::schema_reference(reference, "Proto: schema is not proto text")
    })?;
    let first = proto_message()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    let Some(message) = first else {
        return Err(RegistryError::schema_reference(
            reference,
            format!("Proto: top-level message {} not found", class_name),
        ));
    };
    if class_name.is_empty() {
        return Ok(format!("{}.{}", project_name, message));
    }

    let names = NameTransforms::default();
    if message.eq_ignore_ascii_case(&names.strip_namespace(class_name)) {
        Ok(format!("{}.{}", project_name, class_name))
    } else {
        Ok(format!("{}.{}{}", project_name, names.namespace_dot(class_name, ""), message))
    }
}

fn path_segments(schema_ref: &str) -> Vec<String> {
    let pointer = match schema_ref.split_once('#') {
        Some((_, fragment)) => fragment_pointer(fragment),
        None => Url::parse(schema_ref)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| schema_ref.to_string()),
    };
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// `<gt>/<gid>/<rc>/<rid>[/versions/<vid>]` -> `rid`
fn resource_id(path: &[String]) -> Option<String> {
    path.get(3).cloned()
}

/// Id of the group a fragment path points into
fn group_id(root: &Document, path: &[String]) -> Option<String> {
    let (group_type, id) = (path.first()?, path.get(1)?);
    let group = root.get(group_type)?.get(id)?;
    let singular_id = group_type
        .strip_suffix('s')
        .map(|s| format!("{}id", s))
        .unwrap_or_default();
    Some(
        group
            .get(&singular_id)
            .or_else(|| group.get("id"))
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string(),
    )
}
