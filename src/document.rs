//! Document helpers
//!
//! Documents are plain `serde_json::Value` trees. The xRegistry format is
//! open-ended and versioned, so shapes are checked at the few places that
//! assume them rather than modeled as structs.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::config::ParsePolicy;
use crate::error::Result;

/// A parsed xRegistry (or payload) document
pub type Document = Value;

/// Parse fetched text: JSON, then YAML, then raw text.
///
/// Under [`ParsePolicy::Permissive`] anything that is not a JSON value or a
/// YAML mapping/sequence is kept as a string document (schema payloads such
/// as `.proto` files are legitimately neither). Under [`ParsePolicy::Strict`]
/// text that fails YAML parsing is an error.
pub fn parse_text(text: &str, policy: ParsePolicy) -> Result<Document> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    match policy {
        ParsePolicy::Permissive => {
            if is_proto_text(text) {
                return Ok(Value::String(text.to_string()));
            }
            match serde_yaml::from_str::<Value>(text) {
                Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(value),
                _ => Ok(Value::String(text.to_string())),
            }
        }
        ParsePolicy::Strict => Ok(serde_yaml::from_str::<Value>(text)?),
    }
}

/// Is there nothing but whitespace in the text?
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Does the text declare `syntax = "proto3"`?
pub fn is_proto_text(text: &str) -> bool {
    static PROTO: OnceLock<Regex> = OnceLock::new();
    PROTO
        .get_or_init(|| Regex::new(r#"syntax\s*=\s*"proto3""#).unwrap())
        .is_match(text)
}

/// Is the document a Protocol Buffers text payload?
pub fn is_proto_doc(doc: &Document) -> bool {
    doc.as_str().map(is_proto_text).unwrap_or(false)
}

/// Convert a fragment (`#/a/b`, `/a/b`, or `a/b`) into a JSON pointer
pub fn fragment_pointer(fragment: &str) -> String {
    let trimmed = fragment.trim_start_matches('#');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Resolve a fragment against a document
pub fn lookup<'a>(doc: &'a Document, fragment: &str) -> Option<&'a Value> {
    doc.pointer(&fragment_pointer(fragment))
}

/// Resolve a fragment against a document, mutably
pub fn lookup_mut<'a>(doc: &'a mut Document, fragment: &str) -> Option<&'a mut Value> {
    doc.pointer_mut(&fragment_pointer(fragment))
}

/// Fill `derived` with everything from `base` it does not already define.
///
/// Where both sides hold mappings the merge recurses, so derived sub-fields
/// win while un-overridden base sub-fields are inherited. Any other collision
/// keeps the derived value.
pub fn deep_merge(derived: &mut Map<String, Value>, base: &Map<String, Value>) {
    for (key, base_value) in base {
        match derived.get_mut(key) {
            None => {
                derived.insert(key.clone(), base_value.clone());
            }
            Some(Value::Object(derived_child)) => {
                if let Value::Object(base_child) = base_value {
                    deep_merge(derived_child, base_child);
                }
            }
            Some(_) => {}
        }
    }
}

/// Get `map[key]` as a mapping, replacing a missing or non-mapping value with `{}`
pub fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just made a mapping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use serde_json::json;

    #[test]
    fn test_parse_json_first() {
        let doc = parse_text(r#"{"a": 1}"#, ParsePolicy::Permissive).unwrap();
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn test_parse_yaml_fallback() {
        let doc = parse_text("a: 1\nb:\n  - x\n", ParsePolicy::Permissive).unwrap();
        assert_eq!(doc, json!({"a": 1, "b": ["x"]}));
    }

    #[test]
    fn test_parse_proto_kept_as_text() {
        let proto = "syntax = \"proto3\";\nmessage Order {\n  string id = 1;\n}\n";
        let doc = parse_text(proto, ParsePolicy::Permissive).unwrap();
        assert_eq!(doc.as_str(), Some(proto));
        assert!(is_proto_doc(&doc));
    }

    #[test]
    fn test_strict_policy_rejects_garbage() {
        let err = parse_text("key: [unterminated", ParsePolicy::Strict).unwrap_err();
        assert!(matches!(err, RegistryError::Yaml(_)));
        assert_eq!(
            parse_text("key: [unterminated", ParsePolicy::Permissive).unwrap(),
            Value::String("key: [unterminated".to_string())
        );
    }

    #[test]
    fn test_blank_text() {
        assert!(is_blank(""));
        assert!(is_blank("  \n\t"));
        assert!(!is_blank("{}"));
    }

    #[test]
    fn test_lookup_fragment_forms() {
        let doc = json!({"messagegroups": {"g": {"messages": {"m": {"x": 1}}}}});
        assert_eq!(lookup(&doc, "#/messagegroups/g/messages/m/x"), Some(&json!(1)));
        assert_eq!(lookup(&doc, "/messagegroups/g"), doc.pointer("/messagegroups/g"));
        assert_eq!(lookup(&doc, "messagegroups/g/messages/m/x"), Some(&json!(1)));
        assert!(lookup(&doc, "#/schemagroups").is_none());
        assert_eq!(lookup(&doc, "#"), Some(&doc));
    }

    #[test]
    fn test_deep_merge_nested() {
        let mut derived = json!({
            "type": {"value": "derived.type"},
            "source": {"value": "derived.source", "required": false}
        });
        let base = json!({
            "type": {"value": "base.type", "required": true},
            "source": {"value": "base.source", "required": true},
            "subject": {"value": "base.subject"}
        });
        deep_merge(derived.as_object_mut().unwrap(), base.as_object().unwrap());
        assert_eq!(
            derived,
            json!({
                "type": {"value": "derived.type", "required": true},
                "source": {"value": "derived.source", "required": false},
                "subject": {"value": "base.subject"}
            })
        );
    }

    #[test]
    fn test_deep_merge_scalar_collision_keeps_derived() {
        let mut derived = json!({"a": "mine", "b": {"c": 1}});
        let base = json!({"a": {"nested": true}, "b": 7});
        deep_merge(derived.as_object_mut().unwrap(), base.as_object().unwrap());
        assert_eq!(derived, json!({"a": "mine", "b": {"c": 1}}));
    }

    #[test]
    fn test_object_entry_replaces_scalar() {
        let mut map = Map::new();
        map.insert("x".to_string(), json!(3));
        object_entry(&mut map, "x").insert("y".to_string(), json!(true));
        object_entry(&mut map, "z");
        assert_eq!(Value::Object(map), json!({"x": {"y": true}, "z": {}}));
    }
}
