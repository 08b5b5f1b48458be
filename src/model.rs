//! Registry Model
//!
//! The data-driven group/resource vocabulary. Every place that needs to know
//! collection names ("messagegroups", "schemas", ...) asks the model instead
//! of hard-coding them.
//!
//! Model sources, in order:
//! 1. An explicit location (CLI flag, `XREGISTRY_MODEL_PATH`, or config)
//! 2. The copy embedded at build time from `model/model.json`

use include_dir::{include_dir, Dir};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};

static MODEL_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/model");

// =============================================================================
// Definitions
// =============================================================================

/// A resource collection declared by a group, e.g. `messages`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDef {
    pub plural: String,
    pub singular: String,
}

/// A group type, e.g. `messagegroups`
#[derive(Debug, Clone)]
pub struct GroupDef {
    pub plural: String,
    pub singular: String,
    pub resources: Vec<ResourceDef>,
}

impl GroupDef {
    /// The attribute carrying a group instance's id, e.g. `messagegroupid`
    pub fn id_attribute(&self) -> String {
        format!("{}id", self.singular)
    }

    /// Look up one of this group's resource collections by plural name
    pub fn resource(&self, plural: &str) -> Option<&ResourceDef> {
        self.resources.iter().find(|r| r.plural == plural)
    }
}

// =============================================================================
// Model
// =============================================================================

/// The registry vocabulary
#[derive(Debug, Clone)]
pub struct Model {
    groups: Vec<GroupDef>,
    raw: Value,
}

impl Model {
    /// Build a model from a parsed model document.
    ///
    /// `groups` and each group's `resources` may be mappings keyed by plural
    /// name or sequences of definitions. Missing `plural` defaults to the key,
    /// missing `singular` to the plural without its trailing `s`.
    pub fn from_value(raw: Value) -> Result<Self> {
        let groups = match raw.get("groups") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, def)| parse_group(Some(key), def))
                .collect::<Result<Vec<_>>>()?,
            Some(Value::Array(items)) => items
                .iter()
                .map(|def| parse_group(None, def))
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(RegistryError::Model(format!(
                    "'groups' must be a mapping, found {}",
                    kind_name(other)
                )))
            }
            None => Vec::new(),
        };

        Ok(Self { groups, raw })
    }

    /// The model embedded in the binary
    pub fn embedded() -> Result<Self> {
        let file = MODEL_DIR
            .get_file("model.json")
            .ok_or_else(|| RegistryError::Model("embedded model.json missing".to_string()))?;
        let raw: Value = serde_json::from_slice(file.contents())?;
        Self::from_value(raw)
    }

    /// Load a model from a local path, a model URL, or a registry base URL.
    ///
    /// Any failure to read the location falls back to the embedded model with
    /// a warning. A model that loads but is structurally malformed is an error.
    pub fn load(location: Option<&str>) -> Result<Self> {
        let Some(location) = location else {
            debug!("Using embedded registry model");
            return Self::embedded();
        };

        match read_model(location) {
            Ok(raw) => {
                info!("Loaded registry model from {}", location);
                Self::from_value(raw)
            }
            Err(e) => {
                warn!(
                    "Failed to load model from {}: {}. Falling back to embedded model.",
                    location, e
                );
                Self::embedded()
            }
        }
    }

    /// Raw model document
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// All group definitions
    pub fn groups(&self) -> &[GroupDef] {
        &self.groups
    }

    /// Group definition by singular or plural name
    pub fn group(&self, name: &str) -> Option<&GroupDef> {
        self.groups
            .iter()
            .find(|g| g.singular == name)
            .or_else(|| self.groups.iter().find(|g| g.plural == name))
    }

    /// Is `name` a top-level group collection?
    pub fn is_group_collection(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.plural == name)
    }

    /// Plural names of all group collections
    pub fn group_plurals(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.plural.as_str())
    }

    /// Find a resource collection by plural name under any group
    pub fn resource_by_plural(&self, plural: &str) -> Option<&ResourceDef> {
        self.groups.iter().find_map(|g| g.resource(plural))
    }

    /// The first resource collection a group declares
    pub fn first_resource(&self, group_plural: &str) -> Option<&ResourceDef> {
        self.group(group_plural).and_then(|g| g.resources.first())
    }
}

fn parse_group(key: Option<&str>, def: &Value) -> Result<GroupDef> {
    let obj = def.as_object().ok_or_else(|| {
        RegistryError::Model(format!(
            "group definition {} must be a mapping",
            key.unwrap_or("<unnamed>")
        ))
    })?;

    let (plural, singular) = names(key, obj)?;

    let resources = match obj.get("resources") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, r)| parse_resource(Some(k), r))
            .collect::<Result<Vec<_>>>()?,
        Some(Value::Array(items)) => items
            .iter()
            .map(|r| parse_resource(None, r))
            .collect::<Result<Vec<_>>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(RegistryError::Model(format!(
                "'resources' of group {} must be a mapping, found {}",
                plural,
                kind_name(other)
            )))
        }
    };

    Ok(GroupDef {
        plural,
        singular,
        resources,
    })
}

fn parse_resource(key: Option<&str>, def: &Value) -> Result<ResourceDef> {
    let obj = def.as_object().ok_or_else(|| {
        RegistryError::Model(format!(
            "resource definition {} must be a mapping",
            key.unwrap_or("<unnamed>")
        ))
    })?;
    let (plural, singular) = names(key, obj)?;
    Ok(ResourceDef { plural, singular })
}

fn names(key: Option<&str>, obj: &serde_json::Map<String, Value>) -> Result<(String, String)> {
    let plural = obj
        .get("plural")
        .and_then(Value::as_str)
        .or(key)
        .ok_or_else(|| RegistryError::Model("definition without 'plural' name".to_string()))?
        .to_string();
    let singular = obj
        .get("singular")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| plural.strip_suffix('s').unwrap_or(&plural).to_string());
    Ok((plural, singular))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

fn read_model(location: &str) -> anyhow::Result<Value> {
    if let Ok(url) = url::Url::parse(location) {
        if matches!(url.scheme(), "http" | "https") {
            let path = url.path();
            // Anything that is not a .json file is treated as a registry base URL
            let target = if path.ends_with("/model") || path.ends_with(".json") {
                location.to_string()
            } else {
                format!("{}/model", location.trim_end_matches('/'))
            };
            debug!("Fetching registry model from {}", target);
            let response = ureq::get(&target)
                .timeout(Duration::from_secs(10))
                .call()?;
            return Ok(response.into_json()?);
        }
    }

    let path = Path::new(location);
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedded_model_vocabulary() {
        let model = Model::embedded().unwrap();
        let plurals: Vec<&str> = model.group_plurals().collect();
        assert!(plurals.contains(&"messagegroups"));
        assert!(plurals.contains(&"schemagroups"));
        assert!(plurals.contains(&"endpoints"));

        let schemas = model.group("schemagroup").unwrap().resource("schemas").unwrap();
        assert_eq!(schemas.singular, "schema");
        assert_eq!(model.group("endpoints").unwrap().id_attribute(), "endpointid");
    }

    #[test]
    fn test_missing_names_are_defaulted() {
        let model = Model::from_value(json!({
            "groups": {
                "widgetgroups": { "resources": { "widgets": {} } }
            }
        }))
        .unwrap();
        let group = model.group("widgetgroups").unwrap();
        assert_eq!(group.singular, "widgetgroup");
        assert_eq!(group.resources[0].singular, "widget");
        assert!(model.is_group_collection("widgetgroups"));
        assert!(!model.is_group_collection("widgets"));
    }

    #[test]
    fn test_sequence_groups_accepted() {
        let model = Model::from_value(json!({
            "groups": [
                { "plural": "things", "singular": "thing", "resources": [ { "plural": "parts" } ] }
            ]
        }))
        .unwrap();
        assert_eq!(model.first_resource("things").unwrap().singular, "part");
    }

    #[test]
    fn test_malformed_groups_is_error() {
        let err = Model::from_value(json!({ "groups": "nope" })).unwrap_err();
        assert!(matches!(err, RegistryError::Model(_)));
    }

    #[test]
    fn test_unreadable_location_falls_back() {
        let model = Model::load(Some("/definitely/not/here/model.json")).unwrap();
        assert!(model.is_group_collection("messagegroups"));
    }

    #[test]
    fn test_load_local_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"groups":{"apigroups":{"resources":{"apis":{}}}}}"#).unwrap();
        let model = Model::load(path.to_str()).unwrap();
        assert!(model.is_group_collection("apigroups"));
        assert!(!model.is_group_collection("messagegroups"));
    }
}
