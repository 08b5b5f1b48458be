//! Version selection utilities
//!
//! Version ids are opaque strings. "Latest" means the greatest id after
//! right-justifying every id to a common width, so numeric-looking ids order
//! by magnitude ("10" after "2") without parsing them.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Compare two version ids padded to `width`
fn compare_padded(a: &str, b: &str, width: usize) -> Ordering {
    let pad_a = width.saturating_sub(a.chars().count());
    let pad_b = width.saturating_sub(b.chars().count());
    let left = " ".repeat(pad_a) + a;
    let right = " ".repeat(pad_b) + b;
    left.cmp(&right)
}

/// The latest id among `ids`
pub fn latest_id<'a, I>(ids: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let ids: Vec<&str> = ids.into_iter().collect();
    let width = ids.iter().map(|id| id.chars().count()).max()?;
    ids.into_iter().max_by(|a, b| compare_padded(a, b, width))
}

/// Select the version id to use from a `versions` mapping.
///
/// A `defaultversionid` naming an existing version wins; otherwise the
/// padded-lexicographic maximum is chosen.
pub fn latest_version_id<'a>(
    versions: &'a Map<String, Value>,
    default_version_id: Option<&str>,
) -> Option<&'a str> {
    if let Some(default) = default_version_id {
        if let Some((key, _)) = versions.get_key_value(default) {
            return Some(key.as_str());
        }
    }
    latest_id(versions.keys().map(String::as_str))
}

/// The latest version object of a resource, if it has versions
pub fn latest_version(resource: &Value) -> Option<(&str, &Value)> {
    let versions = resource.get("versions")?.as_object()?;
    let default = resource.get("defaultversionid").and_then(Value::as_str);
    let id = latest_version_id(versions, default)?;
    versions.get(id).map(|v| (id, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_padded_beats_naive_order() {
        let resource = json!({"versions": {"1": "A", "2": "B", "10": "C"}});
        let (id, version) = latest_version(&resource).unwrap();
        assert_eq!(id, "10");
        assert_eq!(version, &json!("C"));
    }

    #[test]
    fn test_default_version_wins_when_valid() {
        let resource = json!({"defaultversionid": "1", "versions": {"1": "A", "2": "B"}});
        assert_eq!(latest_version(&resource).unwrap().0, "1");
    }

    #[test]
    fn test_invalid_default_version_ignored() {
        let resource = json!({"defaultversionid": "9", "versions": {"1": "A", "2": "B"}});
        assert_eq!(latest_version(&resource).unwrap().0, "2");
    }

    #[test]
    fn test_no_versions() {
        assert!(latest_version(&json!({"schema": {}})).is_none());
        assert!(latest_version(&json!({"versions": {}})).is_none());
        assert!(latest_id(Vec::<&str>::new()).is_none());
    }

    #[test]
    fn test_equal_width_ids_are_lexicographic() {
        assert_eq!(latest_id(["v1", "v3", "v2"]), Some("v3"));
        assert_eq!(latest_id(["1.0", "1.10", "1.9"]), Some("1.10"));
    }
}
