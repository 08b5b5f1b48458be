//! Registry URL classification
//!
//! Maps a resource URL onto the registry hierarchy:
//!
//! ```text
//! <registry root>/<group type>/<group id>/<resource collection>/<resource id>/versions/<version id>
//!        0             1           2               3                 4           5          6
//! ```
//!
//! The registry root is everything in front of the first group collection
//! segment, so registries hosted under a path prefix classify the same way as
//! registries at the host root. Local paths always classify as `Registry`.

use std::fmt;
use url::Url;

use crate::model::Model;

/// Which level of the registry hierarchy a URL addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Registry,
    GroupType,
    GroupInstance,
    ResourceCollection,
    Resource,
    VersionCollection,
    Version,
    Unknown,
}

impl EntryType {
    fn from_depth(depth: usize) -> Self {
        match depth {
            0 => EntryType::Registry,
            1 => EntryType::GroupType,
            2 => EntryType::GroupInstance,
            3 => EntryType::ResourceCollection,
            4 => EntryType::Resource,
            5 => EntryType::VersionCollection,
            6 => EntryType::Version,
            _ => EntryType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Registry => "registry",
            EntryType::GroupType => "group_type",
            EntryType::GroupInstance => "group_instance",
            EntryType::ResourceCollection => "resource_collection",
            EntryType::Resource => "resource",
            EntryType::VersionCollection => "version_collection",
            EntryType::Version => "version",
            EntryType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified registry URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryUrl {
    /// `scheme://host[:port]`, empty for local paths
    pub base_url: String,
    /// Base URL plus the path prefix in front of the group collection
    pub registry_root: String,
    /// All non-empty path segments
    pub path_segments: Vec<String>,
    pub entry_type: EntryType,
    pub group_type: Option<String>,
    pub group_id: Option<String>,
    pub resource_collection: Option<String>,
    pub resource_id: Option<String>,
    pub version_id: Option<String>,
}

impl RegistryUrl {
    fn local() -> Self {
        Self {
            base_url: String::new(),
            registry_root: String::new(),
            path_segments: Vec::new(),
            entry_type: EntryType::Registry,
            group_type: None,
            group_id: None,
            resource_collection: None,
            resource_id: None,
            version_id: None,
        }
    }
}

/// Stateless URL classifier
pub struct UrlParser;

impl UrlParser {
    /// Classify using naming conventions: a group collection segment ends in
    /// `groups` or is `endpoints`.
    pub fn parse(url: &str) -> RegistryUrl {
        Self::classify(url, |segment| {
            segment.ends_with("groups") || segment == "endpoints"
        })
    }

    /// Classify using the model's group vocabulary
    pub fn parse_with_model(url: &str, model: &Model) -> RegistryUrl {
        Self::classify(url, |segment| model.is_group_collection(segment))
    }

    fn classify(url: &str, is_group_collection: impl Fn(&str) -> bool) -> RegistryUrl {
        let Ok(parsed) = Url::parse(url) else {
            return RegistryUrl::local();
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return RegistryUrl::local();
        }

        let mut base_url = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or(""));
        if let Some(port) = parsed.port() {
            base_url.push_str(&format!(":{}", port));
        }

        let path_segments: Vec<String> = parsed
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let prefix_len = path_segments
            .iter()
            .position(|s| is_group_collection(s))
            .unwrap_or(path_segments.len());

        let mut registry_root = base_url.clone();
        for segment in &path_segments[..prefix_len] {
            registry_root.push('/');
            registry_root.push_str(segment);
        }

        let rel = &path_segments[prefix_len..];
        let at = |i: usize| rel.get(i).cloned();

        RegistryUrl {
            entry_type: EntryType::from_depth(rel.len()),
            group_type: at(0),
            group_id: at(1),
            resource_collection: at(2),
            resource_id: at(3),
            version_id: if rel.len() >= 6 { at(5) } else { None },
            base_url,
            registry_root,
            path_segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_by_depth() {
        let base = "https://example.com";
        let cases = [
            ("", EntryType::Registry),
            ("/messagegroups", EntryType::GroupType),
            ("/messagegroups/orders", EntryType::GroupInstance),
            ("/messagegroups/orders/messages", EntryType::ResourceCollection),
            ("/messagegroups/orders/messages/created", EntryType::Resource),
            ("/messagegroups/orders/messages/created/versions", EntryType::VersionCollection),
            ("/messagegroups/orders/messages/created/versions/1", EntryType::Version),
            ("/messagegroups/orders/messages/created/versions/1/extra", EntryType::Unknown),
        ];
        for (path, expected) in cases {
            let url = format!("{}{}", base, path);
            assert_eq!(UrlParser::parse(&url).entry_type, expected, "{}", url);
        }
    }

    #[test]
    fn test_registry_prefix_is_skipped() {
        let parsed = UrlParser::parse("https://example.com/registry");
        assert_eq!(parsed.entry_type, EntryType::Registry);
        assert_eq!(parsed.registry_root, "https://example.com/registry");

        let parsed = UrlParser::parse(
            "https://example.com/registry/schemagroups/mygroup/schemas/myschema/versions/v1",
        );
        assert_eq!(parsed.entry_type, EntryType::Version);
        assert_eq!(parsed.group_type.as_deref(), Some("schemagroups"));
        assert_eq!(parsed.group_id.as_deref(), Some("mygroup"));
        assert_eq!(parsed.resource_collection.as_deref(), Some("schemas"));
        assert_eq!(parsed.resource_id.as_deref(), Some("myschema"));
        assert_eq!(parsed.version_id.as_deref(), Some("v1"));
    }

    #[test]
    fn test_base_url_keeps_port() {
        let parsed = UrlParser::parse("https://example.com:8080/registry/path");
        assert_eq!(parsed.base_url, "https://example.com:8080");
        assert_eq!(parsed.path_segments, vec!["registry", "path"]);
    }

    #[test]
    fn test_local_paths_are_registry() {
        for path in [
            "defs/messagegroups/orders.json",
            "/tmp/schemagroups/x/schemas/y.json",
            "file:///tmp/messagegroups/g/messages/m",
        ] {
            let parsed = UrlParser::parse(path);
            assert_eq!(parsed.entry_type, EntryType::Registry, "{}", path);
            assert!(parsed.group_type.is_none());
        }
    }

    #[test]
    fn test_model_vocabulary() {
        let model = Model::embedded().unwrap();
        let parsed = UrlParser::parse_with_model("https://r.example.com/endpoints/ep1", &model);
        assert_eq!(parsed.entry_type, EntryType::GroupInstance);
        assert_eq!(parsed.group_id.as_deref(), Some("ep1"));

        // "widgetgroups" is not in the model vocabulary
        let parsed = UrlParser::parse_with_model("https://r.example.com/widgetgroups/w", &model);
        assert_eq!(parsed.entry_type, EntryType::Registry);
    }

    #[test]
    fn test_entry_type_display() {
        assert_eq!(EntryType::ResourceCollection.to_string(), "resource_collection");
    }
}
