//! Reference grammar
//!
//! A reference is either an intra-document fragment (`#/messagegroups/g/...`)
//! or a URL (absolute or relative) with an optional fragment. Fragments may
//! carry an explicit type name as a `:TypeName` suffix.

use url::Url;

/// A parsed reference string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Points into the current composed document
    Fragment {
        pointer: String,
        type_name: Option<String>,
    },
    /// Points at another document
    External {
        location: String,
        fragment: Option<String>,
        type_name: Option<String>,
    },
}

impl Reference {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once('#') {
            Some(("", fragment)) => {
                let (pointer, type_name) = split_type_name(fragment);
                Reference::Fragment {
                    pointer: format!("#{}", pointer),
                    type_name,
                }
            }
            Some((location, fragment)) => {
                let (fragment, type_name) = split_type_name(fragment);
                Reference::External {
                    location: location.to_string(),
                    fragment: (!fragment.is_empty()).then(|| fragment.to_string()),
                    type_name,
                }
            }
            None => Reference::External {
                location: raw.to_string(),
                fragment: None,
                type_name: None,
            },
        }
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, Reference::Fragment { .. })
    }

    /// Explicit type name from a `:TypeName` suffix
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Reference::Fragment { type_name, .. } | Reference::External { type_name, .. } => {
                type_name.as_deref()
            }
        }
    }

    /// The reference without its type-name suffix
    pub fn without_type_name(&self) -> String {
        match self {
            Reference::Fragment { pointer, .. } => pointer.clone(),
            Reference::External {
                location, fragment, ..
            } => match fragment {
                Some(f) => format!("{}#{}", location, f),
                None => location.clone(),
            },
        }
    }
}

/// Split `path:TypeName` where the suffix contains no `/`
fn split_type_name(fragment: &str) -> (&str, Option<String>) {
    match fragment.rsplit_once(':') {
        Some((path, name)) if !name.is_empty() && !name.contains('/') => {
            (path, Some(name.to_string()))
        }
        _ => (fragment, None),
    }
}

/// Does the string start with a URL scheme? Single-letter schemes are
/// treated as Windows drive letters.
pub fn has_scheme(value: &str) -> bool {
    Url::parse(value)
        .map(|u| u.scheme().len() > 1)
        .unwrap_or(false)
}

/// Is the string an `http://` or `https://` URL?
pub fn is_http(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Remove the fragment from a URI
pub fn strip_fragment(uri: &str) -> &str {
    uri.split_once('#').map(|(base, _)| base).unwrap_or(uri)
}

/// Resolve `reference` relative to `base` when `base` is a URL
pub fn join(base: &str, reference: &str) -> Option<String> {
    if has_scheme(reference) {
        return Some(reference.to_string());
    }
    Url::parse(base)
        .ok()?
        .join(reference)
        .ok()
        .map(|u| u.to_string())
}
