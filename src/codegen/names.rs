//! Naming Transforms
//!
//! Case conversions and namespace helpers exposed to template engines.
//! Dotted (`a.b`) and path (`a::b`) names are converted part by part.

use regex::Regex;
use std::sync::OnceLock;

use super::config::NamingConfig;

// =============================================================================
// Word splitting
// =============================================================================

fn upper_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z][a-z0-9_]*").unwrap())
}

fn mixed_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9]+|[A-Z][a-z0-9_]*").unwrap())
}

/// Split an identifier into words: on `_` if present, otherwise on case changes
fn words(s: &str) -> Vec<&str> {
    if s.contains('_') {
        return s.split('_').collect();
    }
    let re = if s.starts_with(|c: char| c.is_ascii_uppercase()) {
        upper_words()
    } else {
        mixed_words()
    };
    re.find_iter(s).map(|m| m.as_str()).collect()
}

/// Apply `f` to each part of a `::` path or dotted name
fn per_part(s: &str, f: &dyn Fn(&str) -> String) -> String {
    if let Some((head, rest)) = s.split_once("::") {
        let tail: Vec<String> = rest.split("::").map(|p| per_part(p, f)).collect();
        return format!("{}::{}", head, tail.join("::"));
    }
    if s.contains('.') {
        return s.split('.').map(|p| f(p)).collect::<Vec<_>>().join(".");
    }
    f(s)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => {
            let mut result = first.to_uppercase().to_string();
            for c in chars {
                result.push(c.to_ascii_lowercase());
            }
            result
        }
    }
}

// =============================================================================
// Transforms
// =============================================================================

/// Naming-convention transforms
#[derive(Debug, Clone, Default)]
pub struct NameTransforms {
    naming_config: NamingConfig,
}

impl NameTransforms {
    pub fn new(naming_config: NamingConfig) -> Self {
        Self { naming_config }
    }

    /// Apply casing to a word, preserving acronyms
    fn case_word(&self, word: &str) -> String {
        let upper = word.to_uppercase();
        if self.naming_config.acronyms.contains(&upper) {
            return upper;
        }
        capitalize(word)
    }

    pub fn pascal(&self, s: &str) -> String {
        per_part(s, &|part| words(part).iter().map(|w| self.case_word(w)).collect())
    }

    pub fn camel(&self, s: &str) -> String {
        per_part(s, &|part| {
            if part.is_empty() {
                return String::new();
            }
            let parts: Vec<&str> = if part.contains('_') {
                part.split('_').collect()
            } else if part.starts_with(|c: char| c.is_ascii_uppercase()) {
                split_before_upper(part)
            } else {
                return part.to_string();
            };
            let mut out = parts[0].to_lowercase();
            for w in &parts[1..] {
                out.push_str(&capitalize(w));
            }
            out
        })
    }

    pub fn snake(&self, s: &str) -> String {
        per_part(s, &|part| {
            let mut out = String::with_capacity(part.len() + 4);
            for (i, c) in part.chars().enumerate() {
                if i > 0 && c.is_ascii_uppercase() {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            }
            out
        })
    }

    /// `a.b.C` -> `C`
    pub fn strip_namespace(&self, class_reference: &str) -> String {
        class_reference
            .rsplit_once('.')
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| class_reference.to_string())
    }

    /// `a.b.C` -> `prefix.a.b`
    pub fn namespace(&self, class_reference: &str, prefix: &str) -> String {
        if class_reference.is_empty() {
            return String::new();
        }
        match class_reference.rsplit_once('.') {
            Some((ns, _)) => self.concat_namespace(ns, prefix),
            None => prefix.to_string(),
        }
    }

    /// Namespace followed by a dot, or empty
    pub fn namespace_dot(&self, class_reference: &str, prefix: &str) -> String {
        let ns = self.namespace(class_reference, prefix);
        if ns.is_empty() {
            ns
        } else {
            ns + "."
        }
    }

    pub fn concat_namespace(&self, class_reference: &str, prefix: &str) -> String {
        match (prefix.is_empty(), class_reference.is_empty()) {
            (true, _) => class_reference.to_string(),
            (false, true) => prefix.to_string(),
            (false, false) => format!("{}.{}", prefix, class_reference),
        }
    }

    /// `a.b.C` -> `abC`
    pub fn strip_dots(&self, class_reference: &str) -> String {
        class_reference.replace('.', "")
    }
}

/// Split before every upper-case letter: `OrderCreated` -> [`Order`, `Created`]
fn split_before_upper(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices().skip(1) {
        if c.is_ascii_uppercase() {
            parts.push(&s[start..i]);
            start = i;
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_case() {
        let names = NameTransforms::default();
        assert_eq!(names.pascal("order_created"), "OrderCreated");
        assert_eq!(names.pascal("orderCreated"), "OrderCreated");
        assert_eq!(names.pascal("OrderCreated"), "OrderCreated");
        assert_eq!(names.pascal("contoso.orders.order_created"), "Contoso.Orders.OrderCreated");
        assert_eq!(names.pascal("crate::order_created"), "crate::OrderCreated");
    }

    #[test]
    fn test_pascal_preserves_acronyms() {
        let names = NameTransforms::new(NamingConfig::with_common_acronyms());
        assert_eq!(names.pascal("user_id"), "UserID");
        assert_eq!(names.pascal("api_url"), "APIURL");
        assert_eq!(NameTransforms::default().pascal("user_id"), "UserId");
    }

    #[test]
    fn test_camel_case() {
        let names = NameTransforms::default();
        assert_eq!(names.camel("OrderCreated"), "orderCreated");
        assert_eq!(names.camel("order_created"), "orderCreated");
        assert_eq!(names.camel("alreadyCamel"), "alreadyCamel");
        assert_eq!(names.camel("A.OrderCreated"), "a.orderCreated");
    }

    #[test]
    fn test_snake_case() {
        let names = NameTransforms::default();
        assert_eq!(names.snake("OrderCreated"), "order_created");
        assert_eq!(names.snake("orderCreated"), "order_created");
        assert_eq!(names.snake("Contoso.OrderCreated"), "contoso.order_created");
    }

    #[test]
    fn test_namespace_helpers() {
        let names = NameTransforms::default();
        assert_eq!(names.strip_namespace("Contoso.Orders.Created"), "Created");
        assert_eq!(names.strip_namespace("Created"), "Created");
        assert_eq!(names.namespace("Contoso.Orders.Created", ""), "Contoso.Orders");
        assert_eq!(names.namespace("Contoso.Orders.Created", "App"), "App.Contoso.Orders");
        assert_eq!(names.namespace("Created", "App"), "App");
        assert_eq!(names.namespace_dot("Contoso.Created", ""), "Contoso.");
        assert_eq!(names.namespace_dot("Created", ""), "");
        assert_eq!(names.strip_dots("Contoso.Orders"), "ContosoOrders");
    }
}
