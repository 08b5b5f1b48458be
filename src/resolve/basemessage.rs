//! Base message inheritance
//!
//! A message may name a base message through `basemessageurl`. The derived
//! message inherits every field it does not define itself, recursively for
//! nested mappings. Chains resolve from the root ancestor down. Messages that
//! take part in an inheritance cycle are left as they are.
//!
//! `basemessageurl` is removed from every message once this pass has run.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use url::Url;

use super::reference::Reference;
use crate::document::{deep_merge, fragment_pointer, lookup, lookup_mut, Document};
use crate::model::Model;
use crate::version::latest_version;

const BASE_MESSAGE_ATTRIBUTE: &str = "basemessageurl";
const MESSAGE_COLLECTION: &str = "messages";

pub struct BaseMessageResolver<'a> {
    model: &'a Model,
}

impl<'a> BaseMessageResolver<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    /// Merge every message with its base chain, in place
    pub fn resolve_base_messages(&self, document: &mut Document) {
        let messages = self.message_pointers(document);
        if messages.is_empty() {
            return;
        }

        let snapshot = document.clone();
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        for pointer in &messages {
            nodes.insert(pointer.clone(), graph.add_node(pointer.clone()));
        }

        let mut bases: HashMap<NodeIndex, String> = HashMap::new();
        for pointer in &messages {
            let Some(raw) = lookup(&snapshot, pointer)
                .and_then(|m| m.get(BASE_MESSAGE_ATTRIBUTE))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(base) = self.base_pointer(&snapshot, raw) else {
                debug!("Ignoring unusable base reference {} on {}", raw, pointer);
                continue;
            };
            let from = nodes[pointer];
            if let Some(&to) = nodes.get(&base) {
                graph.add_edge(from, to, ());
            }
            bases.insert(from, base);
        }

        let mut cyclic: HashSet<NodeIndex> = HashSet::new();
        for scc in kosaraju_scc(&graph) {
            if scc.len() > 1 || scc.iter().any(|&n| graph.contains_edge(n, n)) {
                warn!(
                    "Circular base message chain: {}",
                    scc.iter().map(|&n| graph[n].as_str()).collect::<Vec<_>>().join(" -> ")
                );
                cyclic.extend(scc);
            }
        }

        let mut chain = Chain {
            snapshot: &snapshot,
            graph: &graph,
            nodes: &nodes,
            bases: &bases,
            cyclic: &cyclic,
            resolved: HashMap::new(),
        };
        for &node in nodes.values() {
            chain.resolve(node);
        }

        for (node, mut message) in chain.resolved {
            message.remove(BASE_MESSAGE_ATTRIBUTE);
            if let Some(slot) = lookup_mut(document, &graph[node]) {
                *slot = Value::Object(message);
            }
        }
    }

    /// JSON pointers of every message in every group that has a messages collection
    fn message_pointers(&self, document: &Document) -> Vec<String> {
        let mut pointers = Vec::new();
        for group_def in self.model.groups() {
            if group_def.resource(MESSAGE_COLLECTION).is_none() {
                continue;
            }
            let Some(Value::Object(groups)) = document.get(&group_def.plural) else {
                continue;
            };
            for (group_id, group) in groups {
                let Some(Value::Object(messages)) = group.get(MESSAGE_COLLECTION) else {
                    continue;
                };
                for (message_id, message) in messages {
                    if message.is_object() {
                        pointers.push(format!(
                            "/{}/{}/{}/{}",
                            escape(&group_def.plural),
                            escape(group_id),
                            MESSAGE_COLLECTION,
                            escape(message_id)
                        ));
                    }
                }
            }
        }
        pointers
    }

    /// Normalize a base reference to a JSON pointer into the composed document.
    ///
    /// A fragment is taken whole when it resolves, since message ids may
    /// themselves contain `:`. Otherwise a trailing `:TypeName` is dropped.
    fn base_pointer(&self, snapshot: &Document, raw: &str) -> Option<String> {
        if let Some((_, fragment)) = raw.trim().split_once('#') {
            let whole = fragment_pointer(fragment);
            if lookup(snapshot, &whole).is_some() {
                return Some(whole);
            }
        }

        let reference = Reference::parse(raw);
        match &reference {
            Reference::Fragment { pointer, .. } => Some(fragment_pointer(pointer)),
            Reference::External {
                location, fragment, ..
            } => {
                if let Some(fragment) = fragment {
                    return Some(fragment_pointer(fragment));
                }
                let path = match Url::parse(location) {
                    Ok(url) => url.path().to_string(),
                    Err(_) => location.clone(),
                };
                let segments: Vec<String> = path
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
                    .collect();
                let start = segments
                    .iter()
                    .position(|s| self.model.is_group_collection(s))?;
                let pointer: Vec<String> = segments[start..].iter().map(|s| escape(s)).collect();
                Some(format!("/{}", pointer.join("/")))
            }
        }
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Memoized walk over the inheritance graph
struct Chain<'s> {
    snapshot: &'s Document,
    graph: &'s DiGraph<String, ()>,
    nodes: &'s HashMap<String, NodeIndex>,
    bases: &'s HashMap<NodeIndex, String>,
    cyclic: &'s HashSet<NodeIndex>,
    resolved: HashMap<NodeIndex, Map<String, Value>>,
}

impl Chain<'_> {
    fn resolve(&mut self, node: NodeIndex) -> Map<String, Value> {
        if let Some(done) = self.resolved.get(&node) {
            return done.clone();
        }

        let mut message = lookup(self.snapshot, &self.graph[node])
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if !self.cyclic.contains(&node) {
            if let Some(base_pointer) = self.bases.get(&node) {
                match self.base_of(base_pointer) {
                    Some(base) => {
                        debug!("{} inherits from {}", self.graph[node], base_pointer);
                        deep_merge(&mut message, &base);
                    }
                    None => debug!("Base message {} not found", base_pointer),
                }
            }
        }

        message.remove(BASE_MESSAGE_ATTRIBUTE);
        self.resolved.insert(node, message.clone());
        message
    }

    /// The fully resolved base at `pointer`, minus identity attributes
    fn base_of(&mut self, pointer: &str) -> Option<Map<String, Value>> {
        let base = match self.nodes.get(pointer) {
            Some(&base_node) => Value::Object(self.resolve(base_node)),
            None => lookup(self.snapshot, pointer)?.clone(),
        };

        let mut base = match latest_version(&base) {
            Some((_, version)) => version.as_object()?.clone(),
            None => base.as_object()?.clone(),
        };
        base.remove(BASE_MESSAGE_ATTRIBUTE);
        base.remove("messageid");
        Some(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(mut doc: Value) -> Value {
        let model = Model::embedded().unwrap();
        BaseMessageResolver::new(&model).resolve_base_messages(&mut doc);
        doc
    }

    #[test]
    fn test_simple_inheritance() {
        let doc = resolve(json!({
            "messagegroups": {"g": {"messages": {
                "Base": {
                    "messageid": "Base",
                    "envelope": "CloudEvents/1.0",
                    "envelopemetadata": {"type": {"value": "base"}, "source": {"value": "/base"}},
                    "datacontenttype": "application/json"
                },
                "Derived": {
                    "messageid": "Derived",
                    "basemessageurl": "#/messagegroups/g/messages/Base",
                    "envelopemetadata": {"type": {"value": "derived"}}
                }
            }}}
        }));
        let derived = &doc["messagegroups"]["g"]["messages"]["Derived"];
        assert_eq!(derived["messageid"], "Derived");
        assert_eq!(derived["envelopemetadata"]["type"]["value"], "derived");
        assert_eq!(derived["envelopemetadata"]["source"]["value"], "/base");
        assert_eq!(derived["datacontenttype"], "application/json");
        assert_eq!(derived["envelope"], "CloudEvents/1.0");
        assert!(derived.get("basemessageurl").is_none());
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let doc = resolve(json!({
            "messagegroups": {"g": {"messages": {
                "Loop": {"basemessageurl": "/messagegroups/g/messages/Loop", "x": 1}
            }}}
        }));
        assert_eq!(doc["messagegroups"]["g"]["messages"]["Loop"], json!({"x": 1}));
    }

    #[test]
    fn test_base_with_versions_uses_latest() {
        let doc = resolve(json!({
            "messagegroups": {"g": {"messages": {
                "Base": {"versions": {
                    "2": {"protocol": "AMQP/1.0"},
                    "10": {"protocol": "MQTT/5.0"}
                }},
                "Derived": {"basemessageurl": "/messagegroups/g/messages/Base"}
            }}}
        }));
        assert_eq!(doc["messagegroups"]["g"]["messages"]["Derived"]["protocol"], "MQTT/5.0");
    }

    #[test]
    fn test_absolute_url_base() {
        let doc = resolve(json!({
            "messagegroups": {
                "shared": {"messages": {"B": {"protocol": "HTTP"}}},
                "g": {"messages": {"D": {
                    "basemessageurl": "https://r.example.com/reg/messagegroups/shared/messages/B"
                }}}
            }
        }));
        assert_eq!(doc["messagegroups"]["g"]["messages"]["D"]["protocol"], "HTTP");
    }

    #[test]
    fn test_percent_encoded_base_url() {
        let doc = resolve(json!({
            "messagegroups": {"g": {"messages": {
                "Base Msg": {"protocol": "AMQP/1.0"},
                "a/b": {"protocol": "HTTP"},
                "D1": {"basemessageurl": "https://r.example.com/messagegroups/g/messages/Base%20Msg"},
                "D2": {"basemessageurl": "https://r.example.com/messagegroups/g/messages/a%2Fb"}
            }}}
        }));
        let messages = &doc["messagegroups"]["g"]["messages"];
        assert_eq!(messages["D1"]["protocol"], "AMQP/1.0");
        assert_eq!(messages["D2"]["protocol"], "HTTP");
    }

    #[test]
    fn test_fragment_base_with_colon_in_id() {
        let doc = resolve(json!({
            "messagegroups": {"g": {"messages": {
                "urn:base": {"protocol": "MQTT/5.0"},
                "Plain": {"protocol": "HTTP"},
                "D": {"basemessageurl": "#/messagegroups/g/messages/urn:base"},
                "Typed": {"basemessageurl": "#/messagegroups/g/messages/Plain:Contoso.Plain"}
            }}}
        }));
        let messages = &doc["messagegroups"]["g"]["messages"];
        assert_eq!(messages["D"]["protocol"], "MQTT/5.0");
        assert_eq!(messages["Typed"]["protocol"], "HTTP");
    }

    #[test]
    fn test_chain_into_cycle_terminates() {
        let doc = resolve(json!({
            "messagegroups": {"g": {"messages": {
                "A": {"basemessageurl": "/messagegroups/g/messages/B", "a": 1},
                "B": {"basemessageurl": "/messagegroups/g/messages/A", "b": 1},
                "C": {"basemessageurl": "/messagegroups/g/messages/A", "c": 1}
            }}}
        }));
        let messages = &doc["messagegroups"]["g"]["messages"];
        assert_eq!(messages["A"], json!({"a": 1}));
        assert_eq!(messages["B"], json!({"b": 1}));
        assert_eq!(messages["C"], json!({"c": 1, "a": 1}));
    }

    #[test]
    fn test_document_without_messages_untouched() {
        let doc = json!({"schemagroups": {"g": {"schemas": {}}}});
        assert_eq!(resolve(doc.clone()), doc);
    }
}
