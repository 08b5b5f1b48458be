//! Document fetching
//!
//! [`DocumentSource`] performs raw reads (filesystem or HTTP). The
//! [`DocumentFetcher`] on top of it parses content, keeps the run's
//! handled-set, and caches every read so a physical document is read at most
//! once per generation run.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::reference::{is_http, strip_fragment};
use crate::config::{ParsePolicy, XRegistryConfig};
use crate::document::{is_blank, parse_text, Document};
use crate::error::{RegistryError, Result};

/// Request headers sent with HTTP fetches
pub type Headers = BTreeMap<String, String>;

const REGISTRY_HEADER_PREFIX: &str = "xregistry-";

// =============================================================================
// Sources
// =============================================================================

/// Raw content read from a location
#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    /// Final location after redirects, without fragment
    pub uri: String,
    pub text: String,
    /// `xRegistry-*` response headers, keyed by lowercase attribute name
    pub registry_attributes: BTreeMap<String, String>,
}

/// Something that can read documents
pub trait DocumentSource {
    fn read(&self, uri: &str, headers: &Headers) -> Result<RawDocument>;
}

/// Reads local files, `file://` URLs and HTTP(S) URLs
pub struct StandardSource {
    agent: ureq::Agent,
    inline_query: bool,
}

impl Default for StandardSource {
    fn default() -> Self {
        Self::from_config(&XRegistryConfig::default())
    }
}

impl StandardSource {
    pub fn from_config(config: &XRegistryConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.registry.timeout_secs))
            .redirects(8)
            .build();
        Self {
            agent,
            inline_query: config.loader.inline_query,
        }
    }

    fn read_http(&self, uri: &str, headers: &Headers) -> Result<RawDocument> {
        let mut url = Url::parse(uri).map_err(|e| fetch_error(uri, e))?;
        url.set_fragment(None);
        if self.inline_query && !url.query_pairs().any(|(k, _)| k == "inline") {
            url.query_pairs_mut().append_pair("inline", "*");
        }

        let mut request = self.agent.get(url.as_str());
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let response = request.call().map_err(|e| fetch_error(uri, e))?;

        let final_uri = strip_fragment(response.get_url()).to_string();
        let mut registry_attributes = BTreeMap::new();
        for name in response.headers_names() {
            let lower = name.to_ascii_lowercase();
            if let Some(attribute) = lower.strip_prefix(REGISTRY_HEADER_PREFIX) {
                if let Some(value) = response.header(&name) {
                    registry_attributes.insert(attribute.to_string(), value.to_string());
                }
            }
        }
        let text = response.into_string().map_err(|e| fetch_error(uri, e))?;

        Ok(RawDocument {
            uri: final_uri,
            text,
            registry_attributes,
        })
    }

    fn read_file(&self, uri: &str) -> Result<RawDocument> {
        let location = strip_fragment(uri);
        let path = match Url::parse(location) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| fetch_error(uri, "not a local file URL"))?,
            _ => PathBuf::from(location),
        };
        let text = std::fs::read_to_string(&path)?;
        Ok(RawDocument {
            uri: location.to_string(),
            text,
            registry_attributes: BTreeMap::new(),
        })
    }
}

impl DocumentSource for StandardSource {
    fn read(&self, uri: &str, headers: &Headers) -> Result<RawDocument> {
        if is_http(uri) {
            self.read_http(uri, headers)
        } else {
            self.read_file(uri)
        }
    }
}

fn fetch_error(uri: &str, reason: impl std::fmt::Display) -> RegistryError {
    RegistryError::Fetch {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// Fetcher
// =============================================================================

/// How a fetch interacts with the handled-set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Return nothing for a document already handled in this run
    Once,
    /// Return the (cached) document even if already handled
    Reuse,
}

#[derive(Debug, Clone)]
struct CachedRead {
    uri: String,
    document: Option<Document>,
}

/// Parses, dedupes and caches document reads for one generation run
pub struct DocumentFetcher {
    source: Box<dyn DocumentSource>,
    policy: ParsePolicy,
    handled: HashSet<String>,
    cache: HashMap<String, CachedRead>,
    current_url: Option<String>,
}

impl DocumentFetcher {
    pub fn new(source: Box<dyn DocumentSource>, policy: ParsePolicy) -> Self {
        Self {
            source,
            policy,
            handled: HashSet::new(),
            cache: HashMap::new(),
            current_url: None,
        }
    }

    /// Fetch and parse a document.
    ///
    /// Returns the resolved URI and the parsed document. Failures are logged
    /// and yield `None`; they are cached like successes so a broken location
    /// is not retried within the run.
    pub fn fetch(&mut self, uri: &str, headers: &Headers, mode: FetchMode) -> (String, Option<Document>) {
        let key = strip_fragment(uri).to_string();

        if mode == FetchMode::Once && self.handled.contains(&key) {
            debug!("Already handled {}, skipping", key);
            return (key, None);
        }

        let read = match self.cache.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let read = self.read_uncached(&key, headers);
                self.cache.insert(key.clone(), read.clone());
                read
            }
        };

        if is_http(&read.uri) {
            self.current_url = Some(read.uri.clone());
        }

        // Redirects can land on a document handled under another name
        if mode == FetchMode::Once && read.uri != key && self.handled.contains(&read.uri) {
            debug!("{} resolved to already handled {}", key, read.uri);
            self.handled.insert(key);
            return (read.uri, None);
        }

        self.handled.insert(key);
        self.handled.insert(read.uri.clone());
        (read.uri, read.document)
    }

    fn read_uncached(&self, uri: &str, headers: &Headers) -> CachedRead {
        debug!("Reading {}", uri);
        let raw = match self.source.read(uri, headers) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read {}: {}", uri, e);
                return CachedRead {
                    uri: uri.to_string(),
                    document: None,
                };
            }
        };

        if is_blank(&raw.text) {
            warn!("{} is empty", raw.uri);
            return CachedRead {
                uri: raw.uri,
                document: None,
            };
        }
        let parsed = match parse_text(&raw.text, self.policy) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse {} as JSON or YAML: {}", raw.uri, e);
                return CachedRead {
                    uri: raw.uri,
                    document: None,
                };
            }
        };

        let document = if raw.registry_attributes.contains_key("schemaid") {
            wrap_registry_attributes(&raw.registry_attributes, parsed)
        } else {
            parsed
        };

        CachedRead {
            uri: raw.uri,
            document: Some(document),
        }
    }

    /// Has `uri` been fetched (or marked) in this run?
    pub fn is_handled(&self, uri: &str) -> bool {
        self.handled.contains(strip_fragment(uri))
    }

    pub fn mark_handled(&mut self, uri: &str) {
        self.handled.insert(strip_fragment(uri).to_string());
    }

    pub fn handled(&self) -> &HashSet<String> {
        &self.handled
    }

    pub fn clear_handled(&mut self) {
        self.handled.clear();
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn set_current_url(&mut self, url: Option<String>) {
        self.current_url = url;
    }

    /// Forget everything from the previous run
    pub fn reset(&mut self) {
        self.handled.clear();
        self.cache.clear();
        self.current_url = None;
    }
}

/// Build a schema-version object from `xRegistry-*` response headers with the
/// body as its `schema`
fn wrap_registry_attributes(attributes: &BTreeMap<String, String>, body: Document) -> Document {
    let mut wrapped = Map::new();
    for (name, value) in attributes {
        let key = if name == "defaultversionid" { "versionid" } else { name.as_str() };
        wrapped.insert(key.to_string(), Value::String(value.clone()));
    }
    wrapped.insert("schema".to_string(), body);
    Value::Object(wrapped)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory source that counts reads per URI
    #[derive(Clone, Default)]
    pub struct MemorySource {
        documents: Rc<RefCell<HashMap<String, RawDocument>>>,
        reads: Rc<RefCell<HashMap<String, usize>>>,
    }

    impl MemorySource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, uri: &str, text: &str) {
            self.documents.borrow_mut().insert(
                uri.to_string(),
                RawDocument {
                    uri: uri.to_string(),
                    text: text.to_string(),
                    registry_attributes: BTreeMap::new(),
                },
            );
        }

        pub fn insert_raw(&self, uri: &str, raw: RawDocument) {
            self.documents.borrow_mut().insert(uri.to_string(), raw);
        }

        pub fn reads(&self, uri: &str) -> usize {
            self.reads.borrow().get(uri).copied().unwrap_or(0)
        }
    }

    impl DocumentSource for MemorySource {
        fn read(&self, uri: &str, _headers: &Headers) -> Result<RawDocument> {
            *self.reads.borrow_mut().entry(uri.to_string()).or_default() += 1;
            self.documents
                .borrow()
                .get(uri)
                .cloned()
                .ok_or_else(|| fetch_error(uri, "404 Not Found"))
        }
    }
}
