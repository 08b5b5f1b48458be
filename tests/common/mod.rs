//! Shared helpers for integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::rc::Rc;

use tempfile::TempDir;
use xregistry_codegen::resolve::RawDocument;
use xregistry_codegen::{DocumentSource, Headers, Model, ParsePolicy, RegistryError, XRegistryLoader};

/// In-memory registry that records how often each location is read
#[derive(Clone, Default)]
pub struct StubRegistry {
    documents: Rc<RefCell<HashMap<String, String>>>,
    reads: Rc<RefCell<HashMap<String, usize>>>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, uri: &str, text: &str) -> &Self {
        self.documents.borrow_mut().insert(uri.to_string(), text.to_string());
        self
    }

    pub fn reads(&self, uri: &str) -> usize {
        self.reads.borrow().get(uri).copied().unwrap_or(0)
    }

    pub fn loader(&self) -> XRegistryLoader {
        XRegistryLoader::with_source(
            Model::embedded().unwrap(),
            Box::new(self.clone()),
            ParsePolicy::Permissive,
        )
    }
}

impl DocumentSource for StubRegistry {
    fn read(&self, uri: &str, _headers: &Headers) -> xregistry_codegen::Result<RawDocument> {
        *self.reads.borrow_mut().entry(uri.to_string()).or_default() += 1;
        let text = self
            .documents
            .borrow()
            .get(uri)
            .cloned()
            .ok_or_else(|| RegistryError::Fetch {
                uri: uri.to_string(),
                reason: "404 Not Found".to_string(),
            })?;
        Ok(RawDocument {
            uri: uri.to_string(),
            text,
            registry_attributes: BTreeMap::new(),
        })
    }
}

/// Write `content` to `name` inside `dir` and return the path as a string
pub fn write_fixture(dir: &TempDir, name: &str, content: &str) -> String {
    let path: PathBuf = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

/// Loader over the filesystem with the embedded model
pub fn file_loader() -> XRegistryLoader {
    XRegistryLoader::new(Model::embedded().unwrap())
}
