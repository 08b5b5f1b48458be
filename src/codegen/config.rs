//! Codegen configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Naming configuration for the case transforms handed to template engines
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Words kept upper-case by PascalCase conversion (e.g., ID, URL, API)
    #[serde(default)]
    pub acronyms: HashSet<String>,
}

impl NamingConfig {
    /// The usual acronym set for languages that spell them upper-case
    pub fn with_common_acronyms() -> Self {
        Self {
            acronyms: ["ID", "URL", "UUID", "API", "HTTP", "JSON", "XML", "SQL", "URI", "UI", "IO"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
