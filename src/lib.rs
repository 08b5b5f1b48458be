//! xRegistry Definitions Loader
//!
//! Loads xRegistry-style definitions (message groups, schema groups,
//! endpoints) and resolves every reference they carry into one composed,
//! self-contained document for code generation.
//!
//! ## Features
//!
//! - **Cross-document composition**: external references into known group
//!   collections are fetched once and merged at their structural location
//! - **Payload normalization**: `*url` and `*base64` resource payloads are
//!   inlined into the canonical field
//! - **Message inheritance**: `basemessageurl` chains are deep-merged, with
//!   cycles detected instead of followed
//! - **Deterministic versions**: "latest" is a padded comparison of version ids
//! - **Data-driven vocabulary**: collection names come from a registry model
//!
//! ## Architecture
//!
//! ```text
//! XRegistryLoader
//! ├── DocumentFetcher      read + parse, at most once per run
//! ├── DependencyResolver   fetch and merge cross-document references
//! │   └── UrlParser        classify registry URLs
//! ├── ResourceResolver     inline/url/base64 payloads
//! └── BaseMessageResolver  basemessageurl inheritance
//! ```

pub mod codegen;
pub mod config;
pub mod document;
pub mod error;
pub mod lint;
pub mod loader;
pub mod model;
pub mod resolve;
pub mod version;

pub use codegen::{RenderContext, RenderOutcome, TemplateEngine};
pub use config::{ParsePolicy, XRegistryConfig};
pub use document::Document;
pub use error::{RegistryError, Result};
pub use lint::{lint_document, LintResult};
pub use loader::{LoadOptions, XRegistryLoader};
pub use model::Model;
pub use resolve::{
    BaseMessageResolver, DependencyResolver, DocumentFetcher, DocumentSource, FetchMode, Headers,
    ResourceResolver, UrlParser,
};
