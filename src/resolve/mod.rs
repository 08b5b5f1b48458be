//! Reference Resolution
//!
//! Turns a partial, reference-laden xRegistry document into a composed,
//! self-contained one.
//!
//! Components, leaves first:
//! - [`UrlParser`]: classifies registry URLs
//! - [`DocumentFetcher`]: reads and parses documents, at most once per run
//! - [`ResourceResolver`]: fills inline/url/base64 resource payloads
//! - [`DependencyResolver`]: fetches and merges cross-document references
//! - [`BaseMessageResolver`]: applies `basemessageurl` inheritance

pub mod basemessage;
pub mod dependency;
pub mod fetch;
pub mod reference;
pub mod resource;
pub mod url_parser;

pub use basemessage::BaseMessageResolver;
pub use dependency::{find_references, DependencyResolver};
pub use fetch::{DocumentFetcher, DocumentSource, FetchMode, Headers, RawDocument, StandardSource};
pub use reference::Reference;
pub use resource::ResourceResolver;
pub use url_parser::{EntryType, RegistryUrl, UrlParser};
