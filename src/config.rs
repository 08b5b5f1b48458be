//! Configuration management for the xRegistry generator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (xregistry.toml)
//! - The user config directory
//! - Environment variables (XREGISTRY__*)
//!
//! ## Example config file (xregistry.toml):
//! ```toml
//! [model]
//! url = "https://registry.example.com/"
//!
//! [defaults]
//! project_name = "Contoso.Orders"
//! language = "xregistry"
//! style = "composed"
//! output_dir = "./generated"
//!
//! [registry]
//! auth_token = "..."
//! timeout_secs = 30
//!
//! [loader]
//! parse_policy = "permissive"
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::resolve::Headers;

/// Environment variable that overrides the configured model location
pub const MODEL_PATH_ENV: &str = "XREGISTRY_MODEL_PATH";

/// Main configuration for the generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XRegistryConfig {
    /// Registry model location
    #[serde(default)]
    pub model: ModelConfig,

    /// Fallbacks for common CLI options
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote registry connection settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Document loading behavior
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// Model configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Local path, model URL, or registry base URL
    #[serde(default)]
    pub url: Option<String>,
}

/// Defaults applied when a CLI flag is omitted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Registry connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Bearer token sent with every HTTP fetch
    #[serde(default)]
    pub auth_token: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// What happens when fetched content is neither JSON nor YAML
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    /// Keep the raw text as a string document
    #[default]
    Permissive,
    /// Treat the content as a failed fetch
    Strict,
}

/// Loader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub parse_policy: ParsePolicy,

    /// Ask registries to inline nested collections (`inline=*`)
    #[serde(default = "default_true")]
    pub inline_query: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            parse_policy: ParsePolicy::default(),
            inline_query: true,
        }
    }
}

impl XRegistryConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = [
            "xregistry.toml",
            ".xregistry.toml",
            "config/xregistry.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("io", "xregistry", "xregistry") {
            let xdg_config = config_dir.config_dir().join("xregistry.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // XREGISTRY__LOADER__PARSE_POLICY=strict and friends
        builder = builder.add_source(
            Environment::with_prefix("XREGISTRY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Resolve the model location: explicit argument, then environment, then config.
    pub fn model_location(&self, cli_arg: Option<&str>) -> Option<String> {
        cli_arg
            .map(str::to_string)
            .or_else(|| std::env::var(MODEL_PATH_ENV).ok().filter(|v| !v.is_empty()))
            .or_else(|| self.model.url.clone())
    }

    /// Request headers implied by the registry settings
    pub fn request_headers(&self) -> Headers {
        let mut headers = Headers::new();
        if let Some(token) = &self.registry.auth_token {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        headers
    }
}
