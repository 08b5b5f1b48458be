//! xRegistry CLI
//!
//! Loads definitions, composes their references and hands the result to a
//! template engine.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use xregistry_codegen::codegen::{self, RenderContext};
use xregistry_codegen::{lint_document, Headers, LoadOptions, Model, XRegistryConfig, XRegistryLoader};

const DEFAULT_LANGUAGE: &str = "xregistry";
const DEFAULT_STYLE: &str = "composed";

#[derive(Parser)]
#[command(name = "xregistry")]
#[command(about = "Generate code from xRegistry definitions")]
struct Cli {
    /// Configuration file (defaults to xregistry.toml and the user config dir)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Registry model file or URL
    #[arg(long, global = true)]
    model: Option<String>,

    /// Extra request header for registry fetches, as key=value
    #[arg(long = "requestheaders", value_name = "KEY=VALUE", global = true)]
    request_headers: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code for a definitions document
    Generate {
        /// Definitions file or URL; repeat to stack several documents
        #[arg(short, long, required = true)]
        definitions: Vec<String>,

        /// Target language
        #[arg(short, long)]
        language: Option<String>,

        /// Template style
        #[arg(short, long)]
        style: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Project name used for generated files and namespaces
        #[arg(long = "projectname")]
        project_name: Option<String>,

        /// Only keep message groups whose id contains this string
        #[arg(long)]
        messagegroup: Option<String>,

        /// Only keep endpoints whose id contains this string
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Load and lint a definitions document
    Validate {
        /// Definitions file or URL
        #[arg(short, long)]
        definitions: String,
    },

    /// List available languages and styles
    List,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        config,
        model,
        request_headers: header_pairs,
        command,
    } = cli;

    let session = || -> anyhow::Result<(XRegistryConfig, Headers, XRegistryLoader)> {
        let config = XRegistryConfig::load_from(config.as_deref()).context("loading configuration")?;
        let model = Model::load(config.model_location(model.as_deref()).as_deref())?;
        let headers = request_headers(&config, &header_pairs)?;
        let loader = XRegistryLoader::from_config(model, &config);
        Ok((config, headers, loader))
    };

    match command {
        Commands::List => {
            list();
            Ok(())
        }

        Commands::Generate {
            definitions,
            language,
            style,
            output,
            project_name,
            messagegroup,
            endpoint,
        } => {
            let (config, headers, mut loader) = session()?;
            let language = language
                .or_else(|| config.defaults.language.clone())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
            let style = style
                .or_else(|| config.defaults.style.clone())
                .unwrap_or_else(|| DEFAULT_STYLE.to_string());
            let engine = codegen::find_engine(&language, &style)
                .ok_or_else(|| anyhow!("no template for language '{}' and style '{}'", language, style))?;
            let output = output
                .or_else(|| config.defaults.output_dir.clone())
                .ok_or_else(|| anyhow!("--output is required"))?;
            let project_name = project_name
                .or_else(|| config.defaults.project_name.clone())
                .unwrap_or_else(|| project_name_from(&definitions[0]));

            let mut options = LoadOptions::default();
            if let Some(filter) = messagegroup {
                options = options.with_messagegroup(filter);
            }
            if let Some(filter) = endpoint {
                options = options.with_endpoint(filter);
            }

            let (uri, doc) = if definitions.len() > 1 {
                loader.load_stacked(&definitions, &headers, &options)?
            } else {
                loader.load_with_dependencies(&definitions[0], &headers, &options)?
            };
            let doc = doc.ok_or_else(|| anyhow!("could not load definitions from {}", uri))?;
            debug!("Loaded definitions from {}", uri);

            let mut ctx = RenderContext::new(&mut loader, &doc, project_name, output);
            ctx.definitions_uri = uri;
            let files = codegen::render(engine.as_ref(), &mut ctx)?;
            for file in &files {
                println!("{}", file.display());
            }
            Ok(())
        }

        Commands::Validate { definitions } => {
            let (_, headers, mut loader) = session()?;
            let (uri, doc) = loader.load_with_dependencies(&definitions, &headers, &LoadOptions::default())?;
            let doc = doc.ok_or_else(|| anyhow!("could not load definitions from {}", uri))?;

            let result = lint_document(loader.model(), &uri, &doc);
            for warning in &result.warnings {
                println!("warning[{}] {}: {}", warning.code, warning.path, warning.message);
            }
            for error in &result.errors {
                println!("error[{}] {}: {}", error.code, error.path, error.message);
            }
            if !result.is_clean() {
                bail!("{} has {} error(s)", uri, result.errors.len());
            }
            info!("{} is valid", uri);
            println!("{}: ok", uri);
            Ok(())
        }
    }
}

fn list() {
    println!("{:<12} {}", "LANGUAGE", "STYLE");
    for engine in codegen::engines() {
        println!("{:<12} {}", engine.language(), engine.style());
    }
}

/// Config headers overlaid with `key=value` pairs from the command line
fn request_headers(config: &XRegistryConfig, pairs: &[String]) -> anyhow::Result<Headers> {
    let mut headers = config.request_headers();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("request header '{}' is not key=value", pair))?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}

/// `defs/contoso-orders.xreg.json` -> `contoso-orders`
fn project_name_from(definitions: &str) -> String {
    let last = definitions
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(definitions);
    Path::new(last)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.split('.').next().unwrap_or(s).to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "project".to_string())
}
