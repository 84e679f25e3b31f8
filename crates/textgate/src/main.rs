//! # textgate CLI
//!
//! Operate the textgate ingestion pipeline from the command line.
//!
//! ## Commands
//!
//! - `textgate file <PATH>` - Ingest a local file (archives expand)
//! - `textgate base64 <NAME> <PAYLOAD>` - Ingest a base64 payload
//! - `textgate url <URL>` - Fetch and ingest a URL
//! - `textgate config show` - Print the effective configuration
//!
//! ## Examples
//!
//! ```bash
//! # Extract a mixed archive
//! textgate file ./bundle.zip
//!
//! # Fetch a page with rendering disabled
//! textgate url https://example.com/report.pdf
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use textgate_core::{FetchOptions, IngestSource};
use textgate_extract::ExtractorRegistry;
use textgate_fetch::RemoteFetcher;
use textgate_ingest::{IngestionPipeline, PipelineConfig};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "textgate")]
#[command(about = "Secure file-to-text ingestion")]
#[command(version)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a local file
    File {
        /// File to ingest
        path: PathBuf,
    },

    /// Ingest a base64 payload
    Base64 {
        /// Name to report for the payload
        name: String,

        /// Base64-encoded content
        payload: String,
    },

    /// Fetch and ingest a URL
    Url {
        /// URL to fetch
        url: String,

        /// User-Agent to present upstream
        #[arg(long)]
        user_agent: Option<String>,

        /// Include base64 data: images from pages
        #[arg(long)]
        inline_images: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            println!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        command => {
            let pipeline = build_pipeline(&config)?;
            let source = source_from_command(command).await?;
            match pipeline.ingest(source).await {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(err) => {
                    let body = serde_json::json!({
                        "status": "error",
                        "reason": err.status(),
                        "message": err.to_string(),
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config) -> Result<IngestionPipeline> {
    let policy = Arc::new(config.ssrf_policy()?);
    let fetcher = Arc::new(RemoteFetcher::new(policy));
    let extractors = Arc::new(ExtractorRegistry::with_defaults());
    Ok(IngestionPipeline::new(
        extractors,
        fetcher,
        PipelineConfig {
            budget: config.budget(),
        },
    ))
}

async fn source_from_command(command: Commands) -> Result<IngestSource> {
    match command {
        Commands::File { path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            let declared_len = Some(bytes.len() as u64);
            Ok(IngestSource::Upload {
                name,
                bytes,
                declared_len,
            })
        }
        Commands::Base64 { name, payload } => Ok(IngestSource::Base64 { name, payload }),
        Commands::Url {
            url,
            user_agent,
            inline_images,
        } => Ok(IngestSource::Url {
            url,
            options: FetchOptions {
                user_agent,
                include_inline_images: inline_images,
                ..FetchOptions::default()
            },
        }),
        Commands::Config { .. } => unreachable!("handled before pipeline construction"),
    }
}
