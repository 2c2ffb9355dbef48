//! # docdex CLI
//!
//! Command-line interface for the docdex local document retrieval engine.
//!
//! ## Commands
//!
//! - `docdex add <COLLECTION> <FOLDER>` - index a folder into a collection
//! - `docdex remove <COLLECTION> <FOLDER>` - detach a folder (and erase it
//!   when no other collection references it)
//! - `docdex reindex <COLLECTION>` - force a full rescan
//! - `docdex query <COLLECTIONS> <QUERY>` - search indexed content
//! - `docdex status` - show per-collection statistics
//! - `docdex watch` - keep running and react to filesystem changes
//!
//! ## Examples
//!
//! ```bash
//! docdex add papers ~/Documents/papers
//! docdex query papers "gradient descent convergence"
//! docdex query papers,notes "quarterly report" --limit 3 --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docdex::{Config, Engine};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docdex")]
#[command(about = "Local document retrieval: folders in, ranked chunks out")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/docdex/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a folder into a collection
    Add {
        /// Collection name
        collection: String,
        /// Folder to index
        folder: PathBuf,
    },

    /// Detach a folder from a collection
    Remove {
        collection: String,
        folder: PathBuf,
    },

    /// Force a full rescan of a collection
    Reindex { collection: String },

    /// Search indexed content
    Query {
        /// Comma-separated collection names
        collections: String,
        /// Query text
        query: String,
        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show per-collection indexing state
    Status,

    /// Run the engine until interrupted, reacting to folder changes
    Watch,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print a sample configuration file
    Init,
    /// Show the config file path
    Path,
}

#[derive(Serialize)]
struct QueryOutput {
    query: String,
    results: Vec<docdex_core::RetrievedChunk>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.clone().or_else(Config::config_path))
        .map_err(anyhow::Error::msg)?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Add { collection, folder } => {
            let folder = folder
                .canonicalize()
                .with_context(|| format!("folder does not exist: {}", folder.display()))?;
            let engine = Engine::start(config)?;
            engine.handle().add_folder(&collection, &folder).await?;
            info!(collection, folder = %folder.display(), "indexing");
            engine.handle().wait_idle().await?;

            let progress = engine.handle().collections().await?;
            for item in progress.iter().filter(|p| p.collection == collection) {
                println!(
                    "{}: {} documents, {} words, {} chunks embedded",
                    item.collection,
                    item.total_docs,
                    item.total_words,
                    item.current_embeddings_to_index
                );
            }
            engine.handle().shutdown().await;
        }

        Commands::Remove { collection, folder } => {
            let folder = folder
                .canonicalize()
                .with_context(|| format!("folder does not exist: {}", folder.display()))?;
            let engine = Engine::start(config)?;
            engine.handle().remove_folder(&collection, &folder).await?;
            println!("removed {} from {}", folder.display(), collection);
            engine.handle().shutdown().await;
        }

        Commands::Reindex { collection } => {
            let engine = Engine::start(config)?;
            engine.handle().force_indexing(&collection).await?;
            engine.handle().wait_idle().await?;
            println!("reindexed {collection}");
            engine.handle().shutdown().await;
        }

        Commands::Query {
            collections,
            query,
            limit,
        } => {
            let names: Vec<String> = collections
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();

            let engine = Engine::start(config)?;
            let results = engine.handle().retrieve(&names, &query, limit).await?;

            match cli.format {
                OutputFormat::Json => {
                    let output = QueryOutput {
                        query: query.clone(),
                        results,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    if results.is_empty() {
                        println!("No results.");
                    }
                    for (rank, hit) in results.iter().enumerate() {
                        let location = if hit.page >= 0 {
                            format!("{} p.{}", hit.file, hit.page)
                        } else {
                            hit.file.clone()
                        };
                        println!("{}. {} ({})", rank + 1, location, hit.date);
                        println!("   {}", truncate(&hit.text, 160));
                    }
                }
            }
            engine.handle().shutdown().await;
        }

        Commands::Status => {
            let engine = Engine::start(config)?;
            let progress = engine.handle().collections().await?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&progress)?);
                }
                OutputFormat::Text => {
                    if progress.is_empty() {
                        println!("No collections.");
                    }
                    for item in progress {
                        println!(
                            "{} -> {} ({} docs, {} words{}{})",
                            item.collection,
                            item.folder_path.display(),
                            item.total_docs,
                            item.total_words,
                            if item.indexing { ", indexing" } else { "" },
                            if item.force_indexing {
                                ", reindex required"
                            } else {
                                ""
                            },
                        );
                    }
                }
            }
            engine.handle().shutdown().await;
        }

        Commands::Watch => {
            let engine = Engine::start(config)?;
            info!("watching configured folders, Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("cannot wait for Ctrl-C")?;
            engine.handle().shutdown().await;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Text => {
                    println!("{}", toml::to_string_pretty(&config).context("serialize")?);
                }
            },
            ConfigAction::Init => println!("{}", Config::sample_toml()),
            ConfigAction::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("could not determine config directory"),
            },
        },
    }

    Ok(())
}

/// Flatten newlines and cap the length for terminal output.
fn truncate(text: &str, max_len: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.len() <= max_len {
        flat
    } else {
        let mut cut = max_len.saturating_sub(3);
        while !flat.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &flat[..cut])
    }
}
