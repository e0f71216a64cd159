//! Braid CLI - hybrid semantic + lexical search over a vector store.
//!
//! # Usage
//!
//! ```bash
//! # Index documents from a JSON file (array of {id?, text, metadata?})
//! braid index documents.json
//! cat documents.json | braid index
//!
//! # Search
//! braid search "how do I tune hnsw?"
//! braid search "rust embeddings" --mode dense -n 5 --json
//! braid search "pasta" --filter lang=en --filter year=2024
//!
//! # Collection management
//! braid collections
//! braid info my-collection
//! braid delete my-collection
//!
//! # Health
//! braid status
//! ```

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Hybrid dense + sparse document search.
#[derive(Parser)]
#[command(name = "braid", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// gRPC URL of the vector store (overrides BRAID_STORE_URL)
    #[arg(long, global = true)]
    store_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Index documents from a JSON file (stdin when omitted)
    Index {
        /// File containing a JSON array of documents, or an object with a
        /// "documents" array
        file: Option<PathBuf>,
        /// Target collection (default collection when omitted)
        #[arg(long)]
        collection: Option<String>,
    },
    /// Search a collection
    Search {
        /// Query text
        query: String,
        /// Retrieval mode: hybrid, dense, or sparse
        #[arg(long, default_value = "hybrid")]
        mode: String,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// Metadata equality filter, repeatable (e.g. --filter lang=en)
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
        /// Collection to search (default collection when omitted)
        #[arg(long)]
        collection: Option<String>,
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all collections
    Collections,
    /// Show collection statistics
    Info {
        /// Collection name (default collection when omitted)
        name: Option<String>,
    },
    /// Delete a collection (the default collection is protected)
    Delete {
        /// Collection name
        name: String,
    },
    /// Check model and store availability
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let settings = config::resolve(cli.store_url.as_deref());

    match cli.command {
        Command::Index { file, collection } => {
            commands::index(settings, file.as_deref(), collection.as_deref()).await
        }
        Command::Search {
            query,
            mode,
            limit,
            filters,
            collection,
            json,
        } => {
            commands::search(
                settings,
                &query,
                &mode,
                limit,
                &filters,
                collection.as_deref(),
                json,
            )
            .await
        }
        Command::Collections => commands::collections(settings).await,
        Command::Info { name } => commands::info(settings, name.as_deref()).await,
        Command::Delete { name } => commands::delete(settings, &name).await,
        Command::Status => commands::status(settings).await,
    }
}
