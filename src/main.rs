//! # Bundle Search CLI (`bundle-search`)
//!
//! ## Usage
//!
//! ```bash
//! bundle-search --config ./config/bundle-search.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bundle-search init` | Create the pgvector extension, tables and indexes |
//! | `bundle-search load` | Ingest `bundles-*.jsonl` files from the data directory |
//! | `bundle-search search "<query>"` | Run one natural-language query |
//! | `bundle-search serve` | Start the HTML/JSON search front end |
//! | `bundle-search stats` | Print catalog row counts |
//!
//! ## Examples
//!
//! ```bash
//! # Check what a load would do without touching the database
//! bundle-search load --data-dir ./data --dry-run
//!
//! # Load, keeping embeddings in a local cache file
//! bundle-search load --data-dir ./data --cache ./vector_cache/cache.json
//!
//! # See the intent and SQL behind a query
//! bundle-search search "python ebooks available now" --debug
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use bundle_search::{config, ingest, migrate, search, server, stats};

/// Bundle Search CLI: natural-language search over a catalog of bundles.
///
/// Every command accepts `--config`. A missing config file is not an error;
/// defaults and `POSTGRES_*` / `MODEL_PATH` environment variables apply.
#[derive(Parser)]
#[command(
    name = "bundle-search",
    about = "Semantic search over digital-goods bundles",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/bundle-search.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the pgvector extension, catalog tables and indexes.
    Init,

    /// Ingest bundle files into the catalog.
    Load {
        /// Directory containing `bundles-*.jsonl` (overrides `ingest.data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Parse and count records without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many records.
        #[arg(long)]
        limit: Option<usize>,

        /// Embedding cache file (overrides `ingest.cache_path`).
        #[arg(long)]
        cache: Option<PathBuf>,
    },

    /// Run one natural-language query.
    Search {
        query: String,

        /// Also print the classified intent and generated SQL.
        #[arg(long)]
        debug: bool,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP front end on `server.bind`.
    Serve,

    /// Print catalog row counts.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load_config(&cli.config)?;

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Load {
            data_dir,
            dry_run,
            limit,
            cache,
        } => {
            if let Some(path) = cache {
                cfg.ingest.cache_path = path;
            }
            ingest::run_load(&cfg, data_dir.as_deref(), dry_run, limit).await?;
        }
        Commands::Search { query, debug, json } => {
            search::run_search(&cfg, &query, debug, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
