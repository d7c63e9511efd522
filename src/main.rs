//! # ragpipe CLI
//!
//! ## Usage
//!
//! ```bash
//! ragpipe --config ./config/ragpipe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragpipe ingest` | Index every document not yet in the ledger and write a run manifest |
//! | `ragpipe ingest --dry-run` | Show the plan (documents, cached, pending, corpus version) |
//! | `ragpipe search "<query>"` | Dense or hybrid search over the collection |
//! | `ragpipe list-docs` | Documents present in the collection, with chunk counts |
//! | `ragpipe fingerprint` | Config fingerprint and corpus version for the current inputs |
//!
//! Configuration errors and an empty corpus fail before any embedding model
//! is loaded or any connection is opened.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragpipe::config;
use ragpipe::ingest;
use ragpipe::search::{self, SearchMode, SearchRequest};

/// Idempotent document ingestion into a vector index, with dense and hybrid
/// (dense + BM25, reciprocal rank fusion) retrieval.
#[derive(Parser)]
#[command(name = "ragpipe", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragpipe.toml")]
    config: PathBuf,

    /// More log output (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents from `paths.source_dir`.
    ///
    /// Documents already recorded in the ledger for the current corpus
    /// version are skipped. Failures are isolated per document and listed in
    /// the run manifest.
    Ingest {
        /// Print the plan without loading a model or contacting the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the collection.
    Search {
        /// Query text.
        query: String,

        #[arg(long, value_enum, default_value = "hybrid")]
        mode: SearchMode,

        /// Number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict results to one corpus version (defaults to the current one).
        #[arg(long, conflicts_with = "all_versions")]
        corpus_version: Option<String>,

        /// Search every corpus version in the collection.
        #[arg(long)]
        all_versions: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List documents present in the collection.
    ListDocs {
        /// Defaults to the current corpus version.
        #[arg(long, conflicts_with = "all_versions")]
        corpus_version: Option<String>,

        #[arg(long)]
        all_versions: bool,

        #[arg(long, default_value_t = 200)]
        max_docs: usize,
    },

    /// Print the config fingerprint and corpus version.
    Fingerprint,
}

fn init_tracing(verbose: u8, quiet: bool, format: LogFormat) {
    let filter = if let Ok(env) = std::env::var("RUST_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet, cli.log_format);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Search {
            query,
            mode,
            top_k,
            corpus_version,
            all_versions,
            json,
        } => {
            let request = SearchRequest {
                query,
                mode,
                top_k: top_k.unwrap_or(cfg.retrieval.top_k),
                filter: search::resolve_filter(&cfg, corpus_version, all_versions)?,
            };
            search::run_search(&cfg, &request, json).await?;
        }
        Commands::ListDocs {
            corpus_version,
            all_versions,
            max_docs,
        } => {
            let filter = search::resolve_filter(&cfg, corpus_version, all_versions)?;
            search::run_list_docs(&cfg, &filter, max_docs).await?;
        }
        Commands::Fingerprint => {
            ingest::print_fingerprint(&cfg)?;
        }
    }

    Ok(())
}
