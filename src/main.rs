//! # MindField CLI (`mf`)
//!
//! The `mf` binary drives the two offline ingestion pipelines, the two
//! indexers, one-shot bridge queries, and the HTTP bridge server.
//!
//! ## Usage
//!
//! ```bash
//! mf --config ./config/mindfield.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mf init` | Create the local vector store schema |
//! | `mf ingest fragments` | Raw markdown → fragments JSONL |
//! | `mf ingest compasses` | Geometry JSON → compasses JSONL |
//! | `mf index texture` | Embed fragments into the texture collection |
//! | `mf index orientation` | Embed compasses into the orientation collection |
//! | `mf query "<text>"` | Run one dual-space query |
//! | `mf serve` | Start the HTTP bridge server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mindfield::bridge::Bridge;
use mindfield::config::{self, StoreMode};
use mindfield::store::sqlite::SqliteStore;
use mindfield::{index_cmd, ingest, present, server};

/// MindField — a dual-hemisphere document ingestion and semantic retrieval
/// bridge.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "mf",
    about = "MindField — dual-hemisphere document ingestion and semantic retrieval bridge",
    version,
    long_about = "MindField converts annotated documents into paragraph fragments and geometric \
    compass summaries, embeds each family in its own vector space, and answers queries by \
    searching both collections and merging the ranked results."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mindfield.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local vector store schema.
    ///
    /// Creates the SQLite store file and its tables. Idempotent. In cloud
    /// mode there is nothing to initialize locally.
    Init,

    /// Run an offline ingestion pipeline.
    ///
    /// Converts raw source directories into JSONL record files that the
    /// indexers consume.
    Ingest {
        #[command(subcommand)]
        pipeline: IngestPipeline,
    },

    /// Embed records and upsert them into a vector collection.
    Index {
        #[command(subcommand)]
        hemisphere: IndexHemisphere,
    },

    /// Run one dual-space query against both collections.
    Query {
        /// The query string.
        query: String,

        /// Print the raw JSON response instead of formatted output.
        #[arg(long)]
        json: bool,

        /// Override the number of neighbors requested per collection.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the HTTP bridge server.
    Serve,
}

#[derive(Subcommand)]
enum IngestPipeline {
    /// Segment annotated markdown into paragraph fragment records.
    Fragments,
    /// Synthesize compass records from geometry metadata documents.
    Compasses,
}

#[derive(Subcommand)]
enum IndexHemisphere {
    /// Fragment records → texture collection (local embedding space).
    Texture,
    /// Compass records → orientation collection (cloud embedding space).
    Orientation,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => match cfg.store.mode {
            StoreMode::Local => {
                SqliteStore::connect(&cfg.store.local_path).await?;
                println!("Vector store initialized successfully.");
            }
            StoreMode::Cloud => {
                println!("Cloud store requires no local initialization.");
            }
        },
        Commands::Ingest { pipeline } => match pipeline {
            IngestPipeline::Fragments => ingest::run_ingest_fragments(&cfg)?,
            IngestPipeline::Compasses => ingest::run_ingest_compasses(&cfg)?,
        },
        Commands::Index { hemisphere } => match hemisphere {
            IndexHemisphere::Texture => index_cmd::run_index_texture(&cfg).await?,
            IndexHemisphere::Orientation => index_cmd::run_index_orientation(&cfg).await?,
        },
        Commands::Query { query, json, top_k } => {
            let mut cfg = cfg;
            if let Some(top_k) = top_k {
                cfg.retrieval.top_k = top_k;
            }
            let bridge = Bridge::open(&cfg).await?;
            let response = bridge.query(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", present::render(&response));
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
