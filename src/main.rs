//! # Qdrant Search CLI (`qdrant-search`)
//!
//! Runs the MCP stdio server or the HTTP server, and offers a few one-shot
//! commands for checking a deployment by hand.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qdrant-search serve mcp` | MCP server on stdin/stdout |
//! | `qdrant-search serve rest` | HTTP server with `POST /mcp-tools` |
//! | `qdrant-search query "<text>"` | Run one search and print the result |
//! | `qdrant-search collections` | List collections |
//! | `qdrant-search info [name]` | Describe a collection |
//! | `qdrant-search inspect` | Check the configured collection is ready |
//!
//! ## MCP client configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "qdrant-search": {
//!       "command": "qdrant-search",
//!       "args": ["serve", "mcp"],
//!       "env": { "OPENAI_API_KEY": "sk-...", "QDRANT_URL": "http://localhost:6333" }
//!     }
//!   }
//! }
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use qdrant_search::handler::{QueryHandler, QueryParams, ToolResponse};
use qdrant_search::qdrant::{QdrantStore, VectorStore};
use qdrant_search::{config, format, inspect, mcp, server};

/// Semantic search over a Qdrant collection for AI tools.
///
/// Settings come from an optional TOML file and the `QDRANT_URL`,
/// `QDRANT_HOST`, `QDRANT_PORT`, `QDRANT_COLLECTION`, `QDRANT_API_KEY` and
/// `OPENAI_API_KEY` environment variables (a `.env` file is honoured).
#[derive(Parser)]
#[command(name = "qdrant-search", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Run a single search and print the formatted result.
    Query {
        /// Natural-language question.
        query: String,

        /// Maximum number of results (defaults to `search.default_limit`).
        #[arg(long)]
        limit: Option<u64>,

        /// Only match points whose `metadata.type` equals this value.
        #[arg(long = "type")]
        filter_type: Option<String>,
    },

    /// List collections in the vector store.
    Collections,

    /// Describe a collection (defaults to the configured one).
    Info {
        name: Option<String>,
    },

    /// Check that the configured collection exists and holds points.
    Inspect,
}

#[derive(Subcommand)]
enum ServeService {
    /// MCP over stdin/stdout.
    Mcp,
    /// HTTP API on `[server].bind`.
    Rest {
        /// Override the bind address (e.g. `127.0.0.1:3000`).
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stderr only: stdout is the MCP transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { service } => match service {
            ServeService::Mcp => mcp::run_stdio(&cfg).await?,
            ServeService::Rest { bind } => server::run_server(&cfg, bind).await?,
        },
        Commands::Query {
            query,
            limit,
            filter_type,
        } => {
            let handler = QueryHandler::from_config(&cfg)?;
            let response = handler
                .query_vector_store(QueryParams {
                    query,
                    limit,
                    filter_type,
                })
                .await;
            print_response(&response);
        }
        Commands::Collections => {
            let store = QdrantStore::new(&cfg.qdrant)?;
            let names = store.list_collections().await?;
            println!("{}", format::collections_text(&names));
        }
        Commands::Info { name } => {
            let store = QdrantStore::new(&cfg.qdrant)?;
            let name = name.unwrap_or_else(|| cfg.qdrant.collection.clone());
            let info = store.collection_info(&name).await?;
            println!("{}", format::collection_info_text(&info));
        }
        Commands::Inspect => {
            inspect::run_inspect(&cfg).await?;
        }
    }

    Ok(())
}

fn print_response(response: &ToolResponse) {
    if response.is_error {
        eprintln!("{}", response.first_text());
        std::process::exit(1);
    }
    println!("{}", response.first_text());
}
