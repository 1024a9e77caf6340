//! # Document Portal CLI (`portal`)
//!
//! ```bash
//! portal --config ./config/portal.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `portal serve` | Start the HTTP API |
//! | `portal ingest <files...>` | Index PDF/DOCX/TXT files into a session |
//! | `portal search "<query>"` | Similarity search over a session index |
//! | `portal ask "<question>"` | Answer a question from a session index |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use document_portal::commands::{self, SessionArgs};
use document_portal::{config, server};

/// Document Portal: upload documents, index them per session, and ask
/// questions about them.
#[derive(Parser)]
#[command(name = "portal", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/portal.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Default)]
struct SessionOpts {
    /// Session id. Generated for `ingest` when omitted.
    #[arg(long)]
    session: Option<String>,

    /// Use the shared index directory instead of a per-session one.
    #[arg(long)]
    no_session_dirs: bool,
}

impl From<SessionOpts> for SessionArgs {
    fn from(opts: SessionOpts) -> Self {
        SessionArgs {
            session: opts.session,
            no_session_dirs: opts.no_session_dirs,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Extract, chunk and index files. Chunks already in the index are skipped.
    Ingest {
        /// Files to ingest (`.pdf`, `.docx`, `.txt`; others are skipped).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        session: SessionOpts,

        /// Override `[chunking].chunk_size`.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Override `[chunking].chunk_overlap`.
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Print the chunks most similar to a query.
    Search {
        query: String,

        #[command(flatten)]
        session: SessionOpts,

        /// Number of results (defaults to `[retrieval].k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Ask a question answered from the session index by the configured LLM.
    Ask {
        question: String,

        #[command(flatten)]
        session: SessionOpts,

        #[arg(long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .ok();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest {
            files,
            session,
            chunk_size,
            chunk_overlap,
        } => {
            commands::run_ingest(&cfg, &files, &session.into(), chunk_size, chunk_overlap).await?;
        }
        Commands::Search { query, session, k } => {
            commands::run_search(&cfg, &query, &session.into(), k).await?;
        }
        Commands::Ask {
            question,
            session,
            k,
        } => {
            commands::run_ask(&cfg, &question, &session.into(), k).await?;
        }
    }

    Ok(())
}
