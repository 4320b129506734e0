//! # Sportello CLI (`sportello`)
//!
//! ## Usage
//!
//! ```bash
//! sportello --config ./config/sportello.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sportello init` | Create the SQLite database and schema |
//! | `sportello load <path>` | Load (or reload) one document |
//! | `sportello ask "<question>"` | Answer one question through the full chat pipeline |
//! | `sportello stats` | Print the store summary |
//! | `sportello serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! sportello init
//! sportello load ./documento.txt
//! sportello load ./elenco_reparti.csv
//! sportello ask "Qual è il numero del CUP?"
//! GROQ_API_KEY=... sportello serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sportello::{chat, config, loader, logging, migrate, server, sqlite_store};
use sportello_core::models::DocumentKind;
use sportello_core::store::Store;

/// Sportello — answers help-desk questions from loaded documents and
/// collects support tickets.
#[derive(Parser)]
#[command(
    name = "sportello",
    about = "Sportello — document-grounded help-desk assistant",
    version,
    long_about = "Sportello loads text, CSV, and PDF documents into a local vector store, \
    answers staff questions strictly from them through a hosted language model, and collects \
    support tickets through a short conversational form."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sportello.toml")]
    config: PathBuf,

    /// Log level (`error`, `warn`, `info`, `debug`, `trace`). Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it on an existing database is safe.
    Init,

    /// Load a document, replacing any previous version with the same file name.
    Load {
        /// Path to a `.txt`, `.md`, `.csv`, or `.pdf` file.
        path: PathBuf,

        /// Document kind (`text`, `csv`, `pdf`). Inferred from the extension when omitted.
        #[arg(long)]
        kind: Option<DocumentKind>,
    },

    /// Ask one question and print the reply.
    Ask {
        question: String,

        /// Session id, for history and ticket state.
        #[arg(long, default_value = "cli")]
        session: String,
    },

    /// Print chunk count and loaded sources.
    Stats,

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref(), cli.log_json)?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Load { path, kind } => {
            loader::run_load(&cfg, &path, kind).await?;
        }
        Commands::Ask { question, session } => {
            chat::run_ask(&cfg, &session, &question).await?;
        }
        Commands::Stats => {
            let store = sqlite_store::open_store(&cfg).await?;
            println!("{}", store.stats().await?.summary());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
