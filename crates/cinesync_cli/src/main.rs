//! cinesync CLI
//!
//! Host process for the cinesync engine.
//!
//! # Commands
//!
//! - `run` - Sweep all streams until interrupted
//! - `once` - Run one stream to exhaustion and exit
//! - `cursors` - Print persisted stream cursors
//! - `reset` - Forget a stream cursor
//! - `document` - Print one stored index document

mod commands;
mod settings;

use clap::{Parser, Subcommand};
use settings::Settings;
use tracing_subscriber::EnvFilter;

/// Incremental PostgreSQL to Elasticsearch synchronization.
#[derive(Parser)]
#[command(name = "cinesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep all streams until Ctrl-C
    Run,

    /// Run one stream to exhaustion in a fresh window
    Once {
        /// Stream name
        #[arg(short, long)]
        stream: String,
    },

    /// Print persisted stream cursors
    Cursors {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Forget a stream cursor so it restarts from the beginning
    Reset {
        /// Stream name
        #[arg(short, long)]
        stream: String,
    },

    /// Print the stored source of one index document
    Document {
        /// Index name
        #[arg(value_name = "INDEX")]
        index_name: String,

        /// Document id
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run => commands::run::run(&cli.settings).await?,
        Commands::Once { stream } => commands::run::once(&cli.settings, &stream).await?,
        Commands::Cursors { format } => commands::cursors::list(&cli.settings, &format)?,
        Commands::Reset { stream } => commands::cursors::reset(&cli.settings, &stream)?,
        Commands::Document { index_name, id } => {
            commands::document::show(&cli.settings, &index_name, &id).await?
        }
        Commands::Version => {
            println!("cinesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
