//! BurrowDB CLI
//!
//! Read-only tools for looking at a database directory. None of them take
//! the database lock, so they can run next to a live process; what they see
//! is the journal as last synced.
//!
//! # Commands
//!
//! - `info` - journal and record statistics
//! - `dump` - committed key/value pairs
//! - `verify` - check every journal frame

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// BurrowDB command-line tools.
#[derive(Parser)]
#[command(name = "burrow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show journal and record statistics
    Info {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print committed key/value pairs
    Dump {
        /// Maximum number of pairs to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check every journal frame
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { format } => {
            let path = cli.path.ok_or("database path required for info")?;
            commands::info::run(&path, format)?;
        }
        Commands::Dump { limit, format } => {
            let path = cli.path.ok_or("database path required for dump")?;
            commands::dump::run(&path, limit, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("BurrowDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("BurrowDB Core v{}", burrow_core::VERSION);
        }
    }

    Ok(())
}
