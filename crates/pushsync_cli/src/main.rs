//! pushsync CLI
//!
//! Command-line tools for debugging pushsync clients.
//!
//! # Commands
//!
//! - `sign` - Compute the authorization header of a request
//! - `diff` - Compute the diff between two JSON objects
//! - `merge` - Apply a diff to a JSON object
//! - `inspect` - Summarize a persisted state file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// pushsync command-line tools.
#[derive(Parser)]
#[command(name = "pushsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the authorization header of a request
    Sign {
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Full request URL, query string included
        #[arg(short, long)]
        url: String,

        /// Body parameter as name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Client secret
        #[arg(short, long, env = "PUSHSYNC_CLIENT_SECRET", hide_env_values = true)]
        secret: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the minimal diff turning FROM into TO
    Diff {
        /// File holding the original object
        from: PathBuf,

        /// File holding the desired object
        to: PathBuf,
    },

    /// Print TARGET with DIFF merged in
    Merge {
        /// File holding the object to patch
        target: PathBuf,

        /// File holding the diff
        diff: PathBuf,

        /// Keep null values instead of deleting keys
        #[arg(short, long)]
        keep_nulls: bool,
    },

    /// Summarize a persisted state file
    Inspect {
        /// Path to the state file
        #[arg(short = 'p', long)]
        store: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

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
        Commands::Sign {
            method,
            url,
            params,
            secret,
            format,
        } => {
            commands::sign::run(&method, &url, &params, &secret, &format, cli.verbose)?;
        }
        Commands::Diff { from, to } => {
            commands::diff::run(&from, &to)?;
        }
        Commands::Merge {
            target,
            diff,
            keep_nulls,
        } => {
            commands::merge::run(&target, &diff, keep_nulls)?;
        }
        Commands::Inspect { store, format } => {
            commands::inspect::run(&store, &format)?;
        }
        Commands::Version => {
            println!("pushsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("snapshot format v{}", pushsync_core::SYNC_STATE_VERSION);
        }
    }

    Ok(())
}
