//! gitshelf CLI
//!
//! Command-line tools for gitshelf working copies.
//!
//! # Commands
//!
//! - `verify` - Load every configured collection and report integrity errors
//! - `collections` - List the configured collections and their policy
//! - `get` - Print items, bypassing access rules
//! - `sync` - Bring the working copy up to date and run a sync cycle

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// gitshelf command-line tools.
#[derive(Parser)]
#[command(name = "gitshelf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the working copy
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Directory inside the working copy holding the collections
    #[arg(global = true, short, long, default_value = "gitshelf")]
    root: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every configured collection and report integrity errors
    Verify,

    /// List the configured collections
    Collections,

    /// Print one item, or every item of a collection
    Get {
        /// Collection name
        collection: String,

        /// Item identifier; omit to print every item
        id: Option<String>,
    },

    /// Clone or pull the working copy, then run a sync cycle
    Sync {
        /// Remote repository URL
        #[arg(long)]
        remote: String,

        /// Branch to sync
        #[arg(short, long, default_value = "master")]
        branch: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let dir = cli.dir.ok_or("Working copy path required (--dir)")?;
    let root = dir.join(&cli.root);

    match cli.command {
        Commands::Verify => {
            commands::verify::run(&root).await?;
        }
        Commands::Collections => {
            commands::collections::run(&root).await?;
        }
        Commands::Get { collection, id } => {
            commands::get::run(&root, &collection, id.as_deref()).await?;
        }
        Commands::Sync { remote, branch } => {
            commands::sync::run(&dir, &cli.root, &remote, &branch).await?;
        }
    }

    Ok(())
}
