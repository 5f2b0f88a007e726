//! # tether CLI
//!
//! Runs a tether client and executor back to back over an in-process
//! channel, or prints what a client puts on the wire.

mod config;
mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::DemoConfig;

#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML file describing the demo object
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a demo object through a local channel and print each outcome
    Demo,

    /// Print the messages a client posts for a few sample operations
    Wire {
        /// Pretty-print each message
        #[arg(long)]
        pretty: bool,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Demo => {
            let config = match &cli.config {
                Some(path) => DemoConfig::from_file(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => DemoConfig::default(),
            };
            for line in demo::run_demo(&config).await? {
                println!("{}", line);
            }
        }
        Commands::Wire { pretty } => {
            for message in demo::sample_messages() {
                let text = if pretty {
                    serde_json::to_string_pretty(&message)?
                } else {
                    serde_json::to_string(&message)?
                };
                println!("{}", text);
            }
        }
    }

    Ok(())
}
