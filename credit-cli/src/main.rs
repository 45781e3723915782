//! `credit`: command line front end for the hydrogen credit certificate contract.
//!
//! **Usage:**
//! ```text
//! credit [--config <file>] [--json] <command>
//! ```
//!
//! Prints the one-line failure message and exits non-zero on any error.

mod commands;
mod demo;
mod output;

use anyhow::Result;
use clap::Parser;
use credit_client::{Config, JsonRpcProvider, LedgerClient};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Command;
use output::Output;

/// Submit, approve, verify and mint hydrogen credit certificates.
#[derive(Parser)]
#[command(name = "credit", version, about = "Hydrogen credit certificate client")]
struct Cli {
    /// Configuration file (defaults to $CREDIT_CONFIG, then environment only)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Print client metrics after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    let show_metrics = cli.metrics;
    let result = run(cli).await;

    if show_metrics {
        eprint!("{}", credit_client::metrics::render());
    }

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config = match cli.config.as_deref() {
        Some(path) => Config::load(Some(path))?,
        None => Config::from_env()?,
    };
    debug!("RPC endpoint {}, contract {}", config.rpc.url, config.contract.address);

    let output = Output::new(cli.json, &config.network.explorer_url);

    match cli.command {
        Command::Demo => demo::run(&output).await,
        command => {
            let client = build_client(&config)?;
            commands::execute(&client, command, &output).await
        }
    }
}

fn build_client(config: &Config) -> Result<LedgerClient> {
    let provider = JsonRpcProvider::new(config.rpc.url.clone(), config.rpc_timeout())?;
    let client = LedgerClient::new(
        Arc::new(provider),
        config.descriptor()?,
        config.client_settings()?,
    )?;
    Ok(client)
}
