//! kcert - workload disruption and recovery certification CLI.
//!
//! Drains nodes under a workload, runs chaos experiments against it, waits
//! for operator installs, and compares result snapshots from earlier runs.
//! `claim add` folds JUnit reports into a claim before it is compared.

#![forbid(unsafe_code)]

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kcert_common::KcertConfig;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::chaos::ChaosArgs;
use commands::claim::ClaimCommand;
use commands::compare::CompareArgs;
use commands::disrupt::DisruptArgs;
use commands::operator::OperatorWaitArgs;

#[derive(Parser)]
#[command(name = "kcert")]
#[command(author, version, about = "kcert - workload disruption and recovery certification")]
struct Cli {
    /// Path to kcert.toml (defaults to ./kcert.toml when present)
    #[arg(short, long, global = true, env = "KCERT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain every node hosting each target workload and verify recovery
    Disrupt(DisruptArgs),

    /// Run the pod-delete chaos experiment against one workload
    Chaos(ChaosArgs),

    /// Wait for an operator ClusterServiceVersion to reach Succeeded
    OperatorWait(OperatorWaitArgs),

    /// Compare two claim snapshots
    Compare(CompareArgs),

    /// Maintain claim files
    Claim {
        #[command(subcommand)]
        command: ClaimCommand,
    },
}

fn init_logging(level: &str, verbose: bool, json: bool) {
    // RUST_LOG wins over the configured level; --verbose wins over both.
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.command {
        Commands::Compare(_) | Commands::Claim { .. } => None,
        _ => Some(
            KcertConfig::load(cli.config.as_deref())
                .map_err(|e| commands::coded(e.error_code(), e))
                .context("loading configuration")?,
        ),
    };

    let level = config.as_ref().map_or("info", |c| c.log_level.as_str());
    init_logging(level, cli.verbose, cli.log_json);
    if let Some(config) = &config {
        for (key, source) in &config.sources {
            debug!(key, %source, "Configuration source");
        }
    }

    let output = cli.output.as_deref();
    match (cli.command, config) {
        (Commands::Compare(args), _) => commands::compare::run(args, output),
        (Commands::Claim { command }, _) => commands::claim::run(command, output),
        (Commands::Disrupt(args), Some(config)) => commands::disrupt::run(args, config, output).await,
        (Commands::Chaos(args), Some(config)) => commands::chaos::run(args, config, output).await,
        (Commands::OperatorWait(args), Some(config)) => {
            commands::operator::run(args, config, output).await
        }
        (_, None) => anyhow::bail!("configuration was not loaded"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            match commands::error_code_of(&err) {
                Some(code) => {
                    let entry = code.entry();
                    error!(code = %entry, category = %entry.category, "{err:#}");
                    eprintln!("\n{}", entry.format_full().trim_end());
                }
                None => error!("{err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
