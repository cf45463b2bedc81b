//! `kcert claim add`: fold JUnit XML reports into a claim file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};
use kcert_common::snapshot::add_reports;

use super::{coded, emit_json};

#[derive(Debug, Subcommand)]
pub enum ClaimCommand {
    /// Add every JUnit XML report in a directory to an existing claim
    Add(ClaimAddArgs),
}

#[derive(Debug, Args)]
pub struct ClaimAddArgs {
    /// Existing claim file, rewritten in place
    #[arg(long)]
    pub claim: PathBuf,

    /// Directory of JUnit XML reports
    #[arg(short, long)]
    pub reportdir: PathBuf,
}

pub fn run(command: ClaimCommand, output: Option<&Path>) -> Result<ExitCode> {
    match command {
        ClaimCommand::Add(args) => add(&args, output),
    }
}

fn add(args: &ClaimAddArgs, output: Option<&Path>) -> Result<ExitCode> {
    let update = add_reports(&args.claim, &args.reportdir).map_err(|e| coded(e.error_code(), e))?;

    for key in &update.skipped {
        eprintln!(
            "Skipping: {key} already exists in claim {}",
            args.claim.display()
        );
    }
    if update.changed() {
        eprintln!(
            "Claim file {} updated: {}",
            args.claim.display(),
            update.added.join(", ")
        );
    } else {
        eprintln!("No changes were applied to {}", args.claim.display());
    }

    if output.is_some() {
        emit_json(&update, output)?;
    }
    Ok(ExitCode::SUCCESS)
}
