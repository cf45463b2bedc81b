//! `kcert operator-wait`: block until a ClusterServiceVersion settles.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use kcert_common::KcertConfig;
use kcert_engine::{PhaseWaitOutcome, PhaseWaiter, TokioClock, TracingReporter};
use serde::Serialize;

use super::emit_json;

#[derive(Debug, Args)]
pub struct OperatorWaitArgs {
    /// Namespace the operator is installed in
    #[arg(short, long)]
    pub namespace: String,

    /// ClusterServiceVersion name
    #[arg(long)]
    pub name: String,
}

#[derive(Serialize)]
struct OperatorWaitReport<'a> {
    namespace: &'a str,
    name: &'a str,
    succeeded: bool,
    reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    outcome: &'a PhaseWaitOutcome,
}

pub async fn run(args: OperatorWaitArgs, config: KcertConfig, output: Option<&Path>) -> Result<ExitCode> {
    let cluster = super::connect().await?;
    let waiter = PhaseWaiter::new(
        cluster,
        Arc::new(TokioClock),
        Arc::new(TracingReporter),
        &config.operator,
    );

    let outcome = waiter.wait(&args.namespace, &args.name).await;
    let subject = format!("csv {}/{}", args.namespace, args.name);
    let report = OperatorWaitReport {
        namespace: &args.namespace,
        name: &args.name,
        succeeded: outcome.succeeded(),
        reason: outcome.reason(&subject),
        error_code: outcome.error_code().map(|c| c.code_string()),
        outcome: &outcome,
    };
    eprintln!("{}", report.reason);
    emit_json(&report, output)?;

    Ok(if report.succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
