//! `kcert disrupt`: node drain and recovery for each target workload.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use kcert_common::{ErrorCode, KcertConfig, WorkloadRef};
use kcert_engine::{DisruptionOrchestrator, DisruptionRunReport, TokioClock, TracingReporter};
use tracing::error;

use super::{coded, connect, emit_json, exit_code_for, indent_lines};

/// Exit status when a node could not be returned to service.
pub const EXIT_COMPENSATION_FAILED: u8 = 2;

#[derive(Debug, Args)]
pub struct DisruptArgs {
    /// Workload to disrupt as NAMESPACE/KIND/NAME (repeatable, replaces
    /// the configured targets)
    #[arg(short, long = "target", value_name = "NS/KIND/NAME")]
    pub targets: Vec<WorkloadRef>,
}

pub async fn run(args: DisruptArgs, mut config: KcertConfig, output: Option<&Path>) -> Result<ExitCode> {
    config.set_targets_from_cli(args.targets);
    config
        .validate()
        .map_err(|e| coded(e.error_code(), e))?;
    if config.targets.is_empty() {
        return Err(coded(
            ErrorCode::ConfigNoTargets,
            ErrorCode::ConfigNoTargets.message(),
        ));
    }

    let cluster = connect().await?;
    let orchestrator = DisruptionOrchestrator::new(
        cluster,
        Arc::new(TokioClock),
        Arc::new(TracingReporter),
        config.disruption.clone(),
    );

    match orchestrator.run(&config.targets).await {
        Ok(report) => {
            print_summary(&report);
            emit_json(&report, output)?;
            Ok(exit_code_for(report.workloads.iter().map(|w| &w.verdict)))
        }
        Err(aborted) => {
            error!(
                code = %aborted.error.error_code().code_string(),
                error = %aborted.error,
                "Disruption run aborted"
            );
            print_summary(&aborted.report);
            emit_json(&aborted.report, output)?;
            Ok(ExitCode::from(EXIT_COMPENSATION_FAILED))
        }
    }
}

fn print_summary(report: &DisruptionRunReport) {
    for workload in &report.workloads {
        eprintln!("{} {}", workload.verdict, workload.workload);
        eprintln!("{}", indent_lines(&workload.reason, "  "));
    }
    if let Some(reason) = &report.aborted {
        eprintln!("aborted: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: DisruptArgs,
    }

    #[test]
    fn test_targets_parse_in_order() {
        let h = Harness::try_parse_from([
            "kcert",
            "--target",
            "shop/deployment/web",
            "-t",
            "shop/sts/db",
        ])
        .unwrap();

        assert_eq!(
            h.args.targets,
            vec![
                WorkloadRef::deployment("shop", "web"),
                WorkloadRef::statefulset("shop", "db")
            ]
        );
    }

    #[test]
    fn test_malformed_target_is_rejected() {
        assert!(Harness::try_parse_from(["kcert", "--target", "web"]).is_err());
        assert!(Harness::try_parse_from(["kcert", "--target", "shop/daemonset/x"]).is_err());
    }
}
