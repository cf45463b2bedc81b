//! `kcert chaos`: one fault-injection experiment against one workload.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use kcert_common::{ErrorCode, KcertConfig, WorkloadKind, WorkloadRef};
use kcert_engine::{FaultInjectionManager, TokioClock, TracingReporter};
use tracing::info;

use super::{coded, connect, emit_json, exit_code_for};

#[derive(Debug, Args)]
pub struct ChaosArgs {
    /// Namespace of the target workload
    #[arg(short, long)]
    pub namespace: String,

    /// Name of the target workload
    #[arg(short, long)]
    pub workload: String,

    /// Workload kind (deployment or statefulset)
    #[arg(short, long, default_value = "deployment")]
    pub kind: WorkloadKind,
}

impl ChaosArgs {
    pub fn workload_ref(&self) -> WorkloadRef {
        WorkloadRef::new(self.kind, self.namespace.clone(), self.workload.clone())
    }
}

pub async fn run(args: ChaosArgs, config: KcertConfig, output: Option<&Path>) -> Result<ExitCode> {
    if config.target_pod_labels.is_empty() {
        return Err(coded(
            ErrorCode::ConfigValidationError,
            "no target_pod_labels configured; the experiment needs an app label",
        ));
    }

    let cluster = connect().await?;
    let manager = FaultInjectionManager::new(
        cluster,
        Arc::new(TokioClock),
        Arc::new(TracingReporter),
        config.fault_injection.clone(),
    );

    let workload = args.workload_ref();
    let target = manager
        .resolve_target(&workload, &config.target_pod_labels)
        .await
        .map_err(|e| coded(e.error_code(), e))?;
    info!(workload = %workload, app_label = %target.app_label, experiment = manager.experiment(), "Starting chaos scenario");

    let report = manager.run_scenario(&target).await;
    eprintln!("{} {}: {}", report.verdict, report.workload, report.reason);
    for warning in &report.teardown.warnings {
        eprintln!("  teardown: {warning}");
    }
    emit_json(&report, output)?;
    Ok(exit_code_for([&report.verdict]))
}
