//! `kcert compare`: diff two claim snapshots offline.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use kcert_common::snapshot::{ResultSnapshot, SnapshotDiff, diff};
use tracing::info;

use super::{coded, emit_json};

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Claim file from the reference run
    #[arg(long)]
    pub baseline: PathBuf,

    /// Claim file from the run being checked
    #[arg(long)]
    pub candidate: PathBuf,

    /// Print the diff as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Load both snapshots and compare them.
pub fn compare_files(baseline: &Path, candidate: &Path) -> Result<SnapshotDiff> {
    let load = |path: &Path| {
        ResultSnapshot::load(path).map_err(|e| coded(e.error_code(), e))
    };
    let baseline = load(baseline)?;
    let candidate = load(candidate)?;
    Ok(diff(&baseline, &candidate))
}

pub fn run(args: CompareArgs, output: Option<&Path>) -> Result<ExitCode> {
    let result = compare_files(&args.baseline, &args.candidate)?;
    info!(
        baseline = %args.baseline.display(),
        candidate = %args.candidate.display(),
        identical = result.is_empty(),
        "Compared snapshots"
    );

    if args.json || output.is_some() {
        emit_json(&result, output)?;
    } else {
        print!("{result}");
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_claim(dir: &Path, name: &str, status: &str, nodes: &[&str]) -> PathBuf {
        let hw: serde_json::Map<String, serde_json::Value> = nodes
            .iter()
            .map(|n| (n.to_string(), json!({"cpu": "x86_64"})))
            .collect();
        let claim = json!({
            "claim": {
                "nodes": {"nodesHwInfo": hw},
                "rawResults": {
                    "cnf-certification-test": {
                        "testsuites": {"testsuite": {"testcase": [
                            {"-name": "lifecycle-pod-recreation", "-status": status}
                        ]}}
                    }
                }
            }
        });
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec(&claim).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_compare_files_reports_status_and_node_changes() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_claim(dir.path(), "a.json", "passed", &["n1", "n2"]);
        let b = write_claim(dir.path(), "b.json", "failed", &["n1"]);

        let result = compare_files(&a, &b).unwrap();

        assert_eq!(result.nodes.only_in_baseline, vec!["n2"]);
        assert_eq!(result.test_cases.changed.len(), 1);
        assert_eq!(result.test_cases.changed[0].candidate_status, "failed");
    }

    #[test]
    fn test_identical_claims_have_no_differences() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_claim(dir.path(), "a.json", "passed", &["n1"]);

        assert!(compare_files(&a, &a).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_carries_error_code() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_claim(dir.path(), "a.json", "passed", &["n1"]);

        let err = compare_files(&a, &dir.path().join("absent.json")).unwrap_err();

        assert!(err.to_string().starts_with("[KCERT-E"));
    }
}
