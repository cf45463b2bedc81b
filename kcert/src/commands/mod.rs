//! Shared helpers for kcert subcommands.

pub mod chaos;
pub mod claim;
pub mod compare;
pub mod disrupt;
pub mod operator;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use kcert_common::{ErrorCode, Verdict};
use kcert_engine::{ClusterClient, KubeCluster};
use serde::Serialize;
use thiserror::Error;

/// A failure tagged with its catalog code, so `main` can print the
/// remediation steps.
#[derive(Debug, Error)]
#[error("[{}] {message}", .code.code_string())]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

pub fn coded(code: ErrorCode, message: impl std::fmt::Display) -> anyhow::Error {
    CodedError {
        code,
        message: message.to_string(),
    }
    .into()
}

/// Catalog code of the first coded failure in the error chain.
pub fn error_code_of(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain()
        .find_map(|e| e.downcast_ref::<CodedError>())
        .map(|e| e.code)
}

/// Write `value` as pretty JSON to `output`, or stdout when no file is given.
pub fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing report")?;
    match output {
        Some(path) => std::fs::write(path, format!("{json}\n"))
            .with_context(|| format!("writing report to {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

/// Connect to the cluster from `KUBECONFIG` or the in-cluster environment.
pub async fn connect() -> Result<Arc<dyn ClusterClient>> {
    let cluster = KubeCluster::try_default()
        .await
        .map_err(|e| coded(ErrorCode::ClusterUnreachable, e))
        .context(ErrorCode::ClusterUnreachable.message())?;
    Ok(Arc::new(cluster))
}

/// Exit status: 0 when every scenario passed, 1 otherwise.
pub fn verdict_status<'a>(verdicts: impl IntoIterator<Item = &'a Verdict>) -> u8 {
    if verdicts.into_iter().all(|v| *v == Verdict::Pass) {
        0
    } else {
        1
    }
}

pub fn exit_code_for<'a>(verdicts: impl IntoIterator<Item = &'a Verdict>) -> ExitCode {
    ExitCode::from(verdict_status(verdicts))
}

/// Indent each line of text with a given prefix.
pub fn indent_lines(text: &str, prefix: &str) -> String {
    let mut out = String::new();
    for (idx, line) in text.lines().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(prefix);
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_lines() {
        assert_eq!(indent_lines("hello\nworld", "  "), "  hello\n  world");
        assert_eq!(indent_lines("single", ">> "), ">> single");
        assert_eq!(indent_lines("", "  "), "");
    }

    #[test]
    fn test_verdict_status() {
        assert_eq!(verdict_status(&[Verdict::Pass, Verdict::Pass]), 0);
        assert_eq!(verdict_status(&Vec::<Verdict>::new()), 0);
        assert_eq!(verdict_status(&[Verdict::Pass, Verdict::Fail]), 1);
        assert_eq!(verdict_status(&[Verdict::Error]), 1);
    }

    #[test]
    fn test_coded_error_survives_context() {
        let err = coded(ErrorCode::ConfigNoTargets, "nothing to disrupt")
            .context("preparing disruption run");

        assert_eq!(error_code_of(&err), Some(ErrorCode::ConfigNoTargets));
        let rendered = format!("{err:#}");
        assert!(rendered.contains("[KCERT-E006] nothing to disrupt"), "{rendered}");
        assert_eq!(error_code_of(&anyhow::anyhow!("plain")), None);
    }

    #[test]
    fn test_emit_json_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        emit_json(&serde_json::json!({"verdict": "pass"}), Some(&path)).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["verdict"], "pass");
    }
}
