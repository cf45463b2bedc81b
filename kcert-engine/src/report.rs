//! Scenario results and the reporting collaborator.
//!
//! The engine has no file or network output of its own. Each scenario ends
//! with one [`ScenarioReport`] handed to a [`Reporter`]; the structured run
//! reports below are returned to the caller for serialization.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kcert_common::{Verdict, WorkloadRef};
use serde::Serialize;
use tracing::{info, warn};

use crate::poller::{PollOutcome, duration_secs};

/// Verdict plus free-text reason for one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Scenario family, e.g. `node-drain` or `pod-delete`.
    pub scenario: String,
    pub subject: String,
    pub verdict: Verdict,
    pub reason: String,
}

impl ScenarioReport {
    pub fn new(
        scenario: impl Into<String>,
        subject: impl Into<String>,
        verdict: Verdict,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            subject: subject.into(),
            verdict,
            reason: reason.into(),
        }
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, report: &ScenarioReport);
}

/// Writes each verdict to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, report: &ScenarioReport) {
        match report.verdict {
            Verdict::Pass => info!(
                scenario = %report.scenario,
                subject = %report.subject,
                verdict = %report.verdict,
                "{}",
                report.reason
            ),
            Verdict::Fail | Verdict::Error => warn!(
                scenario = %report.scenario,
                subject = %report.subject,
                verdict = %report.verdict,
                "{}",
                report.reason
            ),
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<ScenarioReport>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ScenarioReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, report: &ScenarioReport) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
    }
}

// ── Node drain reports ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOutcome {
    Recovered,
    NotRecovered,
    /// Cordon was rejected; the node was uncordoned again and left alone.
    CordonFailed,
    /// The node was cordoned but none of its pods could be removed, so no
    /// recovery was observed.
    DrainFailed,
}

/// One cordon, drain, wait and uncordon cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDisruptionRecord {
    pub node: String,
    pub outcome: NodeOutcome,
    pub pods_deleted: Vec<String>,
    /// Pods whose delete call failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delete_failures: Vec<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<PollOutcome>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadScenarioReport {
    pub workload: WorkloadRef,
    pub verdict: Verdict,
    pub reason: String,
    pub nodes: Vec<NodeDisruptionRecord>,
}

impl WorkloadScenarioReport {
    pub fn scenario_report(&self) -> ScenarioReport {
        ScenarioReport::new(
            "node-drain",
            self.workload.to_string(),
            self.verdict,
            self.reason.clone(),
        )
    }
}

/// Result of a drain run over every targeted workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisruptionRunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub workloads: Vec<WorkloadScenarioReport>,
    /// Set when the run stopped early; names the node left cordoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl DisruptionRunReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            workloads: Vec::new(),
            aborted: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.workloads.iter().filter(|w| w.verdict == verdict).count()
    }

    pub fn all_passed(&self) -> bool {
        self.aborted.is_none() && self.workloads.iter().all(|w| w.verdict == Verdict::Pass)
    }
}

impl Default for DisruptionRunReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter_keeps_order() {
        let reporter = CollectingReporter::new();
        reporter.report(&ScenarioReport::new("node-drain", "a", Verdict::Pass, "ok"));
        reporter.report(&ScenarioReport::new("node-drain", "b", Verdict::Fail, "nok"));

        let subjects: Vec<_> = reporter.reports().into_iter().map(|r| r.subject).collect();
        assert_eq!(subjects, vec!["a", "b"]);
    }

    #[test]
    fn test_run_report_counts() {
        let mut run = DisruptionRunReport::new();
        for (name, verdict) in [("a", Verdict::Pass), ("b", Verdict::Fail), ("c", Verdict::Pass)] {
            run.workloads.push(WorkloadScenarioReport {
                workload: WorkloadRef::deployment("ns", name),
                verdict,
                reason: String::new(),
                nodes: Vec::new(),
            });
        }
        assert_eq!(run.count(Verdict::Pass), 2);
        assert!(!run.all_passed());
    }

    #[test]
    fn test_node_record_serializes_timeout_as_seconds() {
        let record = NodeDisruptionRecord {
            node: "n1".into(),
            outcome: NodeOutcome::Recovered,
            pods_deleted: vec!["web-1".into()],
            delete_failures: Vec::new(),
            timeout: Duration::from_secs(180),
            wait: None,
            reason: String::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timeout"], 180.0);
        assert_eq!(json["outcome"], "recovered");
        assert!(json.get("delete_failures").is_none());
    }

    #[test]
    fn test_drain_failed_outcome_name() {
        let json = serde_json::to_value(NodeOutcome::DrainFailed).unwrap();
        assert_eq!(json, "drain_failed");
    }
}
