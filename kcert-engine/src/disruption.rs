//! Disruption Orchestrator: node drain recovery scenarios.
//!
//! For each workload: wait for a healthy baseline, then for every node that
//! hosts one of its pods, cordon the node, delete its pods, wait for the
//! workload to become ready again and uncordon the node. Nodes are handled
//! strictly one at a time.
//!
//! A node this orchestrator cordoned is always uncordoned before the next
//! node is touched. If that uncordon fails the run stops with
//! [`EngineError::CompensationFailure`] and no further scenario is started.
//!
//! A node whose pods could not be listed, or whose deletable pods all
//! refused deletion, is recorded as [`NodeOutcome::DrainFailed`] and makes
//! the workload verdict `Error` unless another node already failed recovery.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use kcert_common::config::DisruptionConfig;
use kcert_common::{Verdict, WorkloadRef};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::cluster::{ClusterClient, PodInfo};
use crate::error::EngineError;
use crate::poller::{PollOutcome, Poller, CheckError};
use crate::report::{
    DisruptionRunReport, NodeDisruptionRecord, NodeOutcome, Reporter, WorkloadScenarioReport,
};

/// A run stopped by a failed compensation, with everything done so far.
#[derive(Debug, Error)]
#[error("disruption run aborted: {error}")]
pub struct RunAborted {
    pub error: EngineError,
    pub report: DisruptionRunReport,
}

/// Recovery budget for a node: `per_pod` for each pod it hosted, at least one.
pub fn node_recovery_timeout(per_pod: Duration, pod_count: usize) -> Duration {
    let count = u32::try_from(pod_count.max(1)).unwrap_or(u32::MAX);
    per_pod.saturating_mul(count)
}

pub struct DisruptionOrchestrator {
    cluster: Arc<dyn ClusterClient>,
    poller: Poller,
    reporter: Arc<dyn Reporter>,
    config: DisruptionConfig,
}

impl DisruptionOrchestrator {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn Reporter>,
        config: DisruptionConfig,
    ) -> Self {
        let poller = Poller::new(clock, config.poll_interval);
        Self {
            cluster,
            poller,
            reporter,
            config,
        }
    }

    /// Disrupt every workload in order.
    ///
    /// A compensation failure aborts the remaining workloads and returns the
    /// partial report alongside the error.
    pub async fn run(&self, workloads: &[WorkloadRef]) -> Result<DisruptionRunReport, Box<RunAborted>> {
        let mut report = DisruptionRunReport::new();
        info!(run_id = %report.run_id, workloads = workloads.len(), "Starting disruption run");

        for workload in workloads {
            let mut nodes = Vec::new();
            match self.drive_workload(workload, &mut nodes).await {
                Ok((verdict, reason)) => {
                    let scenario = WorkloadScenarioReport {
                        workload: workload.clone(),
                        verdict,
                        reason,
                        nodes,
                    };
                    self.reporter.report(&scenario.scenario_report());
                    report.workloads.push(scenario);
                }
                Err(err) => {
                    error!(workload = %workload, error = %err, "Aborting disruption run");
                    let scenario = WorkloadScenarioReport {
                        workload: workload.clone(),
                        verdict: Verdict::Error,
                        reason: err.to_string(),
                        nodes,
                    };
                    self.reporter.report(&scenario.scenario_report());
                    report.workloads.push(scenario);
                    report.aborted = Some(err.to_string());
                    report.finish();
                    return Err(Box::new(RunAborted { error: err, report }));
                }
            }
        }

        report.finish();
        info!(
            run_id = %report.run_id,
            passed = report.count(Verdict::Pass),
            failed = report.count(Verdict::Fail),
            errors = report.count(Verdict::Error),
            "Disruption run finished"
        );
        Ok(report)
    }

    /// Run the drain scenario for one workload.
    pub async fn disrupt_workload(
        &self,
        workload: &WorkloadRef,
    ) -> Result<WorkloadScenarioReport, EngineError> {
        let mut nodes = Vec::new();
        let (verdict, reason) = self.drive_workload(workload, &mut nodes).await?;
        let scenario = WorkloadScenarioReport {
            workload: workload.clone(),
            verdict,
            reason,
            nodes,
        };
        self.reporter.report(&scenario.scenario_report());
        Ok(scenario)
    }

    async fn drive_workload(
        &self,
        workload: &WorkloadRef,
        records: &mut Vec<NodeDisruptionRecord>,
    ) -> Result<(Verdict, String), EngineError> {
        info!(workload = %workload, "Testing pod recreation");

        let baseline = self.wait_ready(workload, self.config.ready_timeout).await;
        if !baseline.converged() {
            warn!(workload = %workload, ?baseline, "Workload not ready before disruption");
            return Ok((
                Verdict::Error,
                format!("{workload} is not in a good starting state"),
            ));
        }

        let pods = match self.cluster.workload_pods(workload).await {
            Ok(pods) => pods,
            Err(err) => {
                return Ok((
                    Verdict::Error,
                    format!("{workload}: failed to list pods: {err}"),
                ));
            }
        };
        let nodes: BTreeSet<String> = pods.into_iter().filter_map(|p| p.node_name).collect();
        if nodes.is_empty() {
            return Ok((Verdict::Error, format!("{workload} has no scheduled pods")));
        }
        debug!(workload = %workload, nodes = ?nodes, "Nodes hosting workload");

        for node in &nodes {
            self.disrupt_node(workload, node, records).await?;
        }

        Ok(summarize(workload, records))
    }

    /// Run one node cycle and append its record.
    ///
    /// The record is pushed before the uncordon so a compensation failure
    /// still leaves it in the partial report.
    async fn disrupt_node(
        &self,
        workload: &WorkloadRef,
        node: &str,
        records: &mut Vec<NodeDisruptionRecord>,
    ) -> Result<(), EngineError> {
        if let Err(err) = self.cluster.set_node_schedulable(node, false).await {
            warn!(node, workload = %workload, error = %err, "Cordon failed, uncordoning node");
            records.push(NodeDisruptionRecord {
                node: node.to_string(),
                outcome: NodeOutcome::CordonFailed,
                pods_deleted: Vec::new(),
                delete_failures: Vec::new(),
                timeout: Duration::ZERO,
                wait: None,
                reason: format!("{workload}: could not cordon node {node}: {err}"),
            });
            return self.uncordon(node).await;
        }
        info!(node, workload = %workload, "Node cordoned");

        records.push(self.drain_and_wait(workload, node).await);
        self.uncordon(node).await
    }

    async fn drain_and_wait(&self, workload: &WorkloadRef, node: &str) -> NodeDisruptionRecord {
        let pods: Vec<PodInfo> = match self.cluster.node_pods(node).await {
            Ok(pods) => pods
                .into_iter()
                .filter(|p| !(self.config.skip_daemonset_pods && p.is_node_bound()))
                .collect(),
            Err(err) => {
                warn!(node, error = %err, "Could not list pods on node");
                return NodeDisruptionRecord {
                    node: node.to_string(),
                    outcome: NodeOutcome::DrainFailed,
                    pods_deleted: Vec::new(),
                    delete_failures: Vec::new(),
                    timeout: Duration::ZERO,
                    wait: None,
                    reason: format!("{workload}: could not list pods on node {node}: {err}"),
                };
            }
        };

        let timeout = node_recovery_timeout(self.config.per_pod_timeout, pods.len());
        info!(
            node,
            workload = %workload,
            pods = pods.len(),
            timeout_secs = timeout.as_secs(),
            "Draining node"
        );

        let mut pods_deleted = Vec::new();
        let mut delete_failures = Vec::new();
        for pod in &pods {
            match self.cluster.delete_pod(&pod.namespace, &pod.name).await {
                Ok(()) => pods_deleted.push(pod.name.clone()),
                Err(err) if err.is_not_found() => {
                    debug!(pod = %pod.name, "Pod already gone");
                }
                Err(err) => {
                    warn!(node, pod = %pod.name, error = %err, "Pod delete failed");
                    delete_failures.push(pod.name.clone());
                }
            }
        }

        // Nothing left the node, so a ready workload proves nothing.
        if pods_deleted.is_empty() && !delete_failures.is_empty() {
            warn!(node, workload = %workload, "No pod could be deleted, skipping recovery wait");
            let reason = format!(
                "{workload}: no pod could be deleted on node {node} ({})",
                delete_failures.join(", ")
            );
            return NodeDisruptionRecord {
                node: node.to_string(),
                outcome: NodeOutcome::DrainFailed,
                pods_deleted,
                delete_failures,
                timeout,
                wait: None,
                reason,
            };
        }

        let wait = self.wait_ready(workload, timeout).await;
        let (outcome, reason) = if wait.converged() {
            (
                NodeOutcome::Recovered,
                format!("{workload} recovery OK after losing node {node}"),
            )
        } else {
            (
                NodeOutcome::NotRecovered,
                format!("{workload} recovery NOK after losing node {node}"),
            )
        };
        info!(node, workload = %workload, ?outcome, "Node cycle finished");

        NodeDisruptionRecord {
            node: node.to_string(),
            outcome,
            pods_deleted,
            delete_failures,
            timeout,
            wait: Some(wait),
            reason,
        }
    }

    async fn uncordon(&self, node: &str) -> Result<(), EngineError> {
        match self.cluster.set_node_schedulable(node, true).await {
            Ok(()) => {
                info!(node, "Node uncordoned");
                Ok(())
            }
            Err(source) => {
                error!(node, error = %source, "Failed to uncordon node");
                Err(EngineError::CompensationFailure {
                    node: node.to_string(),
                    source,
                })
            }
        }
    }

    async fn wait_ready(&self, workload: &WorkloadRef, timeout: Duration) -> PollOutcome {
        let cluster = &self.cluster;
        self.poller
            .wait_for(timeout, || async move {
                cluster
                    .workload_readiness(workload)
                    .await
                    .map(|r| r.is_ready(workload.kind))
                    .map_err(|e| CheckError::Transient(e.to_string()))
            })
            .await
    }
}

fn summarize(workload: &WorkloadRef, records: &[NodeDisruptionRecord]) -> (Verdict, String) {
    let reason = records
        .iter()
        .map(|r| r.reason.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    if records.iter().any(|r| r.outcome == NodeOutcome::NotRecovered) {
        (Verdict::Fail, reason)
    } else if records.iter().any(|r| r.outcome == NodeOutcome::DrainFailed) {
        (
            Verdict::Error,
            format!("{workload}: drain did not complete on every node; {reason}"),
        )
    } else if records.iter().all(|r| r.outcome == NodeOutcome::CordonFailed) {
        (
            Verdict::Error,
            format!("{workload}: no node could be cordoned; {reason}"),
        )
    } else {
        (Verdict::Pass, reason)
    }
}
