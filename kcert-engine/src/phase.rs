//! Phase Waiter for operator ClusterServiceVersions.
//!
//! Unlike the generic poller contract, a failed fetch ends the wait at once:
//! an API that cannot be reached during an operator install is itself a
//! finding. `Failed` and `Unknown` are terminal failures, `Succeeded` is
//! success, and anything else is polled again until the deadline.
//!
//! A fetch or parse failure means the phase was never observed, so it is
//! reported as `Error` rather than `Fail`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kcert_common::config::OperatorConfig;
use kcert_common::{ErrorCode, Verdict};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::cluster::{ClusterClient, ResourceMapping};
use crate::poller::{PollOutcome, Poller, CheckError, duration_secs};
use crate::report::{Reporter, ScenarioReport};

pub fn cluster_service_versions() -> ResourceMapping {
    ResourceMapping::namespaced(
        "operators.coreos.com",
        "v1alpha1",
        "ClusterServiceVersion",
        "clusterserviceversions",
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseClass {
    Succeeded,
    Failed,
    InProgress,
}

pub fn classify_phase(phase: &str) -> PhaseClass {
    match phase {
        "Succeeded" => PhaseClass::Succeeded,
        "Failed" | "Unknown" => PhaseClass::Failed,
        _ => PhaseClass::InProgress,
    }
}

/// `status.phase`, empty while the object has no status yet.
fn read_phase(obj: &Value) -> Result<String, String> {
    match obj.pointer("/status/phase") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(phase)) => Ok(phase.clone()),
        Some(other) => Err(format!("status.phase is not a string: {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PhaseWaitOutcome {
    Succeeded {
        #[serde(with = "duration_secs")]
        elapsed: Duration,
        attempts: u32,
    },
    Failed {
        phase: String,
    },
    FetchFailed {
        error: String,
    },
    /// `status.phase` is present but not a string.
    ParseFailed {
        error: String,
    },
    TimedOut {
        #[serde(with = "duration_secs")]
        elapsed: Duration,
        last_phase: Option<String>,
    },
}

impl PhaseWaitOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Succeeded { .. } => Verdict::Pass,
            Self::Failed { .. } | Self::TimedOut { .. } => Verdict::Fail,
            Self::FetchFailed { .. } | Self::ParseFailed { .. } => Verdict::Error,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { .. } => Some(ErrorCode::OperatorPhaseFailed),
            Self::FetchFailed { .. } => Some(ErrorCode::OperatorFetchFailed),
            Self::ParseFailed { .. } => Some(ErrorCode::OperatorPhaseParse),
            Self::TimedOut { .. } => Some(ErrorCode::OperatorPhaseTimeout),
        }
    }

    pub fn reason(&self, subject: &str) -> String {
        match self {
            Self::Succeeded { .. } => format!("{subject} is ready"),
            Self::Failed { phase } => format!("{subject} failed to be ready, status={phase}"),
            Self::FetchFailed { error } => format!("could not get {subject}: {error}"),
            Self::ParseFailed { error } => format!("could not read phase of {subject}: {error}"),
            Self::TimedOut { .. } => format!("timeout waiting for {subject} to be ready"),
        }
    }
}

#[derive(Debug, Default)]
struct PhaseTrace {
    last_phase: Option<String>,
    terminal: Option<PhaseWaitOutcome>,
}

pub struct PhaseWaiter {
    cluster: Arc<dyn ClusterClient>,
    poller: Poller,
    reporter: Arc<dyn Reporter>,
    timeout: Duration,
}

impl PhaseWaiter {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn Reporter>,
        config: &OperatorConfig,
    ) -> Self {
        Self {
            cluster,
            poller: Poller::new(clock, config.poll_interval),
            reporter,
            timeout: config.timeout,
        }
    }

    /// Wait for the CSV `namespace/name` to reach a terminal phase.
    pub async fn wait(&self, namespace: &str, name: &str) -> PhaseWaitOutcome {
        let mapping = cluster_service_versions();
        let trace = Mutex::new(PhaseTrace::default());
        let subject = format!("csv {namespace}/{name}");

        let polled = {
            let cluster = &self.cluster;
            let mapping = &mapping;
            let trace = &trace;
            self.poller
                .wait_for(self.timeout, || async move {
                    let terminal = |outcome: PhaseWaitOutcome, reason: String| {
                        trace.lock().unwrap_or_else(|e| e.into_inner()).terminal = Some(outcome);
                        Err(CheckError::Fatal(reason))
                    };

                    let obj = match cluster.get_object(mapping, Some(namespace), name).await {
                        Ok(obj) => obj,
                        Err(err) => {
                            let error = err.to_string();
                            return terminal(PhaseWaitOutcome::FetchFailed { error: error.clone() }, error);
                        }
                    };
                    let phase = match read_phase(&obj) {
                        Ok(phase) => phase,
                        Err(error) => {
                            return terminal(PhaseWaitOutcome::ParseFailed { error: error.clone() }, error);
                        }
                    };

                    trace.lock().unwrap_or_else(|e| e.into_inner()).last_phase = Some(phase.clone());
                    match classify_phase(&phase) {
                        PhaseClass::Succeeded => Ok(true),
                        PhaseClass::Failed => {
                            terminal(PhaseWaitOutcome::Failed { phase: phase.clone() }, phase)
                        }
                        PhaseClass::InProgress => {
                            debug!(namespace, name, phase = %phase, "Waiting for Succeeded phase");
                            Ok(false)
                        }
                    }
                })
                .await
        };

        let trace = trace.into_inner().unwrap_or_else(|e| e.into_inner());
        let outcome = match polled {
            PollOutcome::Converged { elapsed, attempts } => {
                PhaseWaitOutcome::Succeeded { elapsed, attempts }
            }
            PollOutcome::TimedOut { elapsed, .. } => PhaseWaitOutcome::TimedOut {
                elapsed,
                last_phase: trace.last_phase,
            },
            PollOutcome::Aborted { reason } => trace
                .terminal
                .unwrap_or(PhaseWaitOutcome::FetchFailed { error: reason }),
        };

        let reason = outcome.reason(&subject);
        if outcome.succeeded() {
            info!(namespace, name, "{reason}");
        } else {
            warn!(namespace, name, ?outcome, "{reason}");
        }
        self.reporter.report(&ScenarioReport::new(
            "operator-phase",
            subject,
            outcome.verdict(),
            reason,
        ));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_classification() {
        assert_eq!(classify_phase("Succeeded"), PhaseClass::Succeeded);
        assert_eq!(classify_phase("Failed"), PhaseClass::Failed);
        assert_eq!(classify_phase("Unknown"), PhaseClass::Failed);
        for phase in ["", "Pending", "InstallReady", "Installing", "Replacing"] {
            assert_eq!(classify_phase(phase), PhaseClass::InProgress, "{phase}");
        }
    }

    #[test]
    fn test_read_phase() {
        assert_eq!(read_phase(&serde_json::json!({})).unwrap(), "");
        assert_eq!(
            read_phase(&serde_json::json!({"status": {"phase": "Pending"}})).unwrap(),
            "Pending"
        );
        assert!(read_phase(&serde_json::json!({"status": {"phase": 3}})).is_err());
    }

    #[test]
    fn test_outcome_reasons_and_codes() {
        let timed_out = PhaseWaitOutcome::TimedOut {
            elapsed: Duration::from_secs(300),
            last_phase: Some("Pending".into()),
        };
        assert_eq!(
            timed_out.reason("csv ops/etcd.v1"),
            "timeout waiting for csv ops/etcd.v1 to be ready"
        );
        assert_eq!(timed_out.error_code(), Some(ErrorCode::OperatorPhaseTimeout));
        assert_eq!(
            PhaseWaitOutcome::Failed { phase: "Unknown".into() }.reason("csv a/b"),
            "csv a/b failed to be ready, status=Unknown"
        );
    }

    #[test]
    fn test_unobserved_phase_is_an_error_verdict() {
        let parse = PhaseWaitOutcome::ParseFailed {
            error: "status.phase is not a string: 3".into(),
        };
        assert_eq!(parse.verdict(), Verdict::Error);
        assert_eq!(parse.error_code(), Some(ErrorCode::OperatorPhaseParse));
        assert_eq!(
            parse.reason("csv a/b"),
            "could not read phase of csv a/b: status.phase is not a string: 3"
        );
        let fetch = PhaseWaitOutcome::FetchFailed { error: "gone".into() };
        assert_eq!(fetch.verdict(), Verdict::Error);
        assert_eq!(
            PhaseWaitOutcome::Failed { phase: "Failed".into() }.verdict(),
            Verdict::Fail
        );
    }
}
