//! Fault-Injection Lifecycle Manager.
//!
//! Drives a chaos engine, experiment and result triad as a black box:
//!
//! 1. **apply**: render the templates, resolve each kind through discovery
//!    and create the objects.
//! 2. **wait**: poll the single engine instance until the experiment is
//!    reported completed.
//! 3. **verdict**: read the single result instance.
//! 4. **teardown**: delete every fixed-name object with foreground
//!    propagation, collecting failures instead of stopping at the first.
//!
//! Teardown runs after every scenario, including one whose apply failed
//! half way.

pub mod status;
pub mod templates;

use std::sync::{Arc, Mutex};

use kcert_common::config::FaultInjectionConfig;
use kcert_common::labels::{find_target_label, selector_string};
use kcert_common::{TargetPodLabel, Verdict, WorkloadRef};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::cluster::{ClusterClient, ResourceMapping};
use crate::error::{CleanupWarning, EngineError, SetupStage};
use crate::poller::{PollOutcome, Poller, CheckError};
use crate::report::{Reporter, ScenarioReport};

pub use status::{EngineStatus, ExperimentStatus, ResultVerdict};
pub use templates::{CREATION_ORDER, TemplateError, TemplateSet, TemplateValues};

pub const CHAOS_API_GROUP: &str = "litmuschaos.io";
pub const CHAOS_API_VERSION: &str = "v1alpha1";
pub const ENGINE_NAME: &str = "engine-test";
pub const SERVICE_ACCOUNT_NAME: &str = "test-sa";

/// Namespace used for namespaced objects rendered without one.
const DEFAULT_NAMESPACE: &str = "default";

fn chaos_kind(kind: &str, plural: &str) -> ResourceMapping {
    ResourceMapping::namespaced(CHAOS_API_GROUP, CHAOS_API_VERSION, kind, plural)
}

pub fn chaos_engines() -> ResourceMapping {
    chaos_kind("ChaosEngine", "chaosengines")
}

pub fn chaos_experiments() -> ResourceMapping {
    chaos_kind("ChaosExperiment", "chaosexperiments")
}

pub fn chaos_results() -> ResourceMapping {
    chaos_kind("ChaosResult", "chaosresults")
}

fn service_accounts() -> ResourceMapping {
    ResourceMapping::namespaced("", "v1", "ServiceAccount", "serviceaccounts")
}

fn roles() -> ResourceMapping {
    ResourceMapping::namespaced("rbac.authorization.k8s.io", "v1", "Role", "roles")
}

fn role_bindings() -> ResourceMapping {
    ResourceMapping::namespaced("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings")
}

/// Name of the result the engine writes for `experiment`.
pub fn result_name(experiment: &str) -> String {
    format!("{ENGINE_NAME}-{experiment}")
}

/// Workload under fault injection and the selector handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChaosTarget {
    pub workload: WorkloadRef,
    /// `key=value` selector of the target pods.
    pub app_label: String,
}

impl ChaosTarget {
    fn template_values(&self) -> TemplateValues {
        TemplateValues {
            namespace: self.workload.namespace.clone(),
            app_label: self.app_label.clone(),
            app_kind: self.workload.kind.as_template_value().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedObject {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

// ── Teardown ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStatus {
    Deleted,
    AlreadyGone,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownStep {
    pub kind: String,
    pub name: String,
    pub status: TeardownStatus,
}

/// Every deletion attempted during teardown, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
    pub warnings: Vec<CleanupWarning>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Aggregate the warnings into one [`EngineError::Cleanup`].
    pub fn into_result(self) -> Result<(), EngineError> {
        if self.warnings.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Cleanup(self.warnings))
        }
    }
}

/// Full record of one fault-injection scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChaosScenarioReport {
    pub workload: WorkloadRef,
    pub experiment: String,
    pub verdict: Verdict,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub created: Vec<CreatedObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<PollOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultVerdict>,
    pub teardown: TeardownReport,
}

// ── Manager ─────────────────────────────────────────────────────────────────

pub struct FaultInjectionManager {
    cluster: Arc<dyn ClusterClient>,
    poller: Poller,
    reporter: Arc<dyn Reporter>,
    templates: TemplateSet,
    config: FaultInjectionConfig,
}

impl FaultInjectionManager {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn Reporter>,
        config: FaultInjectionConfig,
    ) -> Self {
        let templates = match &config.templates_dir {
            Some(dir) => TemplateSet::with_override_dir(dir),
            None => TemplateSet::embedded(),
        };
        Self {
            cluster,
            poller: Poller::new(clock, config.poll_interval),
            reporter,
            templates,
            config,
        }
    }

    pub fn experiment(&self) -> &str {
        &self.config.experiment
    }

    /// Pick the `applabel` selector from the first configured target label
    /// found on the workload's pod template.
    pub async fn resolve_target(
        &self,
        workload: &WorkloadRef,
        target_labels: &[TargetPodLabel],
    ) -> Result<ChaosTarget, EngineError> {
        let labels = self.cluster.workload_pod_labels(workload).await?;
        let label = find_target_label(&labels, target_labels).ok_or_else(|| {
            EngineError::setup(
                SetupStage::Template,
                workload.to_string(),
                "no configured target pod label found on the pod template",
            )
        })?;
        Ok(ChaosTarget {
            workload: workload.clone(),
            app_label: selector_string(label),
        })
    }

    /// Render and create every fault-injection object.
    ///
    /// Objects are created in [`CREATION_ORDER`]; the first failure stops the
    /// apply and is returned with the objects created so far.
    pub async fn apply(
        &self,
        target: &ChaosTarget,
        created: &mut Vec<CreatedObject>,
    ) -> Result<(), EngineError> {
        let values = target.template_values();
        for template in CREATION_ORDER {
            let documents = self
                .templates
                .render(template, &values)
                .map_err(|e| EngineError::setup(SetupStage::Template, template, e))?;

            for mut document in documents {
                let object = self.create_document(&mut document).await?;
                debug!(kind = %object.kind, name = %object.name, namespace = ?object.namespace, "Created object");
                created.push(object);
            }
        }
        info!(workload = %target.workload, objects = created.len(), "Fault-injection resources created");
        Ok(())
    }

    async fn create_document(&self, document: &mut Value) -> Result<CreatedObject, EngineError> {
        let api_version = document["apiVersion"].as_str().unwrap_or_default().to_string();
        let kind = document["kind"].as_str().unwrap_or_default().to_string();
        let name = document["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let subject = format!("{kind} {name}");

        let mapping = self
            .cluster
            .resolve_kind(&api_version, &kind)
            .await
            .map_err(|e| EngineError::setup(SetupStage::Discovery, &subject, e))?;

        let namespace = if mapping.namespaced {
            let ns = document["metadata"]["namespace"]
                .as_str()
                .filter(|ns| !ns.is_empty())
                .unwrap_or(DEFAULT_NAMESPACE)
                .to_string();
            document["metadata"]["namespace"] = Value::String(ns.clone());
            Some(ns)
        } else {
            None
        };

        self.cluster
            .create_object(&mapping, namespace.as_deref(), document)
            .await
            .map_err(|e| EngineError::setup(SetupStage::Create, &subject, e))?;

        Ok(CreatedObject {
            kind,
            namespace,
            name,
        })
    }

    /// Poll until the engine in `namespace` reports the experiment completed.
    ///
    /// More than one engine instance, or an engine status that cannot be
    /// parsed, ends the wait immediately with that error rather than a
    /// timeout.
    pub async fn wait_for_completion(&self, namespace: &str) -> Result<PollOutcome, EngineError> {
        let fatal: Mutex<Option<EngineError>> = Mutex::new(None);
        let engines = chaos_engines();
        let experiment = self.config.experiment.as_str();

        let outcome = {
            let cluster = &self.cluster;
            let engines = &engines;
            let fatal = &fatal;
            self.poller
                .wait_for(self.config.wait_timeout, || async move {
                    let items = cluster
                        .list_objects(engines, Some(namespace))
                        .await
                        .map_err(|e| CheckError::Transient(e.to_string()))?;
                    let engine = match items.as_slice() {
                        [] => return Ok(false),
                        [engine] => engine,
                        many => {
                            let err = EngineError::MultiInstance {
                                kind: engines.kind.clone(),
                                count: many.len(),
                            };
                            let reason = err.to_string();
                            *fatal.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
                            return Err(CheckError::Fatal(reason));
                        }
                    };
                    match EngineStatus::from_object(engine) {
                        Ok(status) => Ok(status.is_completed(experiment)),
                        Err(parse) => {
                            let reason = parse.to_string();
                            *fatal.lock().unwrap_or_else(|e| e.into_inner()) =
                                Some(EngineError::Parse(parse));
                            Err(CheckError::Fatal(reason))
                        }
                    }
                })
                .await
        };

        match outcome {
            PollOutcome::Converged { .. } => {
                info!(namespace, experiment, "Chaos engine completed");
                Ok(outcome)
            }
            PollOutcome::TimedOut { last_error, .. } => {
                warn!(namespace, experiment, "Chaos engine did not complete");
                Err(EngineError::ConvergenceTimeout {
                    what: format!("chaos engine {ENGINE_NAME} in {namespace}"),
                    timeout: self.config.wait_timeout,
                    last_error,
                })
            }
            PollOutcome::Aborted { reason } => {
                error!(namespace, reason = %reason, "Chaos engine wait aborted");
                let err = fatal
                    .into_inner()
                    .unwrap_or_else(|e| e.into_inner())
                    .unwrap_or_else(|| EngineError::setup(SetupStage::Create, ENGINE_NAME, reason));
                Err(err)
            }
        }
    }

    /// Read the single chaos result in `namespace`.
    pub async fn read_verdict(&self, namespace: &str) -> Result<ResultVerdict, EngineError> {
        let results = chaos_results();
        let items = self.cluster.list_objects(&results, Some(namespace)).await?;
        match items.as_slice() {
            [] => Err(EngineError::NoInstance {
                kind: results.kind,
                namespace: namespace.to_string(),
            }),
            [result] => Ok(ResultVerdict::from_object(result)?),
            many => Err(EngineError::MultiInstance {
                kind: results.kind,
                count: many.len(),
            }),
        }
    }

    /// Delete every fixed-name object in `namespace`, best effort.
    pub async fn teardown(&self, namespace: &str) -> TeardownReport {
        let experiment = self.config.experiment.clone();
        let targets = [
            (chaos_engines(), ENGINE_NAME.to_string()),
            (service_accounts(), SERVICE_ACCOUNT_NAME.to_string()),
            (roles(), SERVICE_ACCOUNT_NAME.to_string()),
            (role_bindings(), SERVICE_ACCOUNT_NAME.to_string()),
            (chaos_experiments(), experiment.clone()),
            (chaos_results(), result_name(&experiment)),
        ];

        let mut report = TeardownReport::default();
        for (mapping, name) in targets {
            let status = match self
                .cluster
                .delete_object(&mapping, Some(namespace), &name)
                .await
            {
                Ok(()) => TeardownStatus::Deleted,
                Err(err) if err.is_not_found() => TeardownStatus::AlreadyGone,
                Err(err) => {
                    warn!(kind = %mapping.kind, name = %name, namespace, error = %err, "Teardown step failed");
                    report.warnings.push(CleanupWarning {
                        kind: mapping.kind.clone(),
                        name: name.clone(),
                        error: err.to_string(),
                    });
                    TeardownStatus::Failed
                }
            };
            report.steps.push(TeardownStep {
                kind: mapping.kind,
                name,
                status,
            });
        }

        if report.is_clean() {
            info!(namespace, "Fault-injection resources removed");
        } else {
            warn!(namespace, failed = report.warnings.len(), "Teardown left resources behind");
        }
        report
    }

    /// Apply, wait, read the verdict and always tear down.
    pub async fn run_scenario(&self, target: &ChaosTarget) -> ChaosScenarioReport {
        let namespace = target.workload.namespace.clone();
        let experiment = self.config.experiment.clone();
        info!(workload = %target.workload, experiment = %experiment, app_label = %target.app_label, "Starting fault injection");

        let mut created = Vec::new();
        let mut wait = None;
        let outcome = async {
            self.apply(target, &mut created).await?;
            wait = Some(self.wait_for_completion(&namespace).await?);
            self.read_verdict(&namespace).await
        }
        .await;

        let teardown = self.teardown(&namespace).await;

        let (verdict, reason, error_code, result) = match outcome {
            Ok(result) if result.passed(&experiment) => (
                Verdict::Pass,
                format!("{experiment} passed for {}", target.workload),
                None,
                Some(result),
            ),
            Ok(result) => (
                Verdict::Fail,
                result.failure_reason(&experiment),
                Some(kcert_common::ErrorCode::ChaosVerdictFail.code_string()),
                Some(result),
            ),
            Err(err @ EngineError::ConvergenceTimeout { .. }) => {
                (Verdict::Fail, err.to_string(), Some(err.error_code().code_string()), None)
            }
            Err(err) => (Verdict::Error, err.to_string(), Some(err.error_code().code_string()), None),
        };

        let report = ChaosScenarioReport {
            workload: target.workload.clone(),
            experiment,
            verdict,
            reason,
            error_code,
            created,
            wait,
            result,
            teardown,
        };
        self.reporter.report(&ScenarioReport::new(
            report.experiment.clone(),
            report.workload.to_string(),
            report.verdict,
            report.reason.clone(),
        ));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_names() {
        assert_eq!(result_name("pod-delete"), "engine-test-pod-delete");
        assert_eq!(chaos_engines().api_version(), "litmuschaos.io/v1alpha1");
        assert_eq!(service_accounts().api_version(), "v1");
    }

    #[test]
    fn test_teardown_report_aggregates_warnings() {
        let mut report = TeardownReport::default();
        assert!(report.clone().into_result().is_ok());

        report.warnings.push(CleanupWarning {
            kind: "Role".into(),
            name: "test-sa".into(),
            error: "forbidden".into(),
        });
        assert!(matches!(report.into_result(), Err(EngineError::Cleanup(w)) if w.len() == 1));
    }
}
