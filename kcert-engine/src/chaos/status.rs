//! Typed projections of chaos engine and chaos result objects.
//!
//! A missing `status` on a freshly created object is normal and projects to
//! an empty value. A field that is present with the wrong type is a
//! [`ParseError`].

use serde::Serialize;
use serde_json::Value;

use crate::error::ParseError;

const COMPLETED: &str = "completed";
const PASS: &str = "Pass";

fn object_label(kind: &str, obj: &Value) -> String {
    let name = obj
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>");
    format!("{kind} {name}")
}

fn lookup<'a>(obj: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(obj, |v, key| v.get(*key))
}

/// Optional string field; `null` counts as absent.
fn opt_str(obj: &Value, object: &str, path: &[&str]) -> Result<Option<String>, ParseError> {
    match lookup(obj, path) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ParseError::WrongType {
            object: object.to_string(),
            field: path.join("."),
            expected: "string",
        }),
    }
}

fn req_str(obj: &Value, object: &str, path: &[&str]) -> Result<String, ParseError> {
    opt_str(obj, object, path)?.ok_or_else(|| ParseError::MissingField {
        object: object.to_string(),
        field: path.join("."),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentStatus {
    pub name: String,
    pub status: Option<String>,
    pub verdict: Option<String>,
}

/// `status` of a ChaosEngine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub engine_status: Option<String>,
    pub experiments: Vec<ExperimentStatus>,
}

impl EngineStatus {
    pub fn from_object(obj: &Value) -> Result<Self, ParseError> {
        let object = object_label("ChaosEngine", obj);
        let engine_status = opt_str(obj, &object, &["status", "engineStatus"])?;

        let experiments = match lookup(obj, &["status", "experiments"]) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    Ok(ExperimentStatus {
                        name: req_str(item, &object, &["name"])?,
                        status: opt_str(item, &object, &["status"])?,
                        verdict: opt_str(item, &object, &["verdict"])?,
                    })
                })
                .collect::<Result<_, ParseError>>()?,
            Some(_) => {
                return Err(ParseError::WrongType {
                    object,
                    field: "status.experiments".into(),
                    expected: "list",
                });
            }
        };

        Ok(Self {
            engine_status,
            experiments,
        })
    }

    /// The named experiment is listed and the engine reports `completed`.
    pub fn is_completed(&self, experiment: &str) -> bool {
        self.experiments.iter().any(|e| e.name == experiment)
            && self.engine_status.as_deref() == Some(COMPLETED)
    }
}

/// Outcome recorded in a ChaosResult.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultVerdict {
    pub name: String,
    /// `spec.experiment`
    pub experiment: String,
    /// `status.experimentStatus.verdict`
    pub verdict: String,
    /// `status.experimentStatus.failStep`
    pub fail_step: Option<String>,
}

impl ResultVerdict {
    pub fn from_object(obj: &Value) -> Result<Self, ParseError> {
        let object = object_label("ChaosResult", obj);
        Ok(Self {
            name: obj
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            experiment: req_str(obj, &object, &["spec", "experiment"])?,
            verdict: req_str(obj, &object, &["status", "experimentStatus", "verdict"])?,
            fail_step: opt_str(obj, &object, &["status", "experimentStatus", "failStep"])?,
        })
    }

    /// Pass only for the expected experiment with verdict exactly `Pass`.
    pub fn passed(&self, experiment: &str) -> bool {
        self.experiment == experiment && self.verdict == PASS
    }

    pub fn failure_reason(&self, experiment: &str) -> String {
        if self.experiment != experiment {
            return format!(
                "result {} is for experiment {}, expected {experiment}",
                self.name, self.experiment
            );
        }
        match &self.fail_step {
            Some(step) if !step.is_empty() => step.clone(),
            _ => format!("verdict {}", self.verdict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_without_status_is_not_completed() {
        let status =
            EngineStatus::from_object(&json!({"metadata": {"name": "engine-test"}})).unwrap();
        assert_eq!(status, EngineStatus::default());
        assert!(!status.is_completed("pod-delete"));
    }

    #[test]
    fn test_engine_completed_for_named_experiment() {
        let obj = json!({
            "metadata": {"name": "engine-test"},
            "status": {
                "engineStatus": "completed",
                "experiments": [{"name": "pod-delete", "status": "Completed", "verdict": "Pass"}]
            }
        });
        let status = EngineStatus::from_object(&obj).unwrap();
        assert!(status.is_completed("pod-delete"));
        assert!(!status.is_completed("pod-cpu-hog"));
    }

    #[test]
    fn test_engine_still_running() {
        let obj = json!({"status": {
            "engineStatus": "initialized",
            "experiments": [{"name": "pod-delete"}]
        }});
        assert!(!EngineStatus::from_object(&obj).unwrap().is_completed("pod-delete"));
    }

    #[test]
    fn test_mistyped_experiments_is_parse_error() {
        let obj = json!({"metadata": {"name": "engine-test"}, "status": {"experiments": "pod-delete"}});
        assert_eq!(
            EngineStatus::from_object(&obj).unwrap_err(),
            ParseError::WrongType {
                object: "ChaosEngine engine-test".into(),
                field: "status.experiments".into(),
                expected: "list",
            }
        );
    }

    fn result(experiment: &str, verdict: &str, fail_step: Option<&str>) -> Value {
        json!({
            "metadata": {"name": "engine-test-pod-delete"},
            "spec": {"experiment": experiment},
            "status": {"experimentStatus": {"verdict": verdict, "failStep": fail_step}}
        })
    }

    #[test]
    fn test_verdict_pass() {
        let v = ResultVerdict::from_object(&result("pod-delete", "Pass", None)).unwrap();
        assert!(v.passed("pod-delete"));
    }

    #[test]
    fn test_verdict_fail_surfaces_fail_step() {
        let v = ResultVerdict::from_object(&result(
            "pod-delete",
            "Fail",
            Some("injection target not found"),
        ))
        .unwrap();
        assert!(!v.passed("pod-delete"));
        assert_eq!(v.failure_reason("pod-delete"), "injection target not found");
    }

    #[test]
    fn test_verdict_for_other_experiment_fails() {
        let v = ResultVerdict::from_object(&result("container-kill", "Pass", None)).unwrap();
        assert!(!v.passed("pod-delete"));
        assert!(v.failure_reason("pod-delete").contains("container-kill"));
    }

    #[test]
    fn test_verdict_requires_status() {
        let obj = json!({"metadata": {"name": "r"}, "spec": {"experiment": "pod-delete"}});
        assert!(matches!(
            ResultVerdict::from_object(&obj),
            Err(ParseError::MissingField { ref field, .. }) if field == "status.experimentStatus.verdict"
        ));
    }
}
