//! Common types used across kcert components.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of controller that owns a workload under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// Kind string as it appears in a manifest (`Deployment`, `StatefulSet`).
    pub fn as_kind(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
        }
    }

    /// Lower-case form used by fault-injection templates (`appkind`).
    pub fn as_template_value(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
        }
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_template_value())
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deployment" | "deploy" | "deployments" => Ok(Self::Deployment),
            "statefulset" | "sts" | "statefulsets" => Ok(Self::StatefulSet),
            other => Err(format!(
                "unknown workload kind '{other}' (expected deployment or statefulset)"
            )),
        }
    }
}

/// Identifies a Deployment or StatefulSet by namespace and name.
///
/// Only the identity is stored here. Pods, node placement and replica counts
/// are always re-read from the cluster at the start of each disruption cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
    pub kind: WorkloadKind,
}

impl WorkloadRef {
    pub fn new(kind: WorkloadKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn deployment(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(WorkloadKind::Deployment, namespace, name)
    }

    pub fn statefulset(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(WorkloadKind::StatefulSet, namespace, name)
    }
}

impl std::fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Parses `namespace/kind/name` (as accepted on the command line).
impl FromStr for WorkloadRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [namespace, kind, name] if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(kind.parse()?, *namespace, *name))
            }
            _ => Err(format!(
                "invalid workload reference '{s}' (expected namespace/kind/name)"
            )),
        }
    }
}

/// A pod label that marks a workload as being under test.
///
/// Matches `prefix/name=value`, or `name=value` when the prefix is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPodLabel {
    #[serde(default)]
    pub prefix: String,
    pub name: String,
    pub value: String,
}

impl TargetPodLabel {
    /// Label key as stored in object metadata.
    pub fn key(&self) -> String {
        if self.prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.prefix, self.name)
        }
    }
}

/// Outcome of one certification scenario as handed to the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    /// The scenario could not be evaluated (setup error, bad starting state).
    Error,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_kind_parses_aliases() {
        assert_eq!("Deployment".parse::<WorkloadKind>(), Ok(WorkloadKind::Deployment));
        assert_eq!("sts".parse::<WorkloadKind>(), Ok(WorkloadKind::StatefulSet));
        assert!("daemonset".parse::<WorkloadKind>().is_err());
    }

    #[test]
    fn test_workload_ref_from_str() {
        let wl: WorkloadRef = "tnf/deployment/test".parse().unwrap();
        assert_eq!(wl, WorkloadRef::deployment("tnf", "test"));
        assert_eq!(wl.to_string(), "deployment tnf/test");
        assert!("tnf/test".parse::<WorkloadRef>().is_err());
        assert!("/deployment/test".parse::<WorkloadRef>().is_err());
    }

    #[test]
    fn test_target_pod_label_key() {
        let with_prefix = TargetPodLabel {
            prefix: "test-network-function.com".into(),
            name: "generic".into(),
            value: "target".into(),
        };
        assert_eq!(with_prefix.key(), "test-network-function.com/generic");

        let bare = TargetPodLabel {
            prefix: String::new(),
            name: "app".into(),
            value: "web".into(),
        };
        assert_eq!(bare.key(), "app");
    }

    #[test]
    fn test_verdict_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Verdict::Pass).unwrap(), "\"pass\"");
        assert_eq!(Verdict::Error.to_string(), "error");
    }
}
