//! Cluster capability consumed by the engine.
//!
//! Every component takes an `Arc<dyn ClusterClient>` at construction; nothing
//! reaches for a process-wide client. [`KubeCluster`] talks to a real API
//! server, [`FakeCluster`] is an in-memory stand-in for tests.
//!
//! All reads go to the cluster on every call. Implementations must not cache
//! cluster state between calls.

mod fake;
mod kube_client;

pub use fake::{FakeCall, FakeCluster};
pub use kube_client::KubeCluster;

use async_trait::async_trait;
use kcert_common::{WorkloadKind, WorkloadRef};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ClusterError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Api { code: 404, .. })
    }
}

// ── Observed state ──────────────────────────────────────────────────────────

/// A pod as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    pub node_name: Option<String>,
    /// Kind of the controlling owner reference, if any.
    pub owner_kind: Option<String>,
    /// Static pod mirrored by the kubelet.
    pub mirror: bool,
}

impl PodInfo {
    /// Pods that rescheduling cannot move off a node.
    pub fn is_node_bound(&self) -> bool {
        self.mirror || self.owner_kind.as_deref() == Some("DaemonSet")
    }
}

/// Replica counters of a Deployment or StatefulSet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadReadiness {
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
    pub updated: i32,
    pub unavailable: i32,
    /// StatefulSet `currentReplicas`; zero for Deployments.
    pub current: i32,
}

impl WorkloadReadiness {
    /// Every counter at `replicas`, nothing unavailable.
    pub fn settled(replicas: i32) -> Self {
        Self {
            desired: replicas,
            ready: replicas,
            available: replicas,
            updated: replicas,
            unavailable: 0,
            current: replicas,
        }
    }

    /// `ready` of `desired` replicas up, the rest unavailable.
    pub fn degraded(desired: i32, ready: i32) -> Self {
        Self {
            desired,
            ready,
            available: ready,
            updated: desired,
            unavailable: desired - ready,
            current: ready,
        }
    }

    /// Deployment: ready, available and updated all equal desired, and
    /// nothing unavailable.
    pub fn deployment_ready(&self) -> bool {
        self.ready == self.desired
            && self.available == self.desired
            && self.updated == self.desired
            && self.unavailable == 0
    }

    /// StatefulSet: ready equals desired, and either current or updated does.
    pub fn statefulset_ready(&self) -> bool {
        self.ready == self.desired
            && (self.current == self.desired || self.updated == self.desired)
    }

    pub fn is_ready(&self, kind: WorkloadKind) -> bool {
        match kind {
            WorkloadKind::Deployment => self.deployment_ready(),
            WorkloadKind::StatefulSet => self.statefulset_ready(),
        }
    }
}

/// Group/version/kind resolved to a resource endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceMapping {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceMapping {
    pub fn namespaced(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced: true,
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Split `group/version` (or a bare core `version`).
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

// ── Capability ──────────────────────────────────────────────────────────────

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Current replica counters of a workload.
    async fn workload_readiness(&self, workload: &WorkloadRef)
    -> Result<WorkloadReadiness, ClusterError>;

    /// Pods selected by the workload's `spec.selector.matchLabels`.
    async fn workload_pods(&self, workload: &WorkloadRef) -> Result<Vec<PodInfo>, ClusterError>;

    /// Labels on the workload's pod template.
    async fn workload_pod_labels(
        &self,
        workload: &WorkloadRef,
    ) -> Result<BTreeMap<String, String>, ClusterError>;

    /// Every pod scheduled on `node`, across namespaces.
    async fn node_pods(&self, node: &str) -> Result<Vec<PodInfo>, ClusterError>;

    /// Cordon (`false`) or uncordon (`true`) a node.
    async fn set_node_schedulable(&self, node: &str, schedulable: bool)
    -> Result<(), ClusterError>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    /// Resolve a kind through API discovery.
    async fn resolve_kind(&self, api_version: &str, kind: &str)
    -> Result<ResourceMapping, ClusterError>;

    async fn create_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<(), ClusterError>;

    async fn list_objects(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError>;

    async fn get_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, ClusterError>;

    /// Delete with foreground cascading propagation.
    async fn delete_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_readiness_requires_all_counters() {
        let ready = WorkloadReadiness {
            desired: 3,
            ready: 3,
            available: 3,
            updated: 3,
            unavailable: 0,
            current: 0,
        };
        assert!(ready.deployment_ready());
        assert!(!WorkloadReadiness { unavailable: 1, ..ready }.deployment_ready());
        assert!(!WorkloadReadiness { available: 2, ..ready }.deployment_ready());
    }

    #[test]
    fn test_statefulset_readiness_accepts_updated_or_current() {
        let base = WorkloadReadiness {
            desired: 2,
            ready: 2,
            ..Default::default()
        };
        assert!(!base.statefulset_ready());
        assert!(WorkloadReadiness { current: 2, ..base }.statefulset_ready());
        assert!(WorkloadReadiness { updated: 2, ..base }.statefulset_ready());
        assert!(!WorkloadReadiness { ready: 1, current: 2, ..base }.statefulset_ready());
    }

    #[test]
    fn test_node_bound_pods() {
        let mut pod = PodInfo {
            namespace: "kube-system".into(),
            name: "kube-proxy-abc".into(),
            node_name: Some("n1".into()),
            owner_kind: Some("DaemonSet".into()),
            mirror: false,
        };
        assert!(pod.is_node_bound());
        pod.owner_kind = Some("ReplicaSet".into());
        assert!(!pod.is_node_bound());
        pod.mirror = true;
        assert!(pod.is_node_bound());
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(split_api_version("litmuschaos.io/v1alpha1"), ("litmuschaos.io", "v1alpha1"));
        assert_eq!(split_api_version("v1"), ("", "v1"));
        assert_eq!(
            ResourceMapping::namespaced("", "v1", "ServiceAccount", "serviceaccounts").api_version(),
            "v1"
        );
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ClusterError::not_found("Pod", "x").is_not_found());
        assert!(ClusterError::Api { code: 404, message: String::new() }.is_not_found());
        assert!(!ClusterError::Api { code: 409, message: String::new() }.is_not_found());
    }
}
