use async_trait::async_trait;
use kcert_common::WorkloadRef;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ClusterClient, ClusterError, PodInfo, ResourceMapping, WorkloadReadiness};

/// One call received by [`FakeCluster`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    ReadReadiness(WorkloadRef),
    ListWorkloadPods(WorkloadRef),
    ReadPodLabels(WorkloadRef),
    ListNodePods(String),
    SetSchedulable {
        node: String,
        schedulable: bool,
    },
    DeletePod {
        namespace: String,
        name: String,
    },
    ResolveKind {
        api_version: String,
        kind: String,
    },
    Create {
        kind: String,
        namespace: Option<String>,
        name: String,
    },
    List {
        kind: String,
        namespace: Option<String>,
    },
    Get {
        kind: String,
        namespace: Option<String>,
        name: String,
    },
    Delete {
        kind: String,
        namespace: Option<String>,
        name: String,
    },
}

/// (kind, namespace, name)
type ObjectKey = (String, Option<String>, String);

#[derive(Debug, Default)]
struct FakeState {
    readiness: HashMap<WorkloadRef, VecDeque<Result<WorkloadReadiness, ClusterError>>>,
    pod_labels: HashMap<WorkloadRef, BTreeMap<String, String>>,
    pods: Vec<(Option<WorkloadRef>, PodInfo)>,
    unschedulable: HashSet<String>,
    cordon_failures: HashSet<String>,
    uncordon_failures: HashSet<String>,
    pod_delete_failures: HashSet<String>,
    node_pod_failures: HashSet<String>,
    kinds: HashMap<(String, String), ResourceMapping>,
    objects: BTreeMap<ObjectKey, Value>,
    create_failures: HashMap<String, ClusterError>,
    delete_failures: HashMap<String, ClusterError>,
    list_scripts: HashMap<String, VecDeque<Result<Vec<Value>, ClusterError>>>,
    get_scripts: HashMap<(String, String), VecDeque<Result<Value, ClusterError>>>,
    calls: Vec<FakeCall>,
}

/// Deterministic in-memory cluster for orchestrator and manager tests.
///
/// Scripted sequences are consumed FIFO; the last entry is sticky so a
/// workload scripted as `[degraded, ready]` stays ready afterwards.
#[derive(Debug, Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn injected(message: &str) -> ClusterError {
    ClusterError::Api {
        code: 500,
        message: message.to_string(),
    }
}

/// Pop the head of a script, keeping the final entry in place.
fn next_scripted<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

fn object_name(object: &Value) -> String {
    object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl FakeCluster {
    /// Empty cluster that knows the kinds the engine creates and reads.
    pub fn new() -> Self {
        let fake = Self {
            state: Arc::new(Mutex::new(FakeState::default())),
        };
        for (group, version, kind, plural) in [
            ("", "v1", "ServiceAccount", "serviceaccounts"),
            ("rbac.authorization.k8s.io", "v1", "Role", "roles"),
            ("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings"),
            ("litmuschaos.io", "v1alpha1", "ChaosEngine", "chaosengines"),
            ("litmuschaos.io", "v1alpha1", "ChaosExperiment", "chaosexperiments"),
            ("litmuschaos.io", "v1alpha1", "ChaosResult", "chaosresults"),
            ("operators.coreos.com", "v1alpha1", "ClusterServiceVersion", "clusterserviceversions"),
        ] {
            fake.register_kind(ResourceMapping::namespaced(group, version, kind, plural));
        }
        fake.register_kind(ResourceMapping {
            namespaced: false,
            ..ResourceMapping::namespaced("rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles")
        });
        fake
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake cluster mutex poisoned")
    }

    pub fn register_kind(&self, mapping: ResourceMapping) {
        self.lock()
            .kinds
            .insert((mapping.api_version(), mapping.kind.clone()), mapping);
    }

    /// Register a workload with a fixed readiness and pod-template labels.
    pub fn add_workload(
        &self,
        workload: &WorkloadRef,
        readiness: WorkloadReadiness,
        labels: &[(&str, &str)],
    ) {
        let mut state = self.lock();
        state
            .readiness
            .insert(workload.clone(), VecDeque::from([Ok(readiness)]));
        state.pod_labels.insert(
            workload.clone(),
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    /// Replace the readiness script of a workload.
    pub fn script_readiness(
        &self,
        workload: &WorkloadRef,
        script: Vec<Result<WorkloadReadiness, ClusterError>>,
    ) {
        self.lock()
            .readiness
            .insert(workload.clone(), script.into_iter().collect());
    }

    /// Schedule a pod of `workload` on `node`.
    pub fn add_pod(&self, workload: &WorkloadRef, name: &str, node: &str) {
        let pod = PodInfo {
            namespace: workload.namespace.clone(),
            name: name.to_string(),
            node_name: Some(node.to_string()),
            owner_kind: Some("ReplicaSet".to_string()),
            mirror: false,
        };
        self.lock().pods.push((Some(workload.clone()), pod));
    }

    /// Schedule a pod that belongs to no configured workload.
    pub fn add_node_pod(&self, pod: PodInfo) {
        self.lock().pods.push((None, pod));
    }

    pub fn fail_cordon(&self, node: &str) {
        self.lock().cordon_failures.insert(node.to_string());
    }

    pub fn fail_uncordon(&self, node: &str) {
        self.lock().uncordon_failures.insert(node.to_string());
    }

    /// Make listing the pods of `node` fail.
    pub fn fail_node_pods(&self, node: &str) {
        self.lock().node_pod_failures.insert(node.to_string());
    }

    pub fn fail_pod_delete(&self, name: &str) {
        self.lock().pod_delete_failures.insert(name.to_string());
    }

    pub fn fail_create(&self, kind: &str, error: ClusterError) {
        self.lock().create_failures.insert(kind.to_string(), error);
    }

    pub fn fail_delete(&self, kind: &str, error: ClusterError) {
        self.lock().delete_failures.insert(kind.to_string(), error);
    }

    /// Script `list_objects` results for a kind, ahead of the object store.
    pub fn script_list(&self, kind: &str, script: Vec<Result<Vec<Value>, ClusterError>>) {
        self.lock()
            .list_scripts
            .insert(kind.to_string(), script.into_iter().collect());
    }

    /// Script `get_object` results for one named object.
    pub fn script_get(&self, kind: &str, name: &str, script: Vec<Result<Value, ClusterError>>) {
        self.lock()
            .get_scripts
            .insert((kind.to_string(), name.to_string()), script.into_iter().collect());
    }

    /// Seed the object store directly.
    pub fn insert_object(&self, kind: &str, namespace: Option<&str>, object: Value) {
        let name = object_name(&object);
        self.lock().objects.insert(
            (kind.to_string(), namespace.map(str::to_string), name),
            object,
        );
    }

    // ── Inspection ──────────────────────────────────────────────────────

    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    pub fn is_schedulable(&self, node: &str) -> bool {
        !self.lock().unschedulable.contains(node)
    }

    /// Number of `set_node_schedulable(node, schedulable)` calls.
    pub fn schedulable_calls(&self, node: &str, schedulable: bool) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(c, FakeCall::SetSchedulable { node: n, schedulable: s }
                    if n == node && *s == schedulable)
            })
            .count()
    }

    pub fn deleted_pods(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                FakeCall::DeletePod { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn object(&self, kind: &str, namespace: Option<&str>, name: &str) -> Option<Value> {
        self.lock()
            .objects
            .get(&(kind.to_string(), namespace.map(str::to_string), name.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    fn record(state: &mut FakeState, call: FakeCall) {
        state.calls.push(call);
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn workload_readiness(
        &self,
        workload: &WorkloadRef,
    ) -> Result<WorkloadReadiness, ClusterError> {
        let mut state = self.lock();
        Self::record(&mut state, FakeCall::ReadReadiness(workload.clone()));
        state
            .readiness
            .get_mut(workload)
            .and_then(next_scripted)
            .unwrap_or_else(|| Err(ClusterError::not_found(workload.kind.as_kind(), &workload.name)))
    }

    async fn workload_pods(&self, workload: &WorkloadRef) -> Result<Vec<PodInfo>, ClusterError> {
        let mut state = self.lock();
        Self::record(&mut state, FakeCall::ListWorkloadPods(workload.clone()));
        if !state.readiness.contains_key(workload) {
            return Err(ClusterError::not_found(workload.kind.as_kind(), &workload.name));
        }
        Ok(state
            .pods
            .iter()
            .filter(|(owner, _)| owner.as_ref() == Some(workload))
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn workload_pod_labels(
        &self,
        workload: &WorkloadRef,
    ) -> Result<BTreeMap<String, String>, ClusterError> {
        let mut state = self.lock();
        Self::record(&mut state, FakeCall::ReadPodLabels(workload.clone()));
        state
            .pod_labels
            .get(workload)
            .cloned()
            .ok_or_else(|| ClusterError::not_found(workload.kind.as_kind(), &workload.name))
    }

    async fn node_pods(&self, node: &str) -> Result<Vec<PodInfo>, ClusterError> {
        let mut state = self.lock();
        Self::record(&mut state, FakeCall::ListNodePods(node.to_string()));
        if state.node_pod_failures.contains(node) {
            return Err(injected("pod list rejected"));
        }
        Ok(state
            .pods
            .iter()
            .filter(|(_, pod)| pod.node_name.as_deref() == Some(node))
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn set_node_schedulable(&self, node: &str, schedulable: bool) -> Result<(), ClusterError> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            FakeCall::SetSchedulable {
                node: node.to_string(),
                schedulable,
            },
        );
        let failures = if schedulable {
            &state.uncordon_failures
        } else {
            &state.cordon_failures
        };
        if failures.contains(node) {
            return Err(injected("node patch rejected"));
        }
        if schedulable {
            state.unschedulable.remove(node);
        } else {
            state.unschedulable.insert(node.to_string());
        }
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            FakeCall::DeletePod {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
        );
        if state.pod_delete_failures.contains(name) {
            return Err(injected("pod delete rejected"));
        }
        let before = state.pods.len();
        state
            .pods
            .retain(|(_, pod)| !(pod.namespace == namespace && pod.name == name));
        if state.pods.len() == before {
            return Err(ClusterError::not_found("Pod", name));
        }
        Ok(())
    }

    async fn resolve_kind(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<ResourceMapping, ClusterError> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            FakeCall::ResolveKind {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            },
        );
        state
            .kinds
            .get(&(api_version.to_string(), kind.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::not_found("kind", format!("{api_version} {kind}")))
    }

    async fn create_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<(), ClusterError> {
        let mut state = self.lock();
        let name = object_name(object);
        let namespace = namespace.map(str::to_string);
        Self::record(
            &mut state,
            FakeCall::Create {
                kind: mapping.kind.clone(),
                namespace: namespace.clone(),
                name: name.clone(),
            },
        );
        if let Some(err) = state.create_failures.get(&mapping.kind) {
            return Err(err.clone());
        }
        let key = (mapping.kind.clone(), namespace, name.clone());
        if state.objects.contains_key(&key) {
            return Err(ClusterError::Api {
                code: 409,
                message: format!("{} {name} already exists", mapping.kind),
            });
        }
        state.objects.insert(key, object.clone());
        Ok(())
    }

    async fn list_objects(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            FakeCall::List {
                kind: mapping.kind.clone(),
                namespace: namespace.map(str::to_string),
            },
        );
        if let Some(scripted) = state
            .list_scripts
            .get_mut(&mapping.kind)
            .and_then(next_scripted)
        {
            return scripted;
        }
        Ok(state
            .objects
            .iter()
            .filter(|((kind, ns, _), _)| {
                *kind == mapping.kind && (namespace.is_none() || ns.as_deref() == namespace)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn get_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, ClusterError> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            FakeCall::Get {
                kind: mapping.kind.clone(),
                namespace: namespace.map(str::to_string),
                name: name.to_string(),
            },
        );
        if let Some(scripted) = state
            .get_scripts
            .get_mut(&(mapping.kind.clone(), name.to_string()))
            .and_then(next_scripted)
        {
            return scripted;
        }
        state
            .objects
            .get(&(
                mapping.kind.clone(),
                namespace.map(str::to_string),
                name.to_string(),
            ))
            .cloned()
            .ok_or_else(|| ClusterError::not_found(&mapping.kind, name))
    }

    async fn delete_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut state = self.lock();
        let namespace = namespace.map(str::to_string);
        Self::record(
            &mut state,
            FakeCall::Delete {
                kind: mapping.kind.clone(),
                namespace: namespace.clone(),
                name: name.to_string(),
            },
        );
        if let Some(err) = state.delete_failures.get(&mapping.kind) {
            return Err(err.clone());
        }
        state
            .objects
            .remove(&(mapping.kind.clone(), namespace, name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found(&mapping.kind, name))
    }
}
