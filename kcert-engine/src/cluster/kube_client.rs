use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use kcert_common::labels::selector_query;
use kcert_common::{WorkloadKind, WorkloadRef};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiResource, Scope};
use kube::Client;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::debug;

use super::{
    ClusterClient, ClusterError, PodInfo, ResourceMapping, WorkloadReadiness, split_api_version,
};

const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

/// [`ClusterClient`] backed by a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from `KUBECONFIG` or the in-cluster service account.
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await.map_err(map_kube_error)?;
        Ok(Self::new(client))
    }

    fn dynamic_api(&self, mapping: &ResourceMapping, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = ApiResource {
            group: mapping.group.clone(),
            version: mapping.version.clone(),
            api_version: mapping.api_version(),
            kind: mapping.kind.clone(),
            plural: mapping.plural.clone(),
        };
        match namespace {
            Some(ns) if mapping.namespaced => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    /// `matchLabels` of the workload selector and the pod template labels.
    async fn workload_labels(
        &self,
        workload: &WorkloadRef,
    ) -> Result<(BTreeMap<String, String>, BTreeMap<String, String>), ClusterError> {
        let ns = workload.namespace.as_str();
        let name = workload.name.as_str();
        let kind = workload.kind.as_kind();

        let (selector, template) = match workload.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), ns);
                let dep = api.get(name).await.map_err(|e| map_get_error(e, kind, name))?;
                dep.spec
                    .map(|s| (s.selector.match_labels, s.template.metadata.and_then(|m| m.labels)))
                    .unwrap_or_default()
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
                let sts = api.get(name).await.map_err(|e| map_get_error(e, kind, name))?;
                sts.spec
                    .map(|s| (s.selector.match_labels, s.template.metadata.and_then(|m| m.labels)))
                    .unwrap_or_default()
            }
        };

        Ok((selector.unwrap_or_default(), template.unwrap_or_default()))
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn workload_readiness(
        &self,
        workload: &WorkloadRef,
    ) -> Result<WorkloadReadiness, ClusterError> {
        let ns = workload.namespace.as_str();
        let name = workload.name.as_str();
        let kind = workload.kind.as_kind();

        let readiness = match workload.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), ns);
                let dep = api.get(name).await.map_err(|e| map_get_error(e, kind, name))?;
                let desired = dep.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                let status = dep.status.unwrap_or_default();
                WorkloadReadiness {
                    desired,
                    ready: status.ready_replicas.unwrap_or(0),
                    available: status.available_replicas.unwrap_or(0),
                    updated: status.updated_replicas.unwrap_or(0),
                    unavailable: status.unavailable_replicas.unwrap_or(0),
                    current: 0,
                }
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
                let sts = api.get(name).await.map_err(|e| map_get_error(e, kind, name))?;
                let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                let status = sts.status.unwrap_or_default();
                let ready = status.ready_replicas.unwrap_or(0);
                WorkloadReadiness {
                    desired,
                    ready,
                    available: status.available_replicas.unwrap_or(0),
                    updated: status.updated_replicas.unwrap_or(0),
                    unavailable: (desired - ready).max(0),
                    current: status.current_replicas.unwrap_or(0),
                }
            }
        };

        debug!(workload = %workload, ?readiness, "Read workload readiness");
        Ok(readiness)
    }

    async fn workload_pods(&self, workload: &WorkloadRef) -> Result<Vec<PodInfo>, ClusterError> {
        let (selector, _) = self.workload_labels(workload).await?;
        if selector.is_empty() {
            return Ok(Vec::new());
        }

        let api: Api<Pod> = Api::namespaced(self.client.clone(), &workload.namespace);
        let params = ListParams::default().labels(&selector_query(&selector));
        let pods = api.list(&params).await.map_err(map_kube_error)?;
        Ok(pods.items.iter().map(pod_info).collect())
    }

    async fn workload_pod_labels(
        &self,
        workload: &WorkloadRef,
    ) -> Result<BTreeMap<String, String>, ClusterError> {
        let (_, template) = self.workload_labels(workload).await?;
        Ok(template)
    }

    async fn node_pods(&self, node: &str) -> Result<Vec<PodInfo>, ClusterError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={node}"));
        let pods = api.list(&params).await.map_err(map_kube_error)?;
        Ok(pods.items.iter().map(pod_info).collect())
    }

    async fn set_node_schedulable(&self, node: &str, schedulable: bool) -> Result<(), ClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = json!({ "spec": { "unschedulable": !schedulable } });
        api.patch(node, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_get_error(e, "Node", node))?;
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_get_error(e, "Pod", name))?;
        Ok(())
    }

    async fn resolve_kind(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<ResourceMapping, ClusterError> {
        let (group, version) = split_api_version(api_version);
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let (ar, caps) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|e| match e {
                kube::Error::Discovery(_) => ClusterError::not_found("kind", format!("{api_version} {kind}")),
                other => map_kube_error(other),
            })?;

        Ok(ResourceMapping {
            group: ar.group,
            version: ar.version,
            kind: ar.kind,
            plural: ar.plural,
            namespaced: matches!(caps.scope, Scope::Namespaced),
        })
    }

    async fn create_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<(), ClusterError> {
        let obj: DynamicObject = serde_json::from_value(object.clone())
            .map_err(|e| ClusterError::Decode(e.to_string()))?;
        self.dynamic_api(mapping, namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(map_kube_error)?;
        Ok(())
    }

    async fn list_objects(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError> {
        let list = self
            .dynamic_api(mapping, namespace)
            .list(&ListParams::default())
            .await
            .map_err(map_kube_error)?;
        list.items
            .into_iter()
            .map(|o| serde_json::to_value(o).map_err(|e| ClusterError::Decode(e.to_string())))
            .collect()
    }

    async fn get_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, ClusterError> {
        let obj = self
            .dynamic_api(mapping, namespace)
            .get(name)
            .await
            .map_err(|e| map_get_error(e, &mapping.kind, name))?;
        serde_json::to_value(obj).map_err(|e| ClusterError::Decode(e.to_string()))
    }

    async fn delete_object(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.dynamic_api(mapping, namespace)
            .delete(name, &DeleteParams::foreground())
            .await
            .map_err(|e| map_get_error(e, &mapping.kind, name))?;
        Ok(())
    }
}

fn pod_info(pod: &Pod) -> PodInfo {
    let meta = &pod.metadata;
    PodInfo {
        namespace: meta.namespace.clone().unwrap_or_default(),
        name: meta.name.clone().unwrap_or_default(),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        owner_kind: meta.owner_references.as_ref().and_then(|refs| {
            refs.iter()
                .find(|r| r.controller == Some(true))
                .map(|r| r.kind.clone())
        }),
        mirror: meta
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(MIRROR_POD_ANNOTATION)),
    }
}

fn map_kube_error(err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(ae) => ClusterError::Api {
            code: ae.code,
            message: ae.message,
        },
        kube::Error::SerdeError(e) => ClusterError::Decode(e.to_string()),
        other => ClusterError::Transport(other.to_string()),
    }
}

/// Like [`map_kube_error`], naming the object on 404.
fn map_get_error(err: kube::Error, kind: &str, name: &str) -> ClusterError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => ClusterError::not_found(kind, name),
        other => map_kube_error(other),
    }
}
