use std::collections::BTreeMap;

use api_types::PodSet;
use api_types::PodSetStatus;
use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DeleteParams;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::api::PostParams;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use serde_json::json;
use serde_json::Value;
use tracing::debug;

use crate::domain::reconciler::ObjectKey;
use crate::domain::reconciler::ResourceStore;
use crate::domain::reconciler::StoreError;
use crate::domain::reconciler::StoreResult;

/// [`ResourceStore`] talking to the Kubernetes API server.
///
/// Every call goes to the API server; nothing is cached between calls.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn pod_sets(&self, namespace: &str) -> Api<PodSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn api_failure(operation: impl Into<String>) -> StoreError {
    StoreError::Api {
        message: operation.into(),
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> StoreResult<&'a str> {
    value.ok_or_else(|| Report::new(StoreError::InvalidObject { field }))
}

/// Merge patch replacing the status and pinning the resource version it was computed from.
fn status_patch(pod_set: &PodSet, status: &PodSetStatus) -> StoreResult<Value> {
    let status = serde_json::to_value(status).change_context(StoreError::Serialization {
        what: "PodSet status",
    })?;
    let mut patch = json!({ "status": status });
    if let Some(resource_version) = pod_set.resource_version() {
        patch["metadata"] = json!({ "resourceVersion": resource_version });
    }
    Ok(patch)
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_pod_set(&self, key: &ObjectKey) -> StoreResult<Option<PodSet>> {
        self.pod_sets(&key.namespace)
            .get_opt(&key.name)
            .await
            .change_context_lazy(|| api_failure(format!("get podsets {key}")))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>> {
        let selector = api_types::label_selector(labels);
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(&selector))
            .await
            .change_context_lazy(|| {
                api_failure(format!("list pods in {namespace} with selector {selector}"))
            })?;
        Ok(pods.items)
    }

    async fn update_status(&self, pod_set: &PodSet, status: &PodSetStatus) -> StoreResult<()> {
        let namespace = pod_set.namespace();
        let namespace = required(namespace.as_deref(), "metadata.namespace")?;
        let name = required(pod_set.metadata.name.as_deref(), "metadata.name")?;

        let patch = status_patch(pod_set, status)?;
        self.pod_sets(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .change_context_lazy(|| api_failure(format!("update status of podsets {namespace}/{name}")))?;
        Ok(())
    }

    async fn create_pod(&self, pod: &Pod) -> StoreResult<()> {
        let namespace = pod.namespace();
        let namespace = required(namespace.as_deref(), "metadata.namespace")?;

        let created = self
            .pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .change_context_lazy(|| api_failure(format!("create pod in {namespace}")))?;
        debug!(pod = %created.name_any(), namespace, "created pod");
        Ok(())
    }

    async fn delete_pod(&self, pod: &Pod) -> StoreResult<()> {
        let namespace = pod.namespace();
        let namespace = required(namespace.as_deref(), "metadata.namespace")?;
        let name = required(pod.metadata.name.as_deref(), "metadata.name")?;

        match self
            .pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if is_not_found(&error) => {
                debug!(pod = name, namespace, "pod already gone");
                Ok(())
            }
            Err(error) => Err(Report::new(error)
                .change_context(api_failure(format!("delete pod {namespace}/{name}")))),
        }
    }
}
