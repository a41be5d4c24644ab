//! In-memory store implementing [`ResourceStore`]
//!
//! Keeps PodSets and pods in process memory, records every call it serves and can be
//! told to fail or stall specific operations. Used by unit and integration tests.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use api_types::PodSet;
use api_types::PodSetStatus;
use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use super::instance::PodPhase;
use super::traits::ResourceStore;
use super::traits::StoreError;
use super::traits::StoreResult;
use super::types::ObjectKey;

/// Store operations that can be failed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Get,
    List,
    UpdateStatus,
    Create,
    Delete,
}

/// A call served by the [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(ObjectKey),
    List { namespace: String, selector: String },
    UpdateStatus { key: ObjectKey, status: PodSetStatus },
    Create { namespace: String, generate_name: String },
    Delete { namespace: String, name: String },
}

impl StoreCall {
    pub fn operation(&self) -> StoreOperation {
        match self {
            StoreCall::Get(_) => StoreOperation::Get,
            StoreCall::List { .. } => StoreOperation::List,
            StoreCall::UpdateStatus { .. } => StoreOperation::UpdateStatus,
            StoreCall::Create { .. } => StoreOperation::Create,
            StoreCall::Delete { .. } => StoreOperation::Delete,
        }
    }
}

#[derive(Default)]
struct StoreState {
    pod_sets: BTreeMap<ObjectKey, PodSet>,
    pods: Vec<Pod>,
    calls: Vec<StoreCall>,
    failing: HashSet<StoreOperation>,
    latency: Option<Duration>,
    revision: u64,
}

impl StoreState {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn check(&self, operation: StoreOperation) -> StoreResult<()> {
        if self.failing.contains(&operation) {
            return Err(Report::new(StoreError::Api {
                message: format!("injected {operation:?} failure"),
            }));
        }
        Ok(())
    }
}

/// In-memory [`ResourceStore`] with call recording and failure injection.
///
/// Pods are listed in insertion order. Created pods get a generated name, a uid, a
/// creation timestamp that increases with every create, and phase `Pending`.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces a PodSet, assigning a uid and resource version when missing.
    pub fn insert_pod_set(&self, pod_set: PodSet) -> ObjectKey {
        self.store_pod_set(pod_set, true)
    }

    /// Inserts or replaces a PodSet keeping its uid as given, possibly none.
    pub fn insert_pod_set_without_uid(&self, mut pod_set: PodSet) -> ObjectKey {
        pod_set.metadata.uid = None;
        self.store_pod_set(pod_set, false)
    }

    fn store_pod_set(&self, mut pod_set: PodSet, assign_uid: bool) -> ObjectKey {
        let mut state = self.state();
        let revision = state.next_revision();
        let namespace = pod_set.namespace().unwrap_or_else(|| "default".to_string());
        pod_set.metadata.namespace = Some(namespace.clone());
        if assign_uid {
            pod_set
                .metadata
                .uid
                .get_or_insert_with(|| format!("podset-uid-{revision}"));
        }
        pod_set.metadata.resource_version = Some(revision.to_string());

        let key = ObjectKey::new(namespace, pod_set.name_any());
        state.pod_sets.insert(key.clone(), pod_set);
        key
    }

    pub fn remove_pod_set(&self, key: &ObjectKey) -> Option<PodSet> {
        self.state().pod_sets.remove(key)
    }

    pub fn pod_set(&self, key: &ObjectKey) -> Option<PodSet> {
        self.state().pod_sets.get(key).cloned()
    }

    /// Changes the desired replica count of a stored PodSet.
    pub fn set_replicas(&self, key: &ObjectKey, replicas: u32) {
        if let Some(pod_set) = self.state().pod_sets.get_mut(key) {
            pod_set.spec.replicas = replicas;
        }
    }

    /// Appends a pod to the end of the list order.
    pub fn insert_pod(&self, pod: Pod) {
        self.state().pods.push(pod);
    }

    /// All stored pods of `namespace`, in list order.
    pub fn pods(&self, namespace: &str) -> Vec<Pod> {
        self.state()
            .pods
            .iter()
            .filter(|pod| pod.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect()
    }

    /// Names of the stored pods of `namespace`, in list order.
    pub fn pod_names(&self, namespace: &str) -> Vec<String> {
        self.pods(namespace).iter().map(ResourceExt::name_any).collect()
    }

    pub fn set_phase(&self, namespace: &str, name: &str, phase: PodPhase) {
        let mut state = self.state();
        if let Some(pod) = find_pod_mut(&mut state.pods, namespace, name) {
            pod.status.get_or_insert_with(PodStatus::default).phase = Some(phase.to_string());
        }
    }

    /// Marks a pod as terminating without removing it.
    pub fn mark_terminating(&self, namespace: &str, name: &str) {
        let mut state = self.state();
        if let Some(pod) = find_pod_mut(&mut state.pods, namespace, name) {
            pod.metadata.deletion_timestamp = Some(Time(Utc::now()));
        }
    }

    /// Makes every following call of `operation` fail until [`InMemoryStore::recover`].
    pub fn fail(&self, operation: StoreOperation) {
        self.state().failing.insert(operation);
    }

    pub fn recover(&self, operation: StoreOperation) {
        self.state().failing.remove(&operation);
    }

    /// Delays every call by `latency` before it is served.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<StoreCall> {
        std::mem::take(&mut self.state().calls)
    }

    async fn stall(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn find_pod_mut<'a>(pods: &'a mut [Pod], namespace: &str, name: &str) -> Option<&'a mut Pod> {
    pods.iter_mut().find(|pod| {
        pod.namespace().as_deref() == Some(namespace) && pod.metadata.name.as_deref() == Some(name)
    })
}

fn matches_labels(pod: &Pod, labels: &BTreeMap<String, String>) -> bool {
    let pod_labels = pod.labels();
    labels
        .iter()
        .all(|(key, value)| pod_labels.get(key) == Some(value))
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_pod_set(&self, key: &ObjectKey) -> StoreResult<Option<PodSet>> {
        self.stall().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Get(key.clone()));
        state.check(StoreOperation::Get)?;
        Ok(state.pod_sets.get(key).cloned())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>> {
        self.stall().await;
        let mut state = self.state();
        state.calls.push(StoreCall::List {
            namespace: namespace.to_string(),
            selector: api_types::label_selector(labels),
        });
        state.check(StoreOperation::List)?;
        Ok(state
            .pods
            .iter()
            .filter(|pod| pod.namespace().as_deref() == Some(namespace))
            .filter(|pod| matches_labels(pod, labels))
            .cloned()
            .collect())
    }

    async fn update_status(&self, pod_set: &PodSet, status: &PodSetStatus) -> StoreResult<()> {
        self.stall().await;
        let mut state = self.state();
        let key = ObjectKey::for_resource(pod_set).ok_or_else(|| {
            Report::new(StoreError::InvalidObject {
                field: "metadata.name or metadata.namespace",
            })
        })?;
        state.calls.push(StoreCall::UpdateStatus {
            key: key.clone(),
            status: status.clone(),
        });
        state.check(StoreOperation::UpdateStatus)?;

        let revision = state.next_revision();
        let stored = state.pod_sets.get_mut(&key).ok_or_else(|| {
            Report::new(StoreError::Api {
                message: format!("podsets {key} not found"),
            })
        })?;
        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(revision.to_string());
        Ok(())
    }

    async fn create_pod(&self, pod: &Pod) -> StoreResult<()> {
        self.stall().await;
        let mut state = self.state();
        let namespace = pod.namespace().ok_or_else(|| {
            Report::new(StoreError::InvalidObject {
                field: "metadata.namespace",
            })
        })?;
        let generate_name = pod.metadata.generate_name.clone().unwrap_or_default();
        state.calls.push(StoreCall::Create {
            namespace: namespace.clone(),
            generate_name: generate_name.clone(),
        });
        state.check(StoreOperation::Create)?;

        let revision = state.next_revision();
        let mut created = pod.clone();
        created
            .metadata
            .name
            .get_or_insert_with(|| format!("{generate_name}{revision:05x}"));
        created.metadata.uid = Some(format!("pod-uid-{revision}"));
        created.metadata.resource_version = Some(revision.to_string());
        created.metadata.creation_timestamp = Utc
            .timestamp_opt(1_700_000_000 + i64::try_from(revision).unwrap_or(i64::MAX), 0)
            .single()
            .map(Time);
        created.status = Some(PodStatus {
            phase: Some(PodPhase::Pending.to_string()),
            ..Default::default()
        });
        state.pods.push(created);
        Ok(())
    }

    async fn delete_pod(&self, pod: &Pod) -> StoreResult<()> {
        self.stall().await;
        let mut state = self.state();
        let namespace = pod.namespace().ok_or_else(|| {
            Report::new(StoreError::InvalidObject {
                field: "metadata.namespace",
            })
        })?;
        let name = pod.metadata.name.clone().ok_or_else(|| {
            Report::new(StoreError::InvalidObject {
                field: "metadata.name",
            })
        })?;
        state.calls.push(StoreCall::Delete {
            namespace: namespace.clone(),
            name: name.clone(),
        });
        state.check(StoreOperation::Delete)?;

        state.pods.retain(|stored| {
            stored.namespace().as_deref() != Some(namespace.as_str())
                || stored.metadata.name.as_deref() != Some(name.as_str())
        });
        Ok(())
    }
}
