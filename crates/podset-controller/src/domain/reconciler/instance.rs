//! Pods as seen by the reconciler: activity filtering, owner binding and the pod template

use api_types::PodSet;
use api_types::PodSetStatus;
use error_stack::Report;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::ResourceExt;

use super::types::ObjectKey;
use super::types::ReconcileError;

const CONTAINER_NAME: &str = "busybox";
const CONTAINER_IMAGE: &str = "busybox";

/// Lifecycle phase reported by the kubelet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Phase of `pod`; a missing or unrecognised phase reads as `Unknown`.
    pub fn of(pod: &Pod) -> Self {
        match pod.status.as_ref().and_then(|status| status.phase.as_deref()) {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// A pod counts toward its PodSet when it is pending or running and not terminating.
pub fn is_active(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_none()
        && matches!(PodPhase::of(pod), PodPhase::Pending | PodPhase::Running)
}

/// Keeps the active pods, preserving list order.
pub fn active_pods(pods: Vec<Pod>) -> Vec<Pod> {
    pods.into_iter().filter(is_active).collect()
}

/// Status projection of an active pod set.
pub fn status_of(active: &[Pod]) -> PodSetStatus {
    let pod_names: Vec<String> = active.iter().map(ResourceExt::name_any).collect();
    PodSetStatus {
        replicas: u32::try_from(pod_names.len()).unwrap_or(u32::MAX),
        pod_names,
    }
}

/// Controller owner reference pointing at `pod_set`.
///
/// # Errors
///
/// - [`ReconcileError::Configuration`] if the PodSet has no name or uid yet
pub fn owner_reference(pod_set: &PodSet) -> Result<OwnerReference, Report<ReconcileError>> {
    let mut owner = pod_set.controller_owner_ref(&()).ok_or_else(|| {
        Report::new(ReconcileError::Configuration {
            message: format!(
                "PodSet {} has no name or uid to reference as owner",
                pod_set.name_any()
            ),
        })
    })?;
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

/// Key of the PodSet controlling `pod`, if any.
pub fn owner_key(pod: &Pod) -> Option<ObjectKey> {
    let namespace = pod.namespace()?;
    let kind = PodSet::kind(&());
    let group = PodSet::group(&());
    pod.owner_references()
        .iter()
        .find(|owner| {
            owner.controller == Some(true)
                && owner.kind == kind
                && owner.api_version.split('/').next() == Some(group.as_ref())
        })
        .map(|owner| ObjectKey::new(namespace, owner.name.clone()))
}

/// Builds a new pod for `pod_set`: generated name, owner labels and controller reference.
///
/// # Errors
///
/// - [`ReconcileError::Configuration`] if no owner reference can be built
pub fn new_pod_for(pod_set: &PodSet) -> Result<Pod, Report<ReconcileError>> {
    let owner = owner_reference(pod_set)?;
    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-pod", pod_set.name_any())),
            namespace: pod_set.namespace(),
            labels: Some(pod_set.instance_labels()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(CONTAINER_IMAGE.to_string()),
                command: Some(vec!["sleep".to_string(), "3600".to_string()]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: None,
    })
}
