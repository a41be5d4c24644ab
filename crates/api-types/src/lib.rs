//! Shared API type definitions
//!
//! This crate holds the `PodSet` custom resource and the label contract that binds
//! a PodSet to the pods it manages. Both the controller and its tooling depend on it.

use std::collections::BTreeMap;

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Label carrying the owning PodSet's name.
pub const APP_LABEL: &str = "app";
/// Label carrying the instance template version.
pub const VERSION_LABEL: &str = "version";
/// Version tag stamped on every pod created for a PodSet.
pub const INSTANCE_VERSION: &str = "v1.0";

/// Desired state of a PodSet.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "batch.app.example.com",
    version = "v1",
    kind = "PodSet",
    namespaced,
    status = "PodSetStatus",
    shortname = "ps",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Current","type":"integer","jsonPath":".status.replicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodSetSpec {
    /// Number of active pods the PodSet should converge to
    pub replicas: u32,
}

/// Observed state of a PodSet, recomputed from live pods on every reconcile step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSetStatus {
    /// Number of active (pending or running, not terminating) pods
    pub replicas: u32,
    /// Names of the active pods, in the order the API server listed them
    #[serde(default)]
    pub pod_names: Vec<String>,
}

/// Label set stamped on, and used to select, the pods of the PodSet called `name`.
pub fn instance_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), name.to_string()),
        (VERSION_LABEL.to_string(), INSTANCE_VERSION.to_string()),
    ])
}

/// Renders a label set as an equality-based label selector, e.g. `app=web,version=v1.0`.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl PodSet {
    /// Labels of the pods owned by this PodSet.
    pub fn instance_labels(&self) -> BTreeMap<String, String> {
        instance_labels(&self.name_any())
    }

    /// Desired replica count.
    pub fn desired_replicas(&self) -> u32 {
        self.spec.replicas
    }

    /// Cached status, with an unset status reading as empty.
    pub fn observed_status(&self) -> PodSetStatus {
        self.status.clone().unwrap_or_default()
    }
}
