//! Traits for reading and mutating cluster state

use core::error::Error;
use std::collections::BTreeMap;

use api_types::PodSet;
use api_types::PodSetStatus;
use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;

use super::types::ObjectKey;

/// Result type for store calls.
pub type StoreResult<T> = Result<T, Report<StoreError>>;

/// Errors returned by a [`ResourceStore`].
#[derive(Debug, derive_more::Display)]
pub enum StoreError {
    #[display("API request failed: {message}")]
    Api { message: String },
    #[display("Store call timed out after {millis}ms")]
    Timeout { millis: u128 },
    #[display("Failed to serialize {what}")]
    Serialization { what: &'static str },
    #[display("Object is missing {field}")]
    InvalidObject { field: &'static str },
}

impl Error for StoreError {}

/// Typed access to PodSets and their pods.
///
/// Implementations never cache: every call observes the current state of the store.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a PodSet. `Ok(None)` means it does not exist.
    async fn get_pod_set(&self, key: &ObjectKey) -> StoreResult<Option<PodSet>>;

    /// List the pods in `namespace` carrying every label in `labels`, in store order.
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>>;

    /// Replace the status of `pod_set` without touching its spec.
    async fn update_status(&self, pod_set: &PodSet, status: &PodSetStatus) -> StoreResult<()>;

    /// Create a pod. The pod may carry `generateName` instead of a name.
    async fn create_pod(&self, pod: &Pod) -> StoreResult<()>;

    /// Delete a pod. Deleting a pod that is already gone succeeds.
    async fn delete_pod(&self, pod: &Pod) -> StoreResult<()>;
}
