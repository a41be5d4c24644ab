use core::error::Error;

use kube::Resource;
use kube::ResourceExt;

/// Namespace + name of a PodSet: the unit of work handed to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{namespace}/{name}")]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced object, `None` for objects without a name or namespace.
    pub fn for_resource<K: Resource>(object: &K) -> Option<Self> {
        let name = object.meta().name.clone()?;
        let namespace = object.namespace()?;
        Some(Self { namespace, name })
    }
}

/// What the dispatch harness should do with a key after a successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run the key again after the requeue interval.
    Requeue,
    /// The object is gone; wait for a new event before looking at the key again.
    AwaitChange,
}

impl Action {
    pub fn requeue(self) -> bool {
        matches!(self, Action::Requeue)
    }
}

/// Why a reconcile step stopped. Every variant is retried by the dispatch harness.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ReconcileError {
    #[display("Failed to fetch PodSet")]
    Fetch,
    #[display("Failed to list pods")]
    List,
    #[display("Failed to update PodSet status")]
    StatusUpdate,
    #[display("Failed to create pod")]
    Create,
    #[display("Failed to delete pod")]
    Delete,
    #[display("Invalid PodSet configuration: {message}")]
    Configuration { message: String },
}

impl Error for ReconcileError {}
