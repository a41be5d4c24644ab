//! Kubernetes integration module.
//!
//! - [`KubeStore`]: [`ResourceStore`](crate::domain::reconciler::ResourceStore) backed by the API server
//! - [`ResourceWatcher`]: cancellable watch subscriptions for PodSets and their pods
//! - [`KubernetesError`]: connection and watch failures

pub mod store;
pub mod types;
pub mod watcher;

pub use store::KubeStore;
pub use types::KubernetesError;
pub use watcher::ResourceWatcher;
pub use watcher::Subscription;
