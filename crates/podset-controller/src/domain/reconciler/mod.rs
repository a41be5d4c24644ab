//! PodSet reconciliation
//!
//! A reconcile step reads a PodSet and its live pods, refreshes the PodSet status and
//! takes at most one corrective action: delete one pod or create one pod. The dispatch
//! harness calls it again until the active pod count matches the desired count.

pub mod instance;
pub mod mock;
pub mod selection;
pub mod traits;
pub mod types;

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use kube::ResourceExt;
use tracing::debug;
use tracing::info;

pub use instance::PodPhase;
pub use mock::InMemoryStore;
pub use selection::FirstListed;
pub use selection::NewestFirst;
pub use selection::VictimPolicy;
pub use selection::VictimSelector;
pub use traits::ResourceStore;
pub use traits::StoreError;
pub use traits::StoreResult;
pub use types::Action;
pub use types::ObjectKey;
pub use types::ReconcileError;

/// Default deadline for a single store call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Corrective action chosen by comparing active and desired pod counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ScaleDown,
    ScaleUp,
    Hold,
}

impl Decision {
    pub fn from_counts(actual: u32, desired: u32) -> Self {
        match actual.cmp(&desired) {
            Ordering::Greater => Decision::ScaleDown,
            Ordering::Less => Decision::ScaleUp,
            Ordering::Equal => Decision::Hold,
        }
    }
}

/// Drives PodSets toward their desired replica count, one step per call.
pub struct Reconciler<S> {
    store: Arc<S>,
    selector: Box<dyn VictimSelector>,
    call_timeout: Duration,
}

impl<S: ResourceStore> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            selector: Box::new(FirstListed),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_selector(mut self, selector: Box<dyn VictimSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runs one reconcile step for the PodSet at `key`.
    ///
    /// Returns [`Action::AwaitChange`] when the PodSet no longer exists and
    /// [`Action::Requeue`] after every other successful step.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Fetch`] if the PodSet can't be read
    /// - [`ReconcileError::List`] if its pods can't be listed
    /// - [`ReconcileError::StatusUpdate`] if a changed status can't be persisted
    /// - [`ReconcileError::Delete`] / [`ReconcileError::Create`] if the corrective action fails
    /// - [`ReconcileError::Configuration`] if a new pod can't be bound to the PodSet
    ///
    /// No corrective action is attempted once an earlier stage has failed.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action, Report<ReconcileError>> {
        let Some(pod_set) = self
            .bounded(self.store.get_pod_set(key))
            .await
            .change_context(ReconcileError::Fetch)?
        else {
            debug!("PodSet not found, nothing to reconcile");
            return Ok(Action::AwaitChange);
        };

        let labels = pod_set.instance_labels();
        let pods = self
            .bounded(self.store.list_pods(&key.namespace, &labels))
            .await
            .change_context(ReconcileError::List)
            .attach_printable_lazy(|| {
                format!("selector: {}", api_types::label_selector(&labels))
            })?;

        let active = instance::active_pods(pods);
        let status = instance::status_of(&active);
        if status != pod_set.observed_status() {
            debug!(replicas = status.replicas, pods = ?status.pod_names, "updating PodSet status");
            self.bounded(self.store.update_status(&pod_set, &status))
                .await
                .change_context(ReconcileError::StatusUpdate)?;
        }

        let desired = pod_set.desired_replicas();
        match Decision::from_counts(status.replicas, desired) {
            Decision::ScaleDown => {
                let victim = self.selector.select(&active).ok_or_else(|| {
                    Report::new(ReconcileError::Configuration {
                        message: "victim selector returned no pod".to_string(),
                    })
                })?;
                info!(
                    desired,
                    actual = status.replicas,
                    pod = %victim.name_any(),
                    "deleting a pod from the PodSet"
                );
                self.bounded(self.store.delete_pod(victim))
                    .await
                    .change_context(ReconcileError::Delete)
                    .attach_printable_lazy(|| format!("pod: {}", victim.name_any()))?;
            }
            Decision::ScaleUp => {
                let pod = instance::new_pod_for(&pod_set)?;
                info!(
                    desired,
                    actual = status.replicas,
                    "adding a pod to the PodSet"
                );
                self.bounded(self.store.create_pod(&pod))
                    .await
                    .change_context(ReconcileError::Create)?;
            }
            Decision::Hold => {
                debug!(desired, "PodSet is at its desired replica count");
            }
        }

        Ok(Action::Requeue)
    }

    /// Applies the per-call deadline to a store call.
    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Report::new(StoreError::Timeout {
                millis: self.call_timeout.as_millis(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use api_types::PodSet;
    use api_types::PodSetSpec;
    use api_types::PodSetStatus;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::mock::StoreCall;
    use super::mock::StoreOperation;
    use super::*;

    const NAMESPACE: &str = "default";

    fn store_with(replicas: u32) -> (Arc<InMemoryStore>, ObjectKey) {
        let store = Arc::new(InMemoryStore::new());
        let mut pod_set = PodSet::new("web", PodSetSpec { replicas });
        pod_set.metadata.namespace = Some(NAMESPACE.to_string());
        let key = store.insert_pod_set(pod_set);
        (store, key)
    }

    fn running_pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                labels: Some(api_types::instance_labels("web")),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
        }
    }

    fn operations(calls: &[StoreCall]) -> Vec<StoreOperation> {
        calls.iter().map(StoreCall::operation).collect()
    }

    fn status(names: &[&str]) -> PodSetStatus {
        PodSetStatus {
            replicas: names.len() as u32,
            pod_names: names.iter().map(|name| name.to_string()).collect(),
        }
    }

    #[test]
    fn decision_from_counts() {
        assert_eq!(Decision::from_counts(2, 1), Decision::ScaleDown);
        assert_eq!(Decision::from_counts(0, 3), Decision::ScaleUp);
        assert_eq!(Decision::from_counts(2, 2), Decision::Hold);
    }

    #[test(tokio::test)]
    async fn scale_up_records_status_before_creating() {
        let (store, key) = store_with(3);
        store.insert_pod(running_pod("x"));
        let reconciler = Reconciler::new(store.clone());

        let action = reconciler.reconcile(&key).await.expect("step succeeds");

        assert_eq!(action, Action::Requeue);
        let calls = store.calls();
        assert_eq!(
            operations(&calls),
            vec![
                StoreOperation::Get,
                StoreOperation::List,
                StoreOperation::UpdateStatus,
                StoreOperation::Create,
            ]
        );
        assert_eq!(
            calls[2],
            StoreCall::UpdateStatus {
                key: key.clone(),
                status: status(&["x"]),
            }
        );
        assert_eq!(store.pods(NAMESPACE).len(), 2);
    }

    #[test(tokio::test)]
    async fn scale_down_deletes_first_listed_pod() {
        let (store, key) = store_with(1);
        store.insert_pod(running_pod("p1"));
        store.insert_pod(running_pod("p2"));
        let reconciler = Reconciler::new(store.clone());

        let action = reconciler.reconcile(&key).await.expect("step succeeds");

        assert_eq!(action, Action::Requeue);
        let calls = store.calls();
        assert_eq!(
            calls[2],
            StoreCall::UpdateStatus {
                key: key.clone(),
                status: status(&["p1", "p2"]),
            }
        );
        assert_eq!(
            calls[3],
            StoreCall::Delete {
                namespace: NAMESPACE.to_string(),
                name: "p1".to_string(),
            }
        );
        assert_eq!(calls.len(), 4);
        assert_eq!(store.pod_names(NAMESPACE), vec!["p2".to_string()]);
    }

    #[test(tokio::test)]
    async fn scale_down_skips_inactive_head() {
        let (store, key) = store_with(1);
        store.insert_pod(running_pod("gone"));
        store.mark_terminating(NAMESPACE, "gone");
        store.insert_pod(running_pod("p1"));
        store.insert_pod(running_pod("p2"));
        let reconciler = Reconciler::new(store.clone());

        reconciler.reconcile(&key).await.expect("step succeeds");

        assert_eq!(
            store.calls().last(),
            Some(&StoreCall::Delete {
                namespace: NAMESPACE.to_string(),
                name: "p1".to_string(),
            })
        );
    }

    #[test(tokio::test)]
    async fn steady_state_is_a_no_op() {
        let (store, key) = store_with(2);
        store.insert_pod(running_pod("p1"));
        store.insert_pod(running_pod("p2"));
        let reconciler = Reconciler::new(store.clone());

        reconciler.reconcile(&key).await.expect("first step");
        store.take_calls();

        let action = reconciler.reconcile(&key).await.expect("second step");
        assert_eq!(action, Action::Requeue);
        assert_eq!(
            operations(&store.calls()),
            vec![StoreOperation::Get, StoreOperation::List]
        );
    }

    #[test(tokio::test)]
    async fn empty_status_matches_unset_status() {
        let (store, key) = store_with(0);
        let reconciler = Reconciler::new(store.clone());

        let action = reconciler.reconcile(&key).await.expect("step succeeds");

        assert_eq!(action, Action::Requeue);
        assert_eq!(
            operations(&store.calls()),
            vec![StoreOperation::Get, StoreOperation::List]
        );
    }

    #[test(tokio::test)]
    async fn missing_pod_set_stops_without_further_calls() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = Reconciler::new(store.clone());
        let key = ObjectKey::new(NAMESPACE, "absent");

        let action = reconciler.reconcile(&key).await.expect("not found is clean");

        assert_eq!(action, Action::AwaitChange);
        assert!(!action.requeue());
        assert_eq!(store.calls(), vec![StoreCall::Get(key)]);
    }

    #[test(tokio::test)]
    async fn fetch_failure_is_reported() {
        let (store, key) = store_with(1);
        store.fail(StoreOperation::Get);
        let reconciler = Reconciler::new(store.clone());

        let report = reconciler.reconcile(&key).await.expect_err("get fails");

        assert_eq!(report.current_context(), &ReconcileError::Fetch);
        assert_eq!(operations(&store.calls()), vec![StoreOperation::Get]);
    }

    #[test(tokio::test)]
    async fn list_failure_takes_no_action() {
        let (store, key) = store_with(3);
        store.fail(StoreOperation::List);
        let reconciler = Reconciler::new(store.clone());

        let report = reconciler.reconcile(&key).await.expect_err("list fails");

        assert_eq!(report.current_context(), &ReconcileError::List);
        assert_eq!(
            operations(&store.calls()),
            vec![StoreOperation::Get, StoreOperation::List]
        );
        assert!(store.pods(NAMESPACE).is_empty());
    }

    #[test(tokio::test)]
    async fn status_failure_takes_no_action() {
        let (store, key) = store_with(3);
        store.insert_pod(running_pod("x"));
        store.fail(StoreOperation::UpdateStatus);
        let reconciler = Reconciler::new(store.clone());

        let report = reconciler.reconcile(&key).await.expect_err("status fails");

        assert_eq!(report.current_context(), &ReconcileError::StatusUpdate);
        assert_eq!(store.pods(NAMESPACE).len(), 1);
    }

    #[test(tokio::test)]
    async fn create_and_delete_failures_are_typed() {
        let (store, key) = store_with(2);
        store.insert_pod(running_pod("p1"));
        store.fail(StoreOperation::Create);
        let reconciler = Reconciler::new(store.clone());

        let report = reconciler.reconcile(&key).await.expect_err("create fails");
        assert_eq!(report.current_context(), &ReconcileError::Create);

        store.set_replicas(&key, 0);
        store.fail(StoreOperation::Delete);
        let report = reconciler.reconcile(&key).await.expect_err("delete fails");
        assert_eq!(report.current_context(), &ReconcileError::Delete);
        assert_eq!(store.pod_names(NAMESPACE), vec!["p1".to_string()]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn slow_store_call_times_out() {
        let (store, key) = store_with(1);
        store.set_latency(Some(Duration::from_secs(30)));
        let reconciler = Reconciler::new(store.clone()).with_call_timeout(Duration::from_secs(1));

        let report = reconciler.reconcile(&key).await.expect_err("get times out");

        assert_eq!(report.current_context(), &ReconcileError::Fetch);
        assert!(store.calls().is_empty());
    }

    #[test(tokio::test)]
    async fn newest_first_policy_is_pluggable() {
        let (store, key) = store_with(0);
        let reconciler = Reconciler::new(store.clone()).with_selector(VictimPolicy::Newest.selector());

        store.set_replicas(&key, 2);
        reconciler.reconcile(&key).await.expect("create first");
        reconciler.reconcile(&key).await.expect("create second");
        let names = store.pod_names(NAMESPACE);
        assert_eq!(names.len(), 2);

        store.set_replicas(&key, 1);
        reconciler.reconcile(&key).await.expect("delete newest");
        assert_eq!(store.pod_names(NAMESPACE), vec![names[0].clone()]);
    }

    #[test(tokio::test)]
    async fn converges_in_distance_steps() {
        for (initial, desired) in [(0_u32, 3_u32), (4, 1), (2, 2), (5, 0)] {
            let (store, key) = store_with(desired);
            for i in 0..initial {
                store.insert_pod(running_pod(&format!("seed-{i}")));
            }
            let reconciler = Reconciler::new(store.clone());

            for _ in 0..initial.abs_diff(desired) {
                reconciler.reconcile(&key).await.expect("step succeeds");
            }
            assert_eq!(store.pods(NAMESPACE).len(), desired as usize);

            // one more step settles the status, after which steps are read-only
            reconciler.reconcile(&key).await.expect("settling step");
            store.take_calls();
            reconciler.reconcile(&key).await.expect("fixed point");
            assert_eq!(
                operations(&store.calls()),
                vec![StoreOperation::Get, StoreOperation::List],
                "initial={initial} desired={desired}"
            );
            let stored = store.pod_set(&key).expect("pod set");
            assert_eq!(stored.observed_status().replicas, desired);
        }
    }

    #[test(tokio::test)]
    async fn each_step_mutates_at_most_once() {
        let (store, key) = store_with(4);
        let reconciler = Reconciler::new(store.clone());

        for _ in 0..6 {
            store.take_calls();
            reconciler.reconcile(&key).await.expect("step succeeds");
            let mutations = store
                .calls()
                .iter()
                .filter(|call| {
                    matches!(
                        call.operation(),
                        StoreOperation::Create | StoreOperation::Delete
                    )
                })
                .count();
            assert!(mutations <= 1);
        }
        assert_eq!(store.pods(NAMESPACE).len(), 4);
    }

    #[test(tokio::test)]
    async fn pod_set_without_uid_cannot_own_pods() {
        let store = Arc::new(InMemoryStore::new());
        let mut pod_set = PodSet::new("web", PodSetSpec { replicas: 2 });
        pod_set.metadata.namespace = Some(NAMESPACE.to_string());
        let key = store.insert_pod_set_without_uid(pod_set);
        let reconciler = Reconciler::new(store.clone());

        let report = reconciler.reconcile(&key).await.expect_err("no owner uid");
        assert!(matches!(
            report.current_context(),
            ReconcileError::Configuration { .. }
        ));
        assert!(!operations(&store.calls()).contains(&StoreOperation::Create));
        assert!(store.pods(NAMESPACE).is_empty());
    }
}
