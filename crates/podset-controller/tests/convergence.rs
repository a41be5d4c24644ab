use std::sync::Arc;
use std::time::Duration;

use api_types::PodSet;
use api_types::PodSetSpec;
use podset_controller::config::ControllerConfig;
use podset_controller::dispatch::events::ObjectEvent;
use podset_controller::dispatch::Backoff;
use podset_controller::dispatch::Controller;
use podset_controller::dispatch::ResourceEvent;
use podset_controller::reconciler::mock::StoreCall;
use podset_controller::reconciler::InMemoryStore;
use podset_controller::reconciler::ObjectKey;
use podset_controller::reconciler::PodPhase;
use podset_controller::reconciler::Reconciler;
use podset_controller::reconciler::VictimPolicy;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const NAMESPACE: &str = "default";

struct Harness {
    store: Arc<InMemoryStore>,
    events: mpsc::Sender<ResourceEvent>,
    token: CancellationToken,
    run: JoinHandle<()>,
}

impl Harness {
    fn start(policy: VictimPolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let config = ControllerConfig {
            workers: 3,
            requeue_after: Duration::from_millis(20),
            backoff: Backoff::new(Duration::from_millis(5), Duration::from_millis(50)),
            victim_policy: policy,
            ..ControllerConfig::default()
        };
        let reconciler = Reconciler::new(store.clone())
            .with_selector(config.victim_policy.selector())
            .with_call_timeout(config.call_timeout);
        let controller = Controller::new(reconciler, &config);

        let (events, receiver) = mpsc::channel(32);
        let token = CancellationToken::new();
        let run = {
            let token = token.clone();
            tokio::spawn(async move { controller.run(receiver, token).await })
        };

        Self {
            store,
            events,
            token,
            run,
        }
    }

    async fn apply(&self, name: &str, replicas: u32) -> ObjectKey {
        let key = ObjectKey::new(NAMESPACE, name);
        let pod_set = match self.store.pod_set(&key) {
            Some(_) => {
                self.store.set_replicas(&key, replicas);
                self.store.pod_set(&key)
            }
            None => {
                let mut pod_set = PodSet::new(name, PodSetSpec { replicas });
                pod_set.metadata.namespace = Some(NAMESPACE.to_string());
                self.store.insert_pod_set(pod_set);
                self.store.pod_set(&key)
            }
        };
        if let Some(pod_set) = pod_set {
            self.send(ResourceEvent::PodSet(ObjectEvent::Applied(pod_set)))
                .await;
        }
        key
    }

    async fn send(&self, event: ResourceEvent) {
        self.events.send(event).await.expect("controller receives events");
    }

    fn active_count(&self, key: &ObjectKey) -> Option<u32> {
        self.store
            .pod_set(key)
            .map(|pod_set| pod_set.observed_status().replicas)
    }

    async fn wait_for(&self, key: &ObjectKey, replicas: u32) {
        let converged = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let pods = self.store.pods(NAMESPACE);
                let owned = pods
                    .iter()
                    .filter(|pod| {
                        pod.metadata
                            .generate_name
                            .as_deref()
                            .is_some_and(|prefix| prefix == format!("{}-pod", key.name))
                    })
                    .count();
                if self.active_count(key) == Some(replicas) && owned == replicas as usize {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            converged.is_ok(),
            "{key} did not converge to {replicas}, status {:?}",
            self.active_count(key)
        );
    }

    async fn stop(self) -> Arc<InMemoryStore> {
        self.token.cancel();
        self.run.await.expect("controller task");
        self.store
    }
}

#[test_log::test(tokio::test)]
async fn scales_up_and_down_through_events() {
    let harness = Harness::start(VictimPolicy::First);

    let web = harness.apply("web", 3).await;
    harness.wait_for(&web, 3).await;

    harness.apply("web", 1).await;
    harness.wait_for(&web, 1).await;

    let store = harness.stop().await;
    assert_eq!(store.pods(NAMESPACE).len(), 1);
}

#[test_log::test(tokio::test)]
async fn finished_pods_are_replaced() {
    let harness = Harness::start(VictimPolicy::First);
    let web = harness.apply("web", 2).await;
    harness.wait_for(&web, 2).await;

    let finished = harness.store.pod_names(NAMESPACE)[0].clone();
    harness
        .store
        .set_phase(NAMESPACE, &finished, PodPhase::Succeeded);
    let pod = harness
        .store
        .pods(NAMESPACE)
        .into_iter()
        .find(|pod| pod.metadata.name.as_deref() == Some(finished.as_str()))
        .expect("finished pod");
    harness
        .send(ResourceEvent::Pod(ObjectEvent::Applied(pod)))
        .await;

    let converged = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = harness
                .store
                .pod_set(&web)
                .map(|pod_set| pod_set.observed_status());
            if let Some(status) = status {
                if status.replicas == 2 && !status.pod_names.contains(&finished) {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(converged.is_ok(), "finished pod was not replaced");

    let store = harness.stop().await;
    // the finished pod stays behind, cleanup is the garbage collector's job
    assert_eq!(store.pods(NAMESPACE).len(), 3);
}

#[test_log::test(tokio::test)]
async fn deleted_pod_set_is_not_requeued() {
    let harness = Harness::start(VictimPolicy::Newest);
    let web = harness.apply("web", 1).await;
    harness.wait_for(&web, 1).await;

    let removed = harness.store.remove_pod_set(&web).expect("stored pod set");
    harness
        .send(ResourceEvent::PodSet(ObjectEvent::Deleted(removed)))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.store.take_calls();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let store = harness.stop().await;
    assert!(
        store
            .calls()
            .iter()
            .all(|call| !matches!(call, StoreCall::Get(key) if *key == web)),
        "deleted PodSet kept being reconciled"
    );
}

#[test_log::test(tokio::test)]
async fn pod_sets_converge_independently() {
    let harness = Harness::start(VictimPolicy::Newest);

    let keys = [
        harness.apply("alpha", 2).await,
        harness.apply("beta", 0).await,
        harness.apply("gamma", 4).await,
    ];
    for (key, replicas) in keys.iter().zip([2, 0, 4]) {
        harness.wait_for(key, replicas).await;
    }

    let store = harness.stop().await;
    assert_eq!(store.pods(NAMESPACE).len(), 6);
}
