use std::fmt::Debug;
use std::time::Duration;

use api_types::PodSet;
use api_types::INSTANCE_VERSION;
use api_types::VERSION_LABEL;
use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher;
use kube::runtime::watcher::Config;
use kube::Api;
use kube::Client;
use kube::Resource;
use serde::de::DeserializeOwned;
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::dispatch::events::ObjectEvent;
use crate::domain::dispatch::events::WatchedResource;
use crate::domain::dispatch::ResourceEvent;
use crate::infrastructure::k8s::types::KubernetesError;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Watches PodSets and the pods they own, turning changes into [`ResourceEvent`]s.
pub struct ResourceWatcher {
    client: Client,
    namespace: Option<String>,
    retry_delay: Duration,
}

/// Running watch tasks started by [`ResourceWatcher::subscribe`].
///
/// Dropping a subscription leaves its tasks running until the parent token is
/// cancelled; call [`Subscription::stop`] to end them early.
pub struct Subscription {
    cancellation_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    /// Cancels the watches and waits for their streams to be released.
    pub async fn stop(self) {
        self.cancellation_token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Watch task failed during shutdown: {e}");
            }
        }
    }
}

impl ResourceWatcher {
    /// Watches every namespace when `namespace` is `None`.
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self {
            client,
            namespace,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// Starts one watch for PodSets and one for pods carrying the instance version
    /// label. Events are sent to `sender` until `cancellation_token` (or the
    /// subscription itself) is cancelled, or the receiver is dropped.
    #[tracing::instrument(skip_all, fields(namespace = ?self.namespace))]
    pub fn subscribe(
        &self,
        sender: mpsc::Sender<ResourceEvent>,
        cancellation_token: &CancellationToken,
    ) -> Subscription {
        let cancellation_token = cancellation_token.child_token();
        let pod_selector = format!("{VERSION_LABEL}={INSTANCE_VERSION}");

        let pod_sets = tokio::spawn(watch_loop(
            self.api::<PodSet>(),
            Config::default(),
            sender.clone(),
            cancellation_token.clone(),
            self.retry_delay,
        ));
        let pods = tokio::spawn(watch_loop(
            self.api::<Pod>(),
            Config::default().labels(&pod_selector),
            sender,
            cancellation_token.clone(),
            self.retry_delay,
        ));
        info!(%pod_selector, "Subscribed to PodSet and pod events");

        Subscription {
            cancellation_token,
            tasks: vec![pod_sets, pods],
        }
    }
}

/// Flattens a watcher event into per-object changes; a restart re-applies every object.
fn object_events<K>(event: watcher::Event<K>) -> Vec<ObjectEvent<K>> {
    match event {
        watcher::Event::Applied(object) => vec![ObjectEvent::Applied(object)],
        watcher::Event::Deleted(object) => vec![ObjectEvent::Deleted(object)],
        watcher::Event::Restarted(objects) => {
            objects.into_iter().map(ObjectEvent::Applied).collect()
        }
    }
}

async fn watch_loop<K>(
    api: Api<K>,
    config: Config,
    sender: mpsc::Sender<ResourceEvent>,
    cancellation_token: CancellationToken,
    retry_delay: Duration,
) where
    K: Resource + WatchedResource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    info!(kind = %kind, "Starting watch");
    loop {
        select! {
            _ = cancellation_token.cancelled() => {
                info!(kind = %kind, "Watch shutdown requested");
                break;
            }
            result = watch(api.clone(), config.clone(), &sender, &kind) => {
                if sender.is_closed() {
                    info!(kind = %kind, "Event receiver dropped, stopping watch");
                    break;
                }
                match result {
                    Ok(()) => warn!(kind = %kind, "Watch stream ended unexpectedly, restarting..."),
                    Err(e) => {
                        error!(kind = %kind, "Watch failed: {e:?}");
                        select! {
                            _ = cancellation_token.cancelled() => break,
                            _ = tokio::time::sleep(retry_delay) => {}
                        }
                    }
                }
            }
        }
    }
}

async fn watch<K>(
    api: Api<K>,
    config: Config,
    sender: &mpsc::Sender<ResourceEvent>,
    kind: &str,
) -> Result<(), Report<KubernetesError>>
where
    K: Resource + WatchedResource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let mut stream = watcher(api, config).boxed();

    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| {
            Report::new(KubernetesError::WatchFailed {
                kind: kind.to_string(),
                message: format!("Watch stream error: {e}"),
            })
        })?;
        for change in object_events(event) {
            if sender.send(K::into_event(change)).await.is_err() {
                return Ok(());
            }
        }
    }

    Ok(())
}
