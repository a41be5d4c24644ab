use std::sync::Arc;

use anyhow::Result;

use crate::app::Application;
use crate::app::ApplicationServices;
use crate::config::ControllerConfig;
use crate::config::RunArgs;
use crate::domain::dispatch::Controller;
use crate::domain::reconciler::Reconciler;
use crate::infrastructure::k8s::KubeStore;
use crate::infrastructure::k8s::ResourceWatcher;
use crate::infrastructure::kube_client;

/// Application builder
pub struct ApplicationBuilder {
    run_args: RunArgs,
}

impl ApplicationBuilder {
    pub fn new(run_args: RunArgs) -> Self {
        Self { run_args }
    }

    /// Connects to the cluster and assembles the controller and its event source.
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let client = kube_client::init_kube_client(self.run_args.kubeconfig.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

        let config = ControllerConfig::from(&self.run_args);
        tracing::info!(
            workers = config.workers,
            requeue_after = ?config.requeue_after,
            call_timeout = ?config.call_timeout,
            victim_policy = ?config.victim_policy,
            "Controller configuration"
        );

        let store = Arc::new(KubeStore::new(client.clone()));
        let reconciler = Reconciler::new(store)
            .with_selector(config.victim_policy.selector())
            .with_call_timeout(config.call_timeout);

        let services = ApplicationServices {
            controller: Arc::new(Controller::new(reconciler, &config)),
            watcher: Arc::new(ResourceWatcher::new(
                client,
                self.run_args.namespace.clone(),
            )),
        };

        Ok(Application::new(services, self.run_args))
    }
}
