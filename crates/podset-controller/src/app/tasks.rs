use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::core::Application;
use crate::domain::dispatch::ResourceEvent;
use crate::infrastructure::k8s::Subscription;

/// Capacity of the channel between the watches and the controller.
const EVENT_CHANNEL_CAPACITY: usize = 256;
/// How long running reconcile steps get to finish after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    subscription: Option<Subscription>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            subscription: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Subscribes to resource events and starts the controller.
    pub fn spawn_all_tasks(&mut self, app: &Application) -> Result<()> {
        let (event_sender, event_receiver) = mpsc::channel::<ResourceEvent>(EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            namespace = app.run_args().namespace.as_deref().unwrap_or("<all>"),
            "Starting Kubernetes watches"
        );
        let subscription = app
            .services()
            .watcher
            .subscribe(event_sender, &self.cancellation_token);
        self.subscription = Some(subscription);

        let controller_task = self.spawn_controller_task(app, event_receiver);
        self.tasks.push(controller_task);

        Ok(())
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        let outcome = tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                Ok(())
            }
            // Wait for any task to complete unexpectedly
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, _index, _remaining) = result;
                match result {
                    Err(e) => {
                        tracing::error!("Task completed with error: {e}");
                        Err(e.into())
                    }
                    Ok(()) => {
                        tracing::warn!("Task completed unexpectedly");
                        Ok(())
                    }
                }
            }
        };

        self.cancellation_token.cancel();
        if let Some(subscription) = self.subscription.take() {
            subscription.stop().await;
        }
        self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;

        outcome
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                if task.is_finished() {
                    continue;
                }
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_controller_task(
        &self,
        app: &Application,
        event_receiver: mpsc::Receiver<ResourceEvent>,
    ) -> JoinHandle<()> {
        let controller = app.services().controller.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting PodSet controller task");
            controller.run(event_receiver, token).await;
            tracing::info!("PodSet controller task completed");
        })
    }
}
