use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::events::ResourceEvent;
use super::queue::WorkQueue;
use crate::config::ControllerConfig;
use crate::domain::reconciler::Action;
use crate::domain::reconciler::ObjectKey;
use crate::domain::reconciler::Reconciler;
use crate::domain::reconciler::ResourceStore;

/// Runs the reconciler from a fixed pool of workers fed by a [`WorkQueue`].
///
/// Keys come from resource events and from requeues. The queue guarantees that a
/// key is held by at most one worker, so steps for one PodSet never overlap while
/// different PodSets are reconciled concurrently.
pub struct Controller<S> {
    reconciler: Arc<Reconciler<S>>,
    queue: Arc<WorkQueue<ObjectKey>>,
    workers: usize,
    requeue_after: Duration,
}

impl<S: ResourceStore + 'static> Controller<S> {
    pub fn new(reconciler: Reconciler<S>, config: &ControllerConfig) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            queue: Arc::new(WorkQueue::new(config.backoff)),
            workers: config.workers.max(1),
            requeue_after: config.requeue_after,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    pub fn reconciler(&self) -> &Arc<Reconciler<S>> {
        &self.reconciler
    }

    /// Routes `event` to the key of the PodSet it concerns.
    pub fn enqueue(&self, event: &ResourceEvent) {
        match event.key() {
            Some(key) => {
                debug!(%key, event = event.describe(), "enqueueing PodSet");
                self.queue.add(key);
            }
            None => debug!(event = event.describe(), "event not tied to a PodSet, ignoring"),
        }
    }

    /// Processes events and queued keys until `cancellation_token` fires.
    ///
    /// On cancellation the queue is shut down; workers finish their current step and
    /// exit before this returns.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<ResourceEvent>,
        cancellation_token: CancellationToken,
    ) {
        info!(workers = self.workers, "Starting PodSet controller");

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(worker(
                id,
                Arc::clone(&self.reconciler),
                Arc::clone(&self.queue),
                self.requeue_after,
            ));
        }

        let mut events_open = true;
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Controller shutdown requested");
                    break;
                }
                event = events.recv(), if events_open => {
                    match event {
                        Some(event) => self.enqueue(&event),
                        None => {
                            warn!("Event channel closed, continuing with queued keys only");
                            events_open = false;
                        }
                    }
                }
            }
        }

        self.queue.shut_down();
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Controller worker failed: {e}");
            }
        }
        info!("PodSet controller stopped");
    }
}

async fn worker<S: ResourceStore>(
    id: usize,
    reconciler: Arc<Reconciler<S>>,
    queue: Arc<WorkQueue<ObjectKey>>,
    requeue_after: Duration,
) {
    debug!(worker = id, "worker started");
    while let Some(key) = queue.get().await {
        match reconciler.reconcile(&key).await {
            Ok(Action::Requeue) => {
                queue.forget(&key);
                queue.add_after(key.clone(), requeue_after);
            }
            Ok(Action::AwaitChange) => queue.forget(&key),
            Err(report) => {
                let retry_in = queue.add_rate_limited(key.clone());
                error!(
                    worker = id,
                    %key,
                    kind = %report.current_context(),
                    retry_in = ?retry_in,
                    "Reconcile failed: {report:?}"
                );
            }
        }
        queue.done(&key);
    }
    debug!(worker = id, "worker stopped");
}
