use std::sync::Arc;

use crate::domain::dispatch::Controller;
use crate::infrastructure::k8s::KubeStore;
use crate::infrastructure::k8s::ResourceWatcher;

/// Application dependencies - simple struct with Arc-wrapped services
pub struct ApplicationServices {
    pub controller: Arc<Controller<KubeStore>>,
    pub watcher: Arc<ResourceWatcher>,
}
