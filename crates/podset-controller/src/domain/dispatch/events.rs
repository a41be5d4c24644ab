use api_types::PodSet;
use k8s_openapi::api::core::v1::Pod;

use crate::domain::reconciler::instance;
use crate::domain::reconciler::ObjectKey;

/// Change observed on a watched object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent<K> {
    /// Created, modified, or seen again after the watch restarted.
    Applied(K),
    Deleted(K),
}

impl<K> ObjectEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            ObjectEvent::Applied(object) | ObjectEvent::Deleted(object) => object,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, ObjectEvent::Deleted(_))
    }
}

/// Typed event delivered by the watch subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    PodSet(ObjectEvent<PodSet>),
    Pod(ObjectEvent<Pod>),
}

impl ResourceEvent {
    /// PodSet key the event should wake up.
    ///
    /// A PodSet maps to itself. A pod maps to the PodSet named by its controller
    /// owner reference; pods without one are ignored.
    pub fn key(&self) -> Option<ObjectKey> {
        match self {
            ResourceEvent::PodSet(event) => ObjectKey::for_resource(event.object()),
            ResourceEvent::Pod(event) => instance::owner_key(event.object()),
        }
    }

    /// Short description for logs, e.g. `Pod applied`.
    pub fn describe(&self) -> &'static str {
        match self {
            ResourceEvent::PodSet(ObjectEvent::Applied(_)) => "PodSet applied",
            ResourceEvent::PodSet(ObjectEvent::Deleted(_)) => "PodSet deleted",
            ResourceEvent::Pod(ObjectEvent::Applied(_)) => "Pod applied",
            ResourceEvent::Pod(ObjectEvent::Deleted(_)) => "Pod deleted",
        }
    }
}

/// Watched resource kinds that can be turned into a [`ResourceEvent`].
pub trait WatchedResource: Sized {
    fn into_event(event: ObjectEvent<Self>) -> ResourceEvent;
}

impl WatchedResource for PodSet {
    fn into_event(event: ObjectEvent<Self>) -> ResourceEvent {
        ResourceEvent::PodSet(event)
    }
}

impl WatchedResource for Pod {
    fn into_event(event: ObjectEvent<Self>) -> ResourceEvent {
        ResourceEvent::Pod(event)
    }
}
