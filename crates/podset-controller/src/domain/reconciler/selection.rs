//! Scale-down victim selection

use k8s_openapi::api::core::v1::Pod;

/// Picks the single pod to delete when a PodSet has more active pods than desired.
pub trait VictimSelector: Send + Sync {
    /// Returns one pod of `active`, or `None` only when `active` is empty.
    fn select<'a>(&self, active: &'a [Pod]) -> Option<&'a Pod>;
}

/// Deletes the first active pod in list order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstListed;

impl VictimSelector for FirstListed {
    fn select<'a>(&self, active: &'a [Pod]) -> Option<&'a Pod> {
        active.first()
    }
}

/// Deletes the most recently created active pod; ties keep list order.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestFirst;

impl VictimSelector for NewestFirst {
    fn select<'a>(&self, active: &'a [Pod]) -> Option<&'a Pod> {
        active.iter().fold(None, |newest: Option<&Pod>, pod| match newest {
            Some(current) if created_at(pod) <= created_at(current) => Some(current),
            _ => Some(pod),
        })
    }
}

fn created_at(pod: &Pod) -> Option<chrono::DateTime<chrono::Utc>> {
    pod.metadata.creation_timestamp.as_ref().map(|time| time.0)
}

/// Victim selection policies selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VictimPolicy {
    /// First pod in list order
    First,
    /// Most recently created pod
    Newest,
}

impl VictimPolicy {
    pub fn selector(self) -> Box<dyn VictimSelector> {
        match self {
            VictimPolicy::First => Box::new(FirstListed),
            VictimPolicy::Newest => Box::new(NewestFirst),
        }
    }
}
