//! Dispatch harness: turns resource events into keys and runs the reconciler on them
//!
//! - [`WorkQueue`]: deduplicating key queue with delayed and rate-limited adds
//! - [`Controller`]: fixed worker pool calling the reconciler, one step per key at a time
//! - [`ResourceEvent`]: typed watch events and their routing to PodSet keys

pub mod backoff;
pub mod controller;
pub mod events;
pub mod queue;

pub use backoff::Backoff;
pub use controller::Controller;
pub use events::ResourceEvent;
pub use queue::WorkQueue;
