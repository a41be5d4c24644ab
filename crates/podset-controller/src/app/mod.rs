//! Application module
//!
//! Wiring and lifecycle of the `run` command: the builder connects to the cluster
//! and assembles the services, the task manager runs them until a shutdown signal.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use core::Application;
pub use services::ApplicationServices;
