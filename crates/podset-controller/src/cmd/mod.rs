//! Command layer - Entry points for the controller subcommands

pub mod crd;
pub mod pods;
pub mod run;

pub use crd::print_crd;
pub use pods::list_pods;
pub use run::run_controller;
