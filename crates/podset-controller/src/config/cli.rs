use clap::{Parser, Subcommand};
use utils::version;

use crate::config::pods::PodsArgs;
use crate::config::run::RunArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the PodSet controller until interrupted
    Run(Box<RunArgs>),
    /// Print the PodSet custom resource definition as YAML
    Crd,
    /// List the pods selected by a PodSet
    Pods(PodsArgs),
}
