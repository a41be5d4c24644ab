use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct PodsArgs {
    #[arg(long, help = "PodSet name")]
    pub name: String,

    #[arg(
        long,
        env = "PODSET_NAMESPACE",
        help = "PodSet namespace (defaults to the kubeconfig context namespace)"
    )]
    pub namespace: Option<String>,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,
}
