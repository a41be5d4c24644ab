use clap::Parser;
use std::path::PathBuf;

use crate::domain::reconciler::VictimPolicy;

#[derive(Parser, Clone)]
pub struct RunArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "PODSET_NAMESPACE",
        help = "Namespace to watch (empty for all namespaces)"
    )]
    pub namespace: Option<String>,

    #[arg(
        long,
        env = "PODSET_WORKERS",
        default_value = "2",
        help = "Number of concurrent reconcile workers"
    )]
    pub workers: usize,

    #[arg(
        long,
        default_value = "1000",
        help = "Delay before re-running a successful reconcile step, in milliseconds"
    )]
    pub requeue_after_ms: u64,

    #[arg(
        long,
        default_value = "5",
        help = "Initial retry delay after a failed reconcile step, in milliseconds"
    )]
    pub backoff_base_ms: u64,

    #[arg(
        long,
        default_value = "60000",
        help = "Upper bound of the retry delay after repeated failures, in milliseconds"
    )]
    pub backoff_max_ms: u64,

    #[arg(
        long,
        default_value = "10000",
        help = "Deadline for each Kubernetes API call made by a reconcile step, in milliseconds"
    )]
    pub call_timeout_ms: u64,

    #[arg(
        long,
        value_enum,
        default_value_t = VictimPolicy::First,
        help = "Which pod to remove when a PodSet has too many"
    )]
    pub victim_policy: VictimPolicy,

    #[arg(
        long,
        env = "PODSET_LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this file, rotated daily"
    )]
    pub log_file: Option<PathBuf>,
}
