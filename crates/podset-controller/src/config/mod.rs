pub mod cli;
pub mod pods;
pub mod run;

use std::time::Duration;

use crate::domain::dispatch::Backoff;
use crate::domain::reconciler::VictimPolicy;

/// Controller tuning passed from the `run` CLI to the dispatch harness and reconciler.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of worker tasks pulling keys from the queue.
    pub workers: usize,
    /// Delay before a successfully reconciled key is looked at again.
    pub requeue_after: Duration,
    /// Per-key retry delays after failed steps.
    pub backoff: Backoff,
    /// Deadline applied to every store call.
    pub call_timeout: Duration,
    /// Scale-down victim selection.
    pub victim_policy: VictimPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            requeue_after: Duration::from_secs(1),
            backoff: Backoff::default(),
            call_timeout: Duration::from_secs(10),
            victim_policy: VictimPolicy::First,
        }
    }
}

impl From<&run::RunArgs> for ControllerConfig {
    fn from(args: &run::RunArgs) -> Self {
        Self {
            workers: args.workers.max(1),
            requeue_after: Duration::from_millis(args.requeue_after_ms),
            backoff: Backoff::new(
                Duration::from_millis(args.backoff_base_ms),
                Duration::from_millis(args.backoff_max_ms),
            ),
            call_timeout: Duration::from_millis(args.call_timeout_ms.max(1)),
            victim_policy: args.victim_policy,
        }
    }
}

pub use cli::*;
pub use pods::*;
pub use run::*;

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn run_args_convert_to_controller_config() {
        let cli = Cli::parse_from([
            "podset-controller",
            "run",
            "--workers",
            "0",
            "--requeue-after-ms",
            "250",
            "--backoff-base-ms",
            "10",
            "--backoff-max-ms",
            "80",
            "--victim-policy",
            "newest",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };

        let config = ControllerConfig::from(args.as_ref());
        assert_eq!(config.workers, 1);
        assert_eq!(config.requeue_after, Duration::from_millis(250));
        assert_eq!(config.backoff, Backoff::new(Duration::from_millis(10), Duration::from_millis(80)));
        assert_eq!(config.victim_policy, VictimPolicy::Newest);
    }

    #[test]
    fn pods_requires_name() {
        assert!(Cli::try_parse_from(["podset-controller", "pods"]).is_err());
    }
}
