use anyhow::Result;
use clap::Parser;
use podset_controller::cmd;
use podset_controller::config::Cli;
use podset_controller::config::Commands;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(run_args) => cmd::run_controller(*run_args).await,
        Commands::Crd => cmd::print_crd(),
        Commands::Pods(pods_args) => cmd::list_pods(pods_args).await,
    }
}
