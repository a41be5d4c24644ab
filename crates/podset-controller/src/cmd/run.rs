use anyhow::Result;
use utils::logging;
use utils::version;

use crate::app::ApplicationBuilder;
use crate::config::RunArgs;

pub async fn run_controller(run_args: RunArgs) -> Result<()> {
    let _guard = logging::init(run_args.log_file.as_deref());

    tracing::info!("Starting PodSet controller {}", &**version::VERSION);

    let app = ApplicationBuilder::new(run_args).build().await?;

    app.run().await?;
    app.shutdown().await?;

    Ok(())
}
