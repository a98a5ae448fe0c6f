//! The `run` command: start the pipeline and wait for ctrl-c.

use tokio::signal;
use tracing::info;

use crate::app::config::Config;
use crate::app::Orchestrator;
use crate::core::shutdown::ShutdownController;
use crate::error::Result;

pub async fn run(config: Config) -> Result<()> {
    config.logging.init();
    info!("parlay starting");

    let (controller, token) = ShutdownController::new();
    let pipeline = tokio::spawn(Orchestrator::run(config, token));

    match signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => info!(error = %e, "signal handler failed, shutting down"),
    }
    controller.shutdown();

    pipeline
        .await
        .map_err(|e| crate::error::Error::Internal(format!("pipeline task panicked: {e}")))??;
    info!("parlay stopped");
    Ok(())
}
