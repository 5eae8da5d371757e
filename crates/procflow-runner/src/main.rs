use anyhow::{Context, Result};
use procflow_runner::{logging, RunnerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment variables
    let config = RunnerConfig::load();

    logging::init_logging(&config.log_filter).context("Failed to initialize logging")?;

    procflow_runner::run(config).await.context("Runner error")?;

    Ok(())
}
