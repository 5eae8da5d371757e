//!
//! Procflow Runner - hosts the engine in a single process
//!
//! Deploys definitions from configuration and optionally runs the sample
//! approval process end to end.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Runner configuration
pub mod config;

/// Logging initialisation
pub mod logging;

/// Sample approval process
pub mod sample;

pub use config::RunnerConfig;

use anyhow::{Context, Result};
use procflow_core::ProcessEngine;
use tracing::info;

/// Build an in-memory engine and deploy the configured definitions
pub async fn build_engine(config: &RunnerConfig) -> Result<ProcessEngine> {
    let engine = ProcessEngine::in_memory(config.engine.clone());

    for definition in config.load_definitions()? {
        let name = definition.name.clone();
        engine
            .deploy_process(definition)
            .await
            .with_context(|| format!("Failed to deploy process definition {}", name))?;
    }

    Ok(engine)
}

/// Run the engine with the given configuration
pub async fn run(config: RunnerConfig) -> Result<()> {
    let engine = build_engine(&config).await?;

    let deployed = engine.list_process_definitions().await?;
    info!(count = deployed.len(), "Process definitions deployed");

    if config.run_sample {
        let report = sample::run_sample(&engine, true).await?;
        info!(
            instance_id = %report.instance_id.0,
            status = ?report.status,
            tasks = report.tasks.len(),
            "Sample approval process finished"
        );
    }

    Ok(())
}
