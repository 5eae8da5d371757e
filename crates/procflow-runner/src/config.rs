//! Configuration for the Procflow runner
//!
//! Loaded from `PROCFLOW_*` environment variables. Process definitions may
//! be supplied as a YAML list in the file named by `PROCFLOW_DEFINITIONS`.

use anyhow::{Context, Result};
use procflow_core::{EngineConfig, ProcessDefinition};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Log filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// YAML file with process definitions to deploy at startup
    #[serde(default)]
    pub definitions_path: Option<PathBuf>,

    /// Whether to run the sample approval process
    #[serde(default = "default_run_sample")]
    pub run_sample: bool,

    /// Engine tunables
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_log_filter() -> String {
    "info,procflow_core=debug".to_string()
}

fn default_run_sample() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            definitions_path: None,
            run_sample: default_run_sample(),
            engine: EngineConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        let mut config = Self {
            engine: EngineConfig::from_env(),
            ..Self::default()
        };

        if let Ok(log_filter) = env::var("PROCFLOW_LOG_FILTER") {
            config.log_filter = log_filter;
        }

        if let Ok(path) = env::var("PROCFLOW_DEFINITIONS") {
            if path.trim().is_empty() {
                warn!("Ignoring empty PROCFLOW_DEFINITIONS value");
            } else {
                config.definitions_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(run_sample) = env::var("PROCFLOW_RUN_SAMPLE") {
            match run_sample.to_lowercase().as_str() {
                "true" | "1" => config.run_sample = true,
                "false" | "0" => config.run_sample = false,
                _ => warn!("Invalid PROCFLOW_RUN_SAMPLE value: {}", run_sample),
            }
        }

        config
    }

    /// Read the definitions file, if one is configured
    pub fn load_definitions(&self) -> Result<Vec<ProcessDefinition>> {
        let Some(path) = &self.definitions_path else {
            return Ok(Vec::new());
        };

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read definitions file {}", path.display()))?;
        let definitions = parse_definitions(&raw)
            .with_context(|| format!("Failed to parse definitions file {}", path.display()))?;

        info!(
            path = %path.display(),
            count = definitions.len(),
            "Loaded process definitions"
        );
        Ok(definitions)
    }
}

/// Parse a YAML list of process definitions
pub fn parse_definitions(raw: &str) -> Result<Vec<ProcessDefinition>> {
    let definitions: Vec<ProcessDefinition> = serde_yaml::from_str(raw)?;
    Ok(definitions)
}
