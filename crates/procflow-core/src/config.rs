//! Engine configuration
//!
//! Values come from serde (file/embedded config) or from `PROCFLOW_*`
//! environment variables via [`EngineConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::domain::process_definition::TaskType;

/// Tunables for the flow executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on node executions in a single executor run
    #[serde(default = "default_max_steps_per_run")]
    pub max_steps_per_run: usize,

    /// Task type used when a TASK node has no `task_type` property
    #[serde(default = "default_task_type")]
    pub default_task_type: TaskType,
}

fn default_max_steps_per_run() -> usize {
    10_000
}

fn default_task_type() -> TaskType {
    TaskType::UserTask
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: default_max_steps_per_run(),
            default_task_type: default_task_type(),
        }
    }
}

impl EngineConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(max_steps) = env::var("PROCFLOW_MAX_STEPS") {
            match max_steps.parse::<usize>() {
                Ok(steps) if steps > 0 => config.max_steps_per_run = steps,
                _ => warn!("Invalid PROCFLOW_MAX_STEPS value: {}", max_steps),
            }
        }

        if let Ok(task_type) = env::var("PROCFLOW_DEFAULT_TASK_TYPE") {
            match TaskType::from_str(&task_type) {
                Ok(task_type) => config.default_task_type = task_type,
                Err(_) => warn!("Invalid PROCFLOW_DEFAULT_TASK_TYPE value: {}", task_type),
            }
        }

        config
    }

    /// Set the step budget
    pub fn with_max_steps_per_run(mut self, max_steps: usize) -> Self {
        self.max_steps_per_run = max_steps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_steps_per_run, 10_000);
        assert_eq!(config.default_task_type, TaskType::UserTask);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_value(json!({"default_task_type": "service_task"})).unwrap();
        assert_eq!(config.max_steps_per_run, 10_000);
        assert_eq!(config.default_task_type, TaskType::ServiceTask);
    }
}
