use thiserror::Error;

/// Core error type for the Procflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Definition, instance or task id unknown
    #[error("{0} not found")]
    NotFound(String),

    /// A definition with the same id is already deployed
    #[error("Duplicate process definition: {0}")]
    DuplicateDefinition(String),

    /// Graph validation failed at deploy time
    #[error("Invalid process definition: {0}")]
    InvalidDefinition(String),

    /// Malformed node configuration discovered while executing an instance
    #[error("Invalid node {node_id} in instance {instance_id}: {reason}")]
    InvalidNode {
        /// Instance that was suspended
        instance_id: String,
        /// Offending node
        node_id: String,
        /// What is wrong with it
        reason: String,
    },

    /// An edge points at a node the definition does not contain
    #[error("Node {node_id} not found while executing instance {instance_id}")]
    NodeNotFound {
        /// Instance that was suspended
        instance_id: String,
        /// Missing node
        node_id: String,
    },

    /// A single executor run exceeded the configured step budget
    #[error("Instance {instance_id} exceeded {limit} steps in a single run")]
    StepLimitExceeded {
        /// Instance that was suspended
        instance_id: String,
        /// Configured limit
        limit: usize,
    },

    /// Operation not allowed in the current task or instance state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Domain event delivery failed
    #[error("Event handler error: {0}")]
    EventHandlerError(String),
}

impl CoreError {
    /// Whether this error, raised mid-execution, leaves the instance SUSPENDED
    pub fn suspends_instance(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidNode { .. }
                | CoreError::NodeNotFound { .. }
                | CoreError::StepLimitExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (CoreError::NotFound("task t1".to_string()), "task t1 not found"),
            (
                CoreError::DuplicateDefinition("def1".to_string()),
                "Duplicate process definition: def1",
            ),
            (
                CoreError::InvalidDefinition("no start".to_string()),
                "Invalid process definition: no start",
            ),
            (
                CoreError::InvalidNode {
                    instance_id: "i1".to_string(),
                    node_id: "join_1".to_string(),
                    reason: "missing expects".to_string(),
                },
                "Invalid node join_1 in instance i1: missing expects",
            ),
            (
                CoreError::NodeNotFound {
                    instance_id: "i1".to_string(),
                    node_id: "ghost".to_string(),
                },
                "Node ghost not found while executing instance i1",
            ),
            (
                CoreError::StepLimitExceeded {
                    instance_id: "i1".to_string(),
                    limit: 10,
                },
                "Instance i1 exceeded 10 steps in a single run",
            ),
            (CoreError::InvalidState("done".to_string()), "Invalid state: done"),
            (CoreError::StateStoreError("db".to_string()), "State store error: db"),
            (
                CoreError::EventHandlerError("sink".to_string()),
                "Event handler error: sink",
            ),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_suspending_errors() {
        assert!(CoreError::NodeNotFound {
            instance_id: "i".to_string(),
            node_id: "n".to_string(),
        }
        .suspends_instance());
        assert!(!CoreError::InvalidState("x".to_string()).suspends_instance());
        assert!(!CoreError::NotFound("x".to_string()).suspends_instance());
    }
}
