//!
//! Procflow Core - process orchestration engine
//!
//! This crate defines the domain model of process definitions, instances
//! and tasks, the storage contracts, and the engine that walks instances
//! through their graph.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - process models, events and repository contracts
pub mod domain;

/// Application services - executor and engine
pub mod application;

/// Engine configuration
pub mod config;

/// Core types
pub mod types;

/// Error types
pub mod error;

// Re-export key types
pub use config::EngineConfig;
pub use error::CoreError;
pub use types::Variables;

// Re-export main API types for easy use
pub use application::engine::ProcessEngine;
pub use application::flow_executor::{
    DomainEventHandler, ExecutionOutcome, FlowExecutor, LoggingEventHandler,
};
pub use domain::condition::{ConditionEvaluator, IndexConditionEvaluator};
pub use domain::events::DomainEvent;
pub use domain::process_definition::{
    Node, NodeType, ProcessDefinition, ProcessDefinitionId, TaskType,
};
pub use domain::process_instance::{InstanceStatus, ProcessInstance, ProcessInstanceId, Token};
pub use domain::repository::{DefinitionRepository, InstanceRepository};
pub use domain::task::{Task, TaskId, TaskStatus};
