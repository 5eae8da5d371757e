use crate::domain::process_definition::ProcessDefinitionId;
use crate::domain::process_instance::ProcessInstanceId;
use crate::domain::task::TaskId;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Domain event trait for all events in the system
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the process instance ID this event is associated with
    fn instance_id(&self) -> &ProcessInstanceId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

macro_rules! domain_event {
    ($event:ty, $name:literal) => {
        impl DomainEvent for $event {
            fn event_type(&self) -> &'static str {
                $name
            }

            fn instance_id(&self) -> &ProcessInstanceId {
                &self.instance_id
            }

            fn timestamp(&self) -> DateTime<Utc> {
                self.timestamp
            }
        }
    };
}

/// Event: Process instance started
#[derive(Debug)]
pub struct ProcessInstanceStarted {
    /// The started instance
    pub instance_id: ProcessInstanceId,
    /// The definition it executes
    pub definition_id: ProcessDefinitionId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceStarted, "process_instance.started");

/// Event: Process instance completed
#[derive(Debug)]
pub struct ProcessInstanceCompleted {
    /// The completed instance
    pub instance_id: ProcessInstanceId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceCompleted, "process_instance.completed");

/// Event: Process instance suspended for operator intervention
#[derive(Debug)]
pub struct ProcessInstanceSuspended {
    /// The suspended instance
    pub instance_id: ProcessInstanceId,
    /// Why it was suspended
    pub reason: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceSuspended, "process_instance.suspended");

/// Event: Suspended process instance resumed
#[derive(Debug)]
pub struct ProcessInstanceResumed {
    /// The resumed instance
    pub instance_id: ProcessInstanceId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceResumed, "process_instance.resumed");

/// Event: Process instance terminated
#[derive(Debug)]
pub struct ProcessInstanceTerminated {
    /// The terminated instance
    pub instance_id: ProcessInstanceId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceTerminated, "process_instance.terminated");

/// Event: Task created at a task node
#[derive(Debug)]
pub struct TaskCreated {
    /// Owning instance
    pub instance_id: ProcessInstanceId,
    /// The new task
    pub task_id: TaskId,
    /// Node that created it
    pub node_id: String,
    /// Assignee taken from the node, if any
    pub assignee: Option<String>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(TaskCreated, "task.created");

/// Event: Task assigned
#[derive(Debug)]
pub struct TaskAssigned {
    /// Owning instance
    pub instance_id: ProcessInstanceId,
    /// The assigned task
    pub task_id: TaskId,
    /// New assignee
    pub assignee: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(TaskAssigned, "task.assigned");

/// Event: Task completed
#[derive(Debug)]
pub struct TaskCompleted {
    /// Owning instance
    pub instance_id: ProcessInstanceId,
    /// The completed task
    pub task_id: TaskId,
    /// Node of the task
    pub node_id: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(TaskCompleted, "task.completed");

/// Event: Task failed
#[derive(Debug)]
pub struct TaskFailed {
    /// Owning instance
    pub instance_id: ProcessInstanceId,
    /// The failed task
    pub task_id: TaskId,
    /// Failure reason reported by the worker
    pub reason: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(TaskFailed, "task.failed");
