use crate::domain::process_definition::TaskType;
use crate::domain::process_instance::ProcessInstanceId;
use crate::types::{merge_variables, Variables};
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value object: Task ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, nobody assigned yet
    Created,
    /// Assigned to someone
    Assigned,
    /// Work has started
    InProgress,
    /// Finished successfully
    Completed,
    /// Reported as failed
    Failed,
}

/// A unit of work created at a TASK node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning instance
    pub instance_id: ProcessInstanceId,

    /// Node that created the task
    pub node_id: String,

    /// Display name, copied from the node
    pub name: String,

    /// Kind of task
    pub task_type: TaskType,

    /// Who should work on it
    pub assignee: Option<String>,

    /// Lifecycle status
    pub status: TaskStatus,

    /// Task-local variables, merged into the instance on completion
    pub variables: Variables,

    /// Failure reason if the task failed
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last assignment timestamp
    pub assigned_at: Option<DateTime<Utc>>,

    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,

    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task in status CREATED
    pub fn new(
        instance_id: ProcessInstanceId,
        node_id: impl Into<String>,
        name: impl Into<String>,
        task_type: TaskType,
    ) -> Self {
        Self {
            id: TaskId(Uuid::new_v4().to_string()),
            instance_id,
            node_id: node_id.into(),
            name: name.into(),
            task_type,
            assignee: None,
            status: TaskStatus::Created,
            variables: Variables::new(),
            error: None,
            created_at: Utc::now(),
            assigned_at: None,
            completed_at: None,
            due_date: None,
        }
    }

    /// Whether the task still awaits completion or failure
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Created | TaskStatus::Assigned | TaskStatus::InProgress
        )
    }

    /// Assign (or reassign) the task
    pub fn assign(&mut self, assignee: impl Into<String>) -> Result<(), CoreError> {
        if !matches!(self.status, TaskStatus::Created | TaskStatus::Assigned) {
            return Err(self.invalid_transition("assign"));
        }

        self.assignee = Some(assignee.into());
        self.status = TaskStatus::Assigned;
        self.assigned_at = Some(Utc::now());
        Ok(())
    }

    /// Start working on an assigned task
    pub fn start_work(&mut self) -> Result<(), CoreError> {
        if self.status != TaskStatus::Assigned {
            return Err(self.invalid_transition("start"));
        }

        self.status = TaskStatus::InProgress;
        Ok(())
    }

    /// Complete the task, merging `variables` into the task-local variables
    pub fn complete(&mut self, variables: &Variables) -> Result<(), CoreError> {
        if !matches!(self.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            return Err(self.invalid_transition("complete"));
        }

        merge_variables(&mut self.variables, variables);
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Run an automatic (service/script) task straight to COMPLETED
    pub fn complete_automatically(&mut self) -> Result<(), CoreError> {
        if !self.task_type.is_automatic() || !self.is_open() {
            return Err(self.invalid_transition("auto-complete"));
        }

        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the task as failed
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        if !self.is_open() {
            return Err(self.invalid_transition("fail"));
        }

        self.status = TaskStatus::Failed;
        self.error = Some(reason.into());
        Ok(())
    }

    fn invalid_transition(&self, action: &str) -> CoreError {
        CoreError::InvalidState(format!(
            "Cannot {} task {} in status {:?}",
            action, self.id.0, self.status
        ))
    }
}
