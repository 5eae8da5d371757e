use crate::{
    application::flow_executor::{
        DomainEventHandler, ExecutionOutcome, FlowExecutor, LoggingEventHandler,
    },
    application::instance_locks::InstanceLocks,
    config::EngineConfig,
    domain::condition::{ConditionEvaluator, IndexConditionEvaluator},
    domain::events::{TaskAssigned, TaskFailed},
    domain::process_definition::{ProcessDefinition, ProcessDefinitionId},
    domain::process_instance::{InstanceStatus, ProcessInstance, ProcessInstanceId},
    domain::repository::{DefinitionRepository, InstanceRepository},
    domain::task::{Task, TaskId, TaskStatus},
    types::Variables,
    CoreError,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The main API of the Procflow engine
///
/// Deploys definitions, starts instances and drives them forward as tasks
/// are worked on. Operations on one instance are serialized through a
/// per-instance lock; different instances proceed independently.
#[derive(Clone)]
pub struct ProcessEngine {
    definition_repo: Arc<dyn DefinitionRepository>,
    instance_repo: Arc<dyn InstanceRepository>,
    executor: FlowExecutor,
    locks: Arc<InstanceLocks>,
}

impl ProcessEngine {
    /// Create an engine over the given stores
    pub fn new(
        definition_repo: Arc<dyn DefinitionRepository>,
        instance_repo: Arc<dyn InstanceRepository>,
        config: EngineConfig,
    ) -> Self {
        let executor = FlowExecutor::new(
            instance_repo.clone(),
            Arc::new(IndexConditionEvaluator),
            Arc::new(LoggingEventHandler),
            config,
        );

        Self {
            definition_repo,
            instance_repo,
            executor,
            locks: Arc::new(InstanceLocks::new()),
        }
    }

    /// Create an engine backed by in-memory stores
    #[cfg(feature = "testing")]
    pub fn in_memory(config: EngineConfig) -> Self {
        use crate::domain::repository::memory::{
            MemoryDefinitionRepository, MemoryInstanceRepository,
        };

        Self::new(
            Arc::new(MemoryDefinitionRepository::new()),
            Arc::new(MemoryInstanceRepository::new()),
            config,
        )
    }

    /// Deliver domain events to `event_handler` instead of the log
    pub fn with_event_handler(mut self, event_handler: Arc<dyn DomainEventHandler>) -> Self {
        self.executor = self.executor.with_event_handler(event_handler);
        self
    }

    /// Select DECISION branches with `condition_evaluator`
    pub fn with_condition_evaluator(
        mut self,
        condition_evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        self.executor = self.executor.with_condition_evaluator(condition_evaluator);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        self.executor.config()
    }

    /// Deploy a process definition
    pub async fn deploy_process(
        &self,
        definition: ProcessDefinition,
    ) -> Result<ProcessDefinitionId, CoreError> {
        definition.validate()?;
        self.definition_repo.save(&definition).await?;

        info!(
            definition_id = %definition.id.0,
            name = %definition.name,
            version = definition.version,
            "Process definition deployed"
        );

        Ok(definition.id)
    }

    /// Prevent new instances of a definition; running ones are unaffected
    pub async fn deactivate_process(
        &self,
        definition_id: &ProcessDefinitionId,
    ) -> Result<(), CoreError> {
        self.definition_repo.deactivate(definition_id).await?;
        info!(definition_id = %definition_id.0, "Process definition deactivated");
        Ok(())
    }

    /// Start a new instance and run it until it waits or completes.
    ///
    /// Execution errors leave the created instance SUSPENDED; the returned
    /// error carries its id.
    pub async fn start_process(
        &self,
        definition_id: &ProcessDefinitionId,
        variables: Variables,
    ) -> Result<ProcessInstanceId, CoreError> {
        let definition = self
            .definition_repo
            .find_by_id(definition_id)
            .await?
            .filter(|d| d.active)
            .ok_or_else(|| {
                CoreError::NotFound(format!("Active process definition {}", definition_id.0))
            })?;

        let mut instance = ProcessInstance::new(
            definition.id.clone(),
            definition.start_node_id.clone(),
            variables,
        );
        let instance_id = instance.id.clone();

        let guard = self.locks.acquire(&instance_id).await;
        let result = self.start_locked(&mut instance, &definition).await;
        drop(guard);
        self.locks.release_idle(&instance_id);

        result.map(|_| instance_id)
    }

    async fn start_locked(
        &self,
        instance: &mut ProcessInstance,
        definition: &ProcessDefinition,
    ) -> Result<ExecutionOutcome, CoreError> {
        self.instance_repo.save(instance).await?;
        self.executor.publish_events(instance).await;

        info!(
            instance_id = %instance.id.0,
            definition_id = %definition.id.0,
            "Process instance started"
        );

        self.executor.run(instance, definition).await
    }

    /// Complete a task with result variables and continue the instance
    pub async fn complete_task(
        &self,
        task_id: &TaskId,
        variables: Variables,
    ) -> Result<ExecutionOutcome, CoreError> {
        let instance_id = self.require_task(task_id).await?.instance_id;

        let guard = self.locks.acquire(&instance_id).await;
        let result = self.complete_task_locked(task_id, &variables).await;
        drop(guard);
        self.locks.release_idle(&instance_id);

        result
    }

    async fn complete_task_locked(
        &self,
        task_id: &TaskId,
        variables: &Variables,
    ) -> Result<ExecutionOutcome, CoreError> {
        let mut task = self.require_task(task_id).await?;
        if !matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            return Err(CoreError::InvalidState(format!(
                "Task {} cannot be completed in status {:?}",
                task.id.0, task.status
            )));
        }

        let mut instance = self.require_instance(&task.instance_id).await?;
        if !instance.is_active() {
            return Err(CoreError::InvalidState(format!(
                "Instance {} is {:?}, cannot complete task {}",
                instance.id.0, instance.status, task.id.0
            )));
        }
        if !instance.is_waiting_on(&task.id) {
            return Err(CoreError::InvalidState(format!(
                "Instance {} is not waiting on task {}",
                instance.id.0, task.id.0
            )));
        }

        let definition = self.require_definition(&instance.definition_id).await?;

        let outcome = self
            .executor
            .advance_from(&mut instance, &definition, &mut task, variables)
            .await?;

        info!(
            instance_id = %instance.id.0,
            task_id = %task.id.0,
            node_id = %task.node_id,
            outcome = ?outcome,
            "Task completed"
        );
        Ok(outcome)
    }

    /// Assign or reassign a task
    pub async fn assign_task(&self, task_id: &TaskId, assignee: &str) -> Result<(), CoreError> {
        let instance_id = self.require_task(task_id).await?.instance_id;

        let guard = self.locks.acquire(&instance_id).await;
        let result = self.assign_task_locked(task_id, assignee).await;
        drop(guard);
        self.locks.release_idle(&instance_id);

        result
    }

    async fn assign_task_locked(&self, task_id: &TaskId, assignee: &str) -> Result<(), CoreError> {
        let mut task = self.require_task(task_id).await?;
        task.assign(assignee)?;
        self.instance_repo.update_task(&task).await?;

        info!(task_id = %task.id.0, assignee, "Task assigned");

        self.executor
            .publish(Box::new(TaskAssigned {
                instance_id: task.instance_id,
                task_id: task.id,
                assignee: assignee.to_string(),
                timestamp: Utc::now(),
            }))
            .await;
        Ok(())
    }

    /// Mark an assigned task as being worked on
    pub async fn start_task(&self, task_id: &TaskId) -> Result<(), CoreError> {
        let instance_id = self.require_task(task_id).await?.instance_id;

        let guard = self.locks.acquire(&instance_id).await;
        let result = self.start_task_locked(task_id).await;
        drop(guard);
        self.locks.release_idle(&instance_id);

        result
    }

    async fn start_task_locked(&self, task_id: &TaskId) -> Result<(), CoreError> {
        let mut task = self.require_task(task_id).await?;
        task.start_work()?;
        self.instance_repo.update_task(&task).await?;
        debug!(task_id = %task.id.0, "Task started");
        Ok(())
    }

    /// Report a task as failed, suspending its instance
    pub async fn fail_task(&self, task_id: &TaskId, reason: &str) -> Result<(), CoreError> {
        let instance_id = self.require_task(task_id).await?.instance_id;

        let guard = self.locks.acquire(&instance_id).await;
        let result = self.fail_task_locked(task_id, reason).await;
        drop(guard);
        self.locks.release_idle(&instance_id);

        result
    }

    async fn fail_task_locked(&self, task_id: &TaskId, reason: &str) -> Result<(), CoreError> {
        let mut task = self.require_task(task_id).await?;
        let mut instance = self.require_instance(&task.instance_id).await?;

        if !matches!(
            instance.status,
            InstanceStatus::Running | InstanceStatus::Suspended
        ) {
            return Err(CoreError::InvalidState(format!(
                "Instance {} is {:?}, cannot fail task {}",
                instance.id.0, instance.status, task.id.0
            )));
        }

        task.fail(reason)?;
        instance.record_event(Box::new(TaskFailed {
            instance_id: instance.id.clone(),
            task_id: task.id.clone(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }));

        if instance.is_active() {
            instance.suspend(format!("Task {} failed: {}", task.id.0, reason))?;
        }

        self.instance_repo
            .commit(&instance, std::slice::from_ref(&task))
            .await?;
        self.executor.publish_events(&mut instance).await;

        warn!(
            instance_id = %instance.id.0,
            task_id = %task.id.0,
            reason,
            "Task failed, instance suspended"
        );
        Ok(())
    }

    /// Terminate a running or suspended instance
    pub async fn terminate_process(
        &self,
        instance_id: &ProcessInstanceId,
    ) -> Result<(), CoreError> {
        let guard = self.locks.acquire(instance_id).await;
        let result = self.terminate_locked(instance_id).await;
        drop(guard);
        self.locks.release_idle(instance_id);

        result
    }

    async fn terminate_locked(&self, instance_id: &ProcessInstanceId) -> Result<(), CoreError> {
        let mut instance = self.require_instance(instance_id).await?;
        instance.terminate()?;
        self.instance_repo.update(&instance).await?;
        self.executor.publish_events(&mut instance).await;

        info!(instance_id = %instance.id.0, "Process instance terminated");
        Ok(())
    }

    /// Resume a suspended instance.
    ///
    /// Tokens parked on failed tasks are retried, re-executing the task node.
    pub async fn resume_process(
        &self,
        instance_id: &ProcessInstanceId,
    ) -> Result<ExecutionOutcome, CoreError> {
        let guard = self.locks.acquire(instance_id).await;
        let result = self.resume_locked(instance_id).await;
        drop(guard);
        self.locks.release_idle(instance_id);

        result
    }

    async fn resume_locked(
        &self,
        instance_id: &ProcessInstanceId,
    ) -> Result<ExecutionOutcome, CoreError> {
        let mut instance = self.require_instance(instance_id).await?;
        let definition = self.require_definition(&instance.definition_id).await?;

        instance.resume()?;

        let failed: HashSet<TaskId> = self
            .instance_repo
            .find_tasks_by_instance_id(instance_id)
            .await?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.id)
            .collect();
        let retried = instance.reactivate_tokens(&failed);

        self.instance_repo.update(&instance).await?;
        self.executor.publish_events(&mut instance).await;

        info!(instance_id = %instance.id.0, retried, "Process instance resumed");

        self.executor.run(&mut instance, &definition).await
    }

    /// Get an instance by ID
    pub async fn get_process_instance(
        &self,
        instance_id: &ProcessInstanceId,
    ) -> Result<Option<ProcessInstance>, CoreError> {
        self.instance_repo.find_by_id(instance_id).await
    }

    /// Get a definition by ID
    pub async fn get_process_definition(
        &self,
        definition_id: &ProcessDefinitionId,
    ) -> Result<Option<ProcessDefinition>, CoreError> {
        self.definition_repo.find_by_id(definition_id).await
    }

    /// All deployed definitions ordered by name and version
    pub async fn list_process_definitions(&self) -> Result<Vec<ProcessDefinition>, CoreError> {
        let mut definitions: Vec<ProcessDefinition> =
            self.definition_repo.find_all().await?.into_values().collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
        Ok(definitions)
    }

    /// List instances with optional filters
    pub async fn list_process_instances(
        &self,
        definition_id: Option<&ProcessDefinitionId>,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<ProcessInstance>, CoreError> {
        self.instance_repo.list_instances(definition_id, status).await
    }

    /// Get a task by ID
    pub async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, CoreError> {
        self.instance_repo.find_task_by_id(task_id).await
    }

    /// Tasks of an instance in creation order
    pub async fn get_tasks_for_instance(
        &self,
        instance_id: &ProcessInstanceId,
    ) -> Result<Vec<Task>, CoreError> {
        self.instance_repo.find_tasks_by_instance_id(instance_id).await
    }

    /// Tasks assigned to `assignee`
    pub async fn get_tasks_for_assignee(&self, assignee: &str) -> Result<Vec<Task>, CoreError> {
        self.instance_repo.find_tasks_by_assignee(assignee).await
    }

    async fn require_task(&self, task_id: &TaskId) -> Result<Task, CoreError> {
        self.instance_repo
            .find_task_by_id(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task {}", task_id.0)))
    }

    async fn require_instance(
        &self,
        instance_id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, CoreError> {
        self.instance_repo
            .find_by_id(instance_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Process instance {}", instance_id.0)))
    }

    async fn require_definition(
        &self,
        definition_id: &ProcessDefinitionId,
    ) -> Result<ProcessDefinition, CoreError> {
        self.definition_repo
            .find_by_id(definition_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Process definition {}", definition_id.0)))
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::domain::process_definition::{Node, NodeType, PROP_TASK_TYPE};
    use serde_json::json;

    fn approval_definition() -> ProcessDefinition {
        ProcessDefinition::new(
            "approval",
            1,
            "start",
            vec![
                Node::new("start", "Start", NodeType::Start).with_outgoing(["approve"]),
                Node::new("approve", "Approve", NodeType::Task)
                    .with_property(PROP_TASK_TYPE, json!("user_task"))
                    .with_outgoing(["end"]),
                Node::new("end", "End", NodeType::End),
            ],
        )
    }

    #[tokio::test]
    async fn test_start_unknown_definition() {
        let engine = ProcessEngine::in_memory(EngineConfig::default());
        let err = engine
            .start_process(&ProcessDefinitionId("nope".to_string()), Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_requires_assignment() {
        let engine = ProcessEngine::in_memory(EngineConfig::default());
        let definition_id = engine.deploy_process(approval_definition()).await.unwrap();
        let instance_id = engine
            .start_process(&definition_id, Variables::new())
            .await
            .unwrap();

        let task = engine.get_tasks_for_instance(&instance_id).await.unwrap()[0].clone();
        assert_eq!(task.status, TaskStatus::Created);

        let err = engine
            .complete_task(&task.id, Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        engine.assign_task(&task.id, "admin").await.unwrap();
        engine.start_task(&task.id).await.unwrap();
        let outcome = engine
            .complete_task(&task.id, Variables::new())
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_locks_released_after_operations() {
        let engine = ProcessEngine::in_memory(EngineConfig::default());
        let definition_id = engine.deploy_process(approval_definition()).await.unwrap();
        engine
            .start_process(&definition_id, Variables::new())
            .await
            .unwrap();

        assert!(engine.locks.is_empty());
    }
}
