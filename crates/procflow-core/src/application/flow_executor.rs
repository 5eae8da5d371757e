use crate::{
    config::EngineConfig,
    domain::condition::ConditionEvaluator,
    domain::events::{DomainEvent, TaskCompleted, TaskCreated},
    domain::process_definition::{
        Node, NodeType, ProcessDefinition, TaskType, PROP_ASSIGNEE, PROP_DUE_DATE, PROP_TASK_TYPE,
    },
    domain::process_instance::{InstanceStatus, ProcessInstance, Token},
    domain::repository::InstanceRepository,
    domain::task::Task,
    types::Variables,
    CoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handler for domain events
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Handle a domain event
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError>;
}

/// Event handler writing every event to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl DomainEventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        info!(
            event_type = event.event_type(),
            instance_id = %event.instance_id().0,
            timestamp = %event.timestamp(),
            "Domain event"
        );
        debug!(?event, "Domain event payload");
        Ok(())
    }
}

/// How an executor run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Nothing to do: the instance is not running or has no ready tokens
    Idle,
    /// Every ready token was processed and some wait on user tasks
    Waiting,
    /// The instance reached COMPLETED
    Completed,
    /// The instance was terminated while running
    Terminated,
}

/// Advances process instances through their definition graph
#[derive(Clone)]
pub struct FlowExecutor {
    instance_repo: Arc<dyn InstanceRepository>,
    condition_evaluator: Arc<dyn ConditionEvaluator>,
    event_handler: Arc<dyn DomainEventHandler>,
    config: EngineConfig,
}

impl FlowExecutor {
    /// Create a new flow executor
    pub fn new(
        instance_repo: Arc<dyn InstanceRepository>,
        condition_evaluator: Arc<dyn ConditionEvaluator>,
        event_handler: Arc<dyn DomainEventHandler>,
        config: EngineConfig,
    ) -> Self {
        Self {
            instance_repo,
            condition_evaluator,
            event_handler,
            config,
        }
    }

    /// Replace the event handler
    pub fn with_event_handler(mut self, event_handler: Arc<dyn DomainEventHandler>) -> Self {
        self.event_handler = event_handler;
        self
    }

    /// Replace the decision branch selector
    pub fn with_condition_evaluator(
        mut self,
        condition_evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        self.condition_evaluator = condition_evaluator;
        self
    }

    /// Executor configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process ready tokens until none remain.
    ///
    /// State is committed after every step. Errors that leave the instance
    /// SUSPENDED are committed before they are returned.
    pub async fn run(
        &self,
        instance: &mut ProcessInstance,
        definition: &ProcessDefinition,
    ) -> Result<ExecutionOutcome, CoreError> {
        if !instance.is_active() || !instance.has_ready_tokens() {
            debug!(
                instance_id = %instance.id.0,
                status = ?instance.status,
                "Nothing to execute"
            );
            self.check_stalled(instance).await?;
            return Ok(ExecutionOutcome::Idle);
        }

        let mut steps = 0usize;

        while instance.is_active() && instance.has_ready_tokens() {
            if self.terminated_externally(instance).await? {
                info!(instance_id = %instance.id.0, "Instance terminated, stopping execution");
                instance.status = InstanceStatus::Terminated;
                return Ok(ExecutionOutcome::Terminated);
            }

            if steps >= self.config.max_steps_per_run {
                let err = CoreError::StepLimitExceeded {
                    instance_id: instance.id.0.clone(),
                    limit: self.config.max_steps_per_run,
                };
                return Err(self.suspend_run(instance, None, &[], err).await);
            }
            steps += 1;

            let Some(token) = instance.take_next_ready_token() else {
                break;
            };

            match self.execute_node(instance, definition, &token) {
                Ok(tasks) => {
                    self.instance_repo.commit(instance, &tasks).await?;
                    self.publish_events(instance).await;
                }
                Err(err) if err.suspends_instance() => {
                    return Err(self.suspend_run(instance, Some(token), &[], err).await);
                }
                Err(err) => {
                    instance.push_token(token);
                    return Err(err);
                }
            }
        }

        debug!(instance_id = %instance.id.0, steps, "Execution run finished");
        self.check_stalled(instance).await?;

        if instance.is_completed() {
            Ok(ExecutionOutcome::Completed)
        } else {
            Ok(ExecutionOutcome::Waiting)
        }
    }

    /// Complete `task` with `variables` and continue execution.
    ///
    /// The task node's single outgoing edge is checked first; a node that
    /// cannot advance suspends the instance and leaves the task open. On
    /// success the token parked on the task moves along that edge.
    pub async fn advance_from(
        &self,
        instance: &mut ProcessInstance,
        definition: &ProcessDefinition,
        task: &mut Task,
        variables: &Variables,
    ) -> Result<ExecutionOutcome, CoreError> {
        if !instance.is_waiting_on(&task.id) {
            return Err(CoreError::InvalidState(format!(
                "Instance {} has no token waiting on task {}",
                instance.id.0, task.id.0
            )));
        }

        let next = match definition.get_node(&task.node_id) {
            None => Err(CoreError::NodeNotFound {
                instance_id: instance.id.0.clone(),
                node_id: task.node_id.clone(),
            }),
            Some(node) => match node.outgoing.as_slice() {
                [next] => Ok(next.clone()),
                _ => Err(self.invalid_node(
                    instance,
                    node,
                    "task node must have exactly one outgoing edge",
                )),
            },
        };
        let next = match next {
            Ok(next) => next,
            Err(err) => return Err(self.suspend_run(instance, None, &[], err).await),
        };

        task.complete(variables)?;
        instance.merge_variables(&task.variables);
        instance.release_task_token(&task.id);
        instance.push_token(Token::ready(next, Some(task.node_id.clone())));

        instance.record_event(Box::new(TaskCompleted {
            instance_id: instance.id.clone(),
            task_id: task.id.clone(),
            node_id: task.node_id.clone(),
            timestamp: Utc::now(),
        }));
        instance.update_timestamp();

        self.instance_repo
            .commit(instance, std::slice::from_ref(task))
            .await?;
        self.publish_events(instance).await;

        self.run(instance, definition).await
    }

    /// Deliver a single event to the handler.
    ///
    /// Delivery failures are logged and never interrupt execution.
    pub async fn publish(&self, event: Box<dyn DomainEvent>) {
        let event_type = event.event_type();
        let instance_id = event.instance_id().0.clone();
        if let Err(err) = self.event_handler.handle_event(event).await {
            warn!(
                instance_id = %instance_id,
                event_type,
                error = %err,
                "Failed to deliver domain event"
            );
        }
    }

    /// Drain the instance's recorded events into the handler
    pub async fn publish_events(&self, instance: &mut ProcessInstance) {
        for event in instance.take_events() {
            self.publish(event).await;
        }
    }

    /// Suspend a running instance whose only tokens wait at JOIN barriers
    /// that nothing left in flight can release
    async fn check_stalled(&self, instance: &mut ProcessInstance) -> Result<(), CoreError> {
        if !instance.is_active() || !instance.is_stalled_at_join() {
            return Ok(());
        }

        let join_id = instance.parked_join_id().unwrap_or_default().to_string();
        let err = CoreError::InvalidNode {
            instance_id: instance.id.0.clone(),
            node_id: join_id,
            reason: "join barrier can no longer be released".to_string(),
        };
        Err(self.suspend_run(instance, None, &[], err).await)
    }

    async fn terminated_externally(&self, instance: &ProcessInstance) -> Result<bool, CoreError> {
        Ok(self
            .instance_repo
            .find_by_id(&instance.id)
            .await?
            .is_some_and(|stored| stored.status == InstanceStatus::Terminated))
    }

    /// Suspend after an execution error, returning the error to surface
    async fn suspend_run(
        &self,
        instance: &mut ProcessInstance,
        token: Option<Token>,
        tasks: &[Task],
        err: CoreError,
    ) -> CoreError {
        if let Some(token) = token {
            instance.push_token(token);
        }

        warn!(instance_id = %instance.id.0, error = %err, "Suspending instance");

        if let Err(suspend_err) = instance.suspend(err.to_string()) {
            return suspend_err;
        }
        if let Err(store_err) = self.instance_repo.commit(instance, tasks).await {
            return store_err;
        }
        self.publish_events(instance).await;

        err
    }

    fn invalid_node(&self, instance: &ProcessInstance, node: &Node, reason: &str) -> CoreError {
        CoreError::InvalidNode {
            instance_id: instance.id.0.clone(),
            node_id: node.id.clone(),
            reason: reason.to_string(),
        }
    }

    /// Execute one token, returning the tasks created or changed by the step
    fn execute_node(
        &self,
        instance: &mut ProcessInstance,
        definition: &ProcessDefinition,
        token: &Token,
    ) -> Result<Vec<Task>, CoreError> {
        let node = definition
            .get_node(&token.node_id)
            .ok_or_else(|| CoreError::NodeNotFound {
                instance_id: instance.id.0.clone(),
                node_id: token.node_id.clone(),
            })?;

        debug!(
            instance_id = %instance.id.0,
            node_id = %node.id,
            node_type = ?node.node_type,
            "Executing node"
        );

        match node.node_type {
            NodeType::Start => {
                let [next] = node.outgoing.as_slice() else {
                    return Err(self.invalid_node(
                        instance,
                        node,
                        "start node must have exactly one outgoing edge",
                    ));
                };
                instance.push_token(Token::ready(next.clone(), Some(node.id.clone())));
                Ok(Vec::new())
            }
            NodeType::Task => self.execute_task(instance, node, token),
            NodeType::Decision => {
                let target = self
                    .condition_evaluator
                    .select_branch(node, &instance.variables)
                    .ok_or_else(|| {
                        self.invalid_node(instance, node, "decision node has no outgoing edges")
                    })?;
                instance.push_token(Token::ready(target, Some(node.id.clone())));
                Ok(Vec::new())
            }
            NodeType::Parallel => {
                if node.outgoing.is_empty() {
                    return Err(self.invalid_node(
                        instance,
                        node,
                        "parallel node has no outgoing edges",
                    ));
                }
                for target in &node.outgoing {
                    instance.push_token(Token::ready(target.clone(), Some(node.id.clone())));
                }
                Ok(Vec::new())
            }
            NodeType::Join => {
                self.execute_join(instance, node, token)?;
                Ok(Vec::new())
            }
            NodeType::End => {
                if instance.tokens.is_empty() {
                    instance.complete()?;
                    info!(instance_id = %instance.id.0, "Process instance completed");
                } else {
                    debug!(
                        instance_id = %instance.id.0,
                        remaining = instance.tokens.len(),
                        "Branch ended"
                    );
                }
                Ok(Vec::new())
            }
        }
    }

    fn execute_task(
        &self,
        instance: &mut ProcessInstance,
        node: &Node,
        token: &Token,
    ) -> Result<Vec<Task>, CoreError> {
        let task_type = match node.property(PROP_TASK_TYPE) {
            None => self.config.default_task_type,
            Some(value) => value
                .as_str()
                .and_then(|s| s.parse::<TaskType>().ok())
                .ok_or_else(|| {
                    self.invalid_node(instance, node, &format!("unknown task type: {}", value))
                })?,
        };

        let [next] = node.outgoing.as_slice() else {
            return Err(self.invalid_node(
                instance,
                node,
                "task node must have exactly one outgoing edge",
            ));
        };

        let mut task = Task::new(instance.id.clone(), &node.id, &node.name, task_type);
        task.due_date = parse_due_date(node);

        if let Some(assignee) = node.property_str(PROP_ASSIGNEE) {
            task.assign(assignee)?;
        }

        instance.record_event(Box::new(TaskCreated {
            instance_id: instance.id.clone(),
            task_id: task.id.clone(),
            node_id: node.id.clone(),
            assignee: task.assignee.clone(),
            timestamp: task.created_at,
        }));

        if task_type.is_automatic() {
            task.complete_automatically()?;
            instance.record_event(Box::new(TaskCompleted {
                instance_id: instance.id.clone(),
                task_id: task.id.clone(),
                node_id: node.id.clone(),
                timestamp: Utc::now(),
            }));
            instance.push_token(Token::ready(next.clone(), Some(node.id.clone())));
            debug!(
                instance_id = %instance.id.0,
                task_id = %task.id.0,
                task_type = %task_type,
                "Automatic task completed"
            );
        } else {
            instance.push_token(Token::parked_on_task(
                node.id.clone(),
                token.source.clone(),
                task.id.clone(),
            ));
            info!(
                instance_id = %instance.id.0,
                task_id = %task.id.0,
                node_id = %node.id,
                assignee = ?task.assignee,
                "Waiting on user task"
            );
        }

        instance.update_timestamp();
        Ok(vec![task])
    }

    fn execute_join(
        &self,
        instance: &mut ProcessInstance,
        node: &Node,
        token: &Token,
    ) -> Result<(), CoreError> {
        let expects = node
            .join_expects()
            .filter(|expects| !expects.is_empty())
            .ok_or_else(|| {
                self.invalid_node(instance, node, "join node must declare a non-empty expects list")
            })?;

        let Some(next) = node.outgoing.first() else {
            return Err(self.invalid_node(instance, node, "join node has no outgoing edge"));
        };

        let Some(source) = token.source.as_deref() else {
            return Err(self.invalid_node(instance, node, "token reached join without a source"));
        };

        if !expects.contains(source) {
            return Err(self.invalid_node(
                instance,
                node,
                &format!("unexpected predecessor {}", source),
            ));
        }

        if instance.record_join_arrival(&node.id, source, &expects) {
            debug!(instance_id = %instance.id.0, join_id = %node.id, "Join released");
            instance.push_token(Token::ready(next.clone(), Some(node.id.clone())));
        } else {
            debug!(
                instance_id = %instance.id.0,
                join_id = %node.id,
                source,
                "Waiting at join"
            );
        }

        Ok(())
    }
}

fn parse_due_date(node: &Node) -> Option<DateTime<Utc>> {
    let raw = node.property(PROP_DUE_DATE)?;
    match raw.as_str().map(DateTime::parse_from_rfc3339) {
        Some(Ok(due)) => Some(due.with_timezone(&Utc)),
        _ => {
            warn!(node_id = %node.id, due_date = %raw, "Ignoring invalid due date");
            None
        }
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::domain::condition::IndexConditionEvaluator;
    use crate::domain::process_definition::{PROP_CONDITION, PROP_EXPECTS};
    use crate::domain::repository::memory::MemoryInstanceRepository;
    use crate::domain::task::TaskStatus;
    use serde_json::json;

    fn executor(repo: Arc<MemoryInstanceRepository>, config: EngineConfig) -> FlowExecutor {
        FlowExecutor::new(
            repo,
            Arc::new(IndexConditionEvaluator),
            Arc::new(LoggingEventHandler),
            config,
        )
    }

    async fn started(
        repo: &MemoryInstanceRepository,
        definition: &ProcessDefinition,
    ) -> ProcessInstance {
        let instance = ProcessInstance::new(
            definition.id.clone(),
            definition.start_node_id.clone(),
            Variables::new(),
        );
        repo.save(&instance).await.unwrap();
        instance
    }

    fn service_definition() -> ProcessDefinition {
        ProcessDefinition::new(
            "service",
            1,
            "start",
            vec![
                Node::new("start", "Start", NodeType::Start).with_outgoing(["work"]),
                Node::new("work", "Work", NodeType::Task)
                    .with_property(PROP_TASK_TYPE, json!("service_task"))
                    .with_property(PROP_DUE_DATE, json!("not a date"))
                    .with_outgoing(["end"]),
                Node::new("end", "End", NodeType::End),
            ],
        )
    }

    #[tokio::test]
    async fn test_service_task_runs_to_completion() {
        let repo = Arc::new(MemoryInstanceRepository::new());
        let executor = executor(repo.clone(), EngineConfig::default());
        let definition = service_definition();
        let mut instance = started(&repo, &definition).await;

        let outcome = executor.run(&mut instance, &definition).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert!(instance.tokens.is_empty());

        let stored = repo.find_by_id(&instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Completed);

        let tasks = repo.find_tasks_by_instance_id(&instance.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert!(tasks[0].due_date.is_none());
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let repo = Arc::new(MemoryInstanceRepository::new());
        let executor = executor(repo.clone(), EngineConfig::default());
        let definition = service_definition();
        let mut instance = started(&repo, &definition).await;

        executor.run(&mut instance, &definition).await.unwrap();
        let outcome = executor.run(&mut instance, &definition).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Idle);
        assert_eq!(
            repo.find_tasks_by_instance_id(&instance.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_step_limit_suspends_cycle() {
        let repo = Arc::new(MemoryInstanceRepository::new());
        let executor = executor(repo.clone(), EngineConfig::default().with_max_steps_per_run(20));
        let definition = ProcessDefinition::new(
            "loop",
            1,
            "start",
            vec![
                Node::new("start", "Start", NodeType::Start).with_outgoing(["work"]),
                Node::new("work", "Work", NodeType::Task)
                    .with_property(PROP_TASK_TYPE, json!("script_task"))
                    .with_outgoing(["check"]),
                Node::new("check", "Check", NodeType::Decision)
                    .with_property(PROP_CONDITION, json!("0"))
                    .with_outgoing(["work", "end"]),
                Node::new("end", "End", NodeType::End),
            ],
        );
        let mut instance = started(&repo, &definition).await;

        let err = executor.run(&mut instance, &definition).await.unwrap_err();
        assert!(matches!(err, CoreError::StepLimitExceeded { limit: 20, .. }));

        let stored = repo.find_by_id(&instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Suspended);
        assert!(stored.error.is_some());
        assert!(stored.has_ready_tokens());
    }

    #[tokio::test]
    async fn test_unknown_task_type_suspends() {
        let repo = Arc::new(MemoryInstanceRepository::new());
        let executor = executor(repo.clone(), EngineConfig::default());
        let definition = ProcessDefinition::new(
            "bad task",
            1,
            "start",
            vec![
                Node::new("start", "Start", NodeType::Start).with_outgoing(["work"]),
                Node::new("work", "Work", NodeType::Task)
                    .with_property(PROP_TASK_TYPE, json!("manual_task"))
                    .with_outgoing(["end"]),
                Node::new("end", "End", NodeType::End),
            ],
        );
        let mut instance = started(&repo, &definition).await;

        let err = executor.run(&mut instance, &definition).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidNode { ref node_id, .. } if node_id == "work"));
        assert_eq!(instance.status, InstanceStatus::Suspended);
        assert_eq!(instance.current_node_ids(), vec!["work".to_string()]);
        assert!(repo
            .find_tasks_by_instance_id(&instance.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_join_rejects_unexpected_predecessor() {
        let repo = Arc::new(MemoryInstanceRepository::new());
        let executor = executor(repo.clone(), EngineConfig::default());
        let definition = ProcessDefinition::new(
            "bad join",
            1,
            "start",
            vec![
                Node::new("start", "Start", NodeType::Start).with_outgoing(["join"]),
                Node::new("join", "Join", NodeType::Join)
                    .with_property(PROP_EXPECTS, json!(["a", "b"]))
                    .with_outgoing(["end"]),
                Node::new("a", "A", NodeType::End),
                Node::new("b", "B", NodeType::End),
                Node::new("end", "End", NodeType::End),
            ],
        );
        let mut instance = started(&repo, &definition).await;

        let err = executor.run(&mut instance, &definition).await.unwrap_err();
        assert!(
            matches!(err, CoreError::InvalidNode { ref reason, .. } if reason.contains("start"))
        );
        assert!(instance.join_barriers.is_empty());
    }

    #[tokio::test]
    async fn test_user_task_with_assignee_and_due_date() {
        let repo = Arc::new(MemoryInstanceRepository::new());
        let executor = executor(repo.clone(), EngineConfig::default());
        let definition = ProcessDefinition::new(
            "review",
            1,
            "start",
            vec![
                Node::new("start", "Start", NodeType::Start).with_outgoing(["review"]),
                Node::new("review", "Review", NodeType::Task)
                    .with_property(PROP_ASSIGNEE, json!("admin"))
                    .with_property(PROP_DUE_DATE, json!("2030-01-01T12:00:00Z"))
                    .with_outgoing(["end"]),
                Node::new("end", "End", NodeType::End),
            ],
        );
        let mut instance = started(&repo, &definition).await;

        let outcome = executor.run(&mut instance, &definition).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Waiting);

        let tasks = repo.find_tasks_by_instance_id(&instance.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.task_type, TaskType::UserTask);
        assert_eq!(task.assignee.as_deref(), Some("admin"));
        assert_eq!(
            task.due_date.map(|d| d.to_rfc3339()),
            Some("2030-01-01T12:00:00+00:00".to_string())
        );
        assert!(instance.is_waiting_on(&task.id));

        let mut task = task.clone();
        let outcome = executor
            .advance_from(&mut instance, &definition, &mut task, &Variables::new())
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert_eq!(task.status, TaskStatus::Completed);
    }
}
