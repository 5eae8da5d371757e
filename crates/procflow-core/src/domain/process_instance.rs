use crate::{
    domain::events::{
        DomainEvent, ProcessInstanceCompleted, ProcessInstanceResumed, ProcessInstanceStarted,
        ProcessInstanceSuspended, ProcessInstanceTerminated,
    },
    domain::process_definition::ProcessDefinitionId,
    domain::task::TaskId,
    types::{merge_variables, Variables},
    CoreError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Value object: Process instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessInstanceId(pub String);

/// Process instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Tokens are being advanced or waiting on user tasks
    Running,
    /// Every token reached an end node
    Completed,
    /// Halted for operator intervention
    Suspended,
    /// Cancelled externally
    Terminated,
}

/// A unit of control flow positioned at one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Node to execute next
    pub node_id: String,

    /// Node that emitted this token, if any
    pub source: Option<String>,

    /// User task the token is parked on
    pub waiting_on: Option<TaskId>,

    /// Parked at a JOIN until its barrier releases
    #[serde(default)]
    pub at_join: bool,
}

impl Token {
    /// A token ready to execute `node_id`
    pub fn ready(node_id: impl Into<String>, source: Option<String>) -> Self {
        Self {
            node_id: node_id.into(),
            source,
            waiting_on: None,
            at_join: false,
        }
    }

    /// A token parked on the user task `task_id`
    pub fn parked_on_task(
        node_id: impl Into<String>,
        source: Option<String>,
        task_id: TaskId,
    ) -> Self {
        Self {
            waiting_on: Some(task_id),
            ..Self::ready(node_id, source)
        }
    }

    /// Whether the executor may pick this token up
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.waiting_on.is_none() && !self.at_join
    }
}

/// Aggregate: Process instance
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessInstance {
    /// Unique identifier
    pub id: ProcessInstanceId,

    /// Definition being executed
    pub definition_id: ProcessDefinitionId,

    /// Current status
    pub status: InstanceStatus,

    /// Variable bindings
    pub variables: Variables,

    /// Active tokens, both ready and parked
    pub tokens: Vec<Token>,

    /// Arrived predecessors per JOIN node since the matching fan-out
    pub join_barriers: HashMap<String, BTreeSet<String>>,

    /// Reason of the last suspension
    pub error: Option<String>,

    /// Start timestamp
    pub started_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,

    /// Domain events
    #[serde(skip)]
    pub events: Vec<Box<dyn DomainEvent>>,
}

// Manually implement Clone for ProcessInstance
impl Clone for ProcessInstance {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            definition_id: self.definition_id.clone(),
            status: self.status,
            variables: self.variables.clone(),
            tokens: self.tokens.clone(),
            join_barriers: self.join_barriers.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            events: Vec::new(), // We don't clone domain events
        }
    }
}

impl ProcessInstance {
    /// Create a running instance with one token at the start node
    pub fn new(
        definition_id: ProcessDefinitionId,
        start_node_id: impl Into<String>,
        variables: Variables,
    ) -> Self {
        let instance_id = ProcessInstanceId(Uuid::new_v4().to_string());
        let now = Utc::now();

        let mut instance = Self {
            id: instance_id.clone(),
            definition_id: definition_id.clone(),
            status: InstanceStatus::Running,
            variables,
            tokens: vec![Token::ready(start_node_id, None)],
            join_barriers: HashMap::new(),
            error: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            events: Vec::with_capacity(8),
        };

        instance.record_event(Box::new(ProcessInstanceStarted {
            instance_id,
            definition_id,
            timestamp: now,
        }));

        instance
    }

    /// Node ids of every active token
    pub fn current_node_ids(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.node_id.clone()).collect()
    }

    /// Whether the instance is running
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    /// Whether the instance completed
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == InstanceStatus::Completed
    }

    /// Whether any token is ready to execute
    #[inline]
    pub fn has_ready_tokens(&self) -> bool {
        self.tokens.iter().any(Token::is_ready)
    }

    /// Remove and return the oldest ready token
    pub fn take_next_ready_token(&mut self) -> Option<Token> {
        let index = self.tokens.iter().position(Token::is_ready)?;
        Some(self.tokens.remove(index))
    }

    /// Add a token
    #[inline]
    pub fn push_token(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Remove the token parked on `task_id`
    pub fn release_task_token(&mut self, task_id: &TaskId) -> Option<Token> {
        let index = self
            .tokens
            .iter()
            .position(|t| t.waiting_on.as_ref() == Some(task_id))?;
        Some(self.tokens.remove(index))
    }

    /// Whether a token is parked on `task_id`
    pub fn is_waiting_on(&self, task_id: &TaskId) -> bool {
        self.tokens
            .iter()
            .any(|t| t.waiting_on.as_ref() == Some(task_id))
    }

    /// Make tokens parked on any of `task_ids` ready again, returning how many changed
    pub fn reactivate_tokens(&mut self, task_ids: &HashSet<TaskId>) -> usize {
        let mut count = 0;
        for token in &mut self.tokens {
            if token
                .waiting_on
                .as_ref()
                .is_some_and(|task_id| task_ids.contains(task_id))
            {
                token.waiting_on = None;
                count += 1;
            }
        }
        count
    }

    /// Record that `source` reached `join_id`.
    ///
    /// Until the arrived set equals `expects` the arriving token stays parked
    /// at the join. On release the barrier and every token parked at the join
    /// are cleared and true is returned.
    pub fn record_join_arrival(
        &mut self,
        join_id: &str,
        source: &str,
        expects: &HashSet<String>,
    ) -> bool {
        let arrived = self.join_barriers.entry(join_id.to_string()).or_default();
        arrived.insert(source.to_string());

        let released =
            arrived.len() == expects.len() && expects.iter().all(|id| arrived.contains(id));
        if released {
            self.join_barriers.remove(join_id);
            self.tokens.retain(|t| !(t.at_join && t.node_id == join_id));
        } else {
            self.tokens.push(Token {
                at_join: true,
                ..Token::ready(join_id, Some(source.to_string()))
            });
        }
        self.update_timestamp();
        released
    }

    /// Whether every remaining token waits at a JOIN, so nothing can advance
    pub fn is_stalled_at_join(&self) -> bool {
        !self.tokens.is_empty() && self.tokens.iter().all(|t| t.at_join)
    }

    /// Id of the first JOIN holding a parked token
    pub fn parked_join_id(&self) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.at_join)
            .map(|t| t.node_id.as_str())
    }

    /// Merge variables into the instance bindings
    pub fn merge_variables(&mut self, variables: &Variables) {
        merge_variables(&mut self.variables, variables);
        self.update_timestamp();
    }

    /// Update the timestamp
    #[inline]
    pub fn update_timestamp(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Complete the instance
    pub fn complete(&mut self) -> Result<(), CoreError> {
        if self.status != InstanceStatus::Running {
            return Err(CoreError::InvalidState(format!(
                "Cannot complete instance {} in state: {:?}",
                self.id.0, self.status
            )));
        }

        let now = Utc::now();
        self.status = InstanceStatus::Completed;
        self.completed_at = Some(now);

        self.record_event(Box::new(ProcessInstanceCompleted {
            instance_id: self.id.clone(),
            timestamp: now,
        }));

        self.update_timestamp();
        Ok(())
    }

    /// Suspend the instance for operator intervention
    pub fn suspend(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        if self.status != InstanceStatus::Running {
            return Err(CoreError::InvalidState(format!(
                "Cannot suspend instance {} in state: {:?}",
                self.id.0, self.status
            )));
        }

        let reason = reason.into();
        self.status = InstanceStatus::Suspended;
        self.error = Some(reason.clone());

        self.record_event(Box::new(ProcessInstanceSuspended {
            instance_id: self.id.clone(),
            reason,
            timestamp: Utc::now(),
        }));

        self.update_timestamp();
        Ok(())
    }

    /// Resume a suspended instance
    pub fn resume(&mut self) -> Result<(), CoreError> {
        if self.status != InstanceStatus::Suspended {
            return Err(CoreError::InvalidState(format!(
                "Cannot resume instance {} in state: {:?}",
                self.id.0, self.status
            )));
        }

        self.status = InstanceStatus::Running;
        self.error = None;

        self.record_event(Box::new(ProcessInstanceResumed {
            instance_id: self.id.clone(),
            timestamp: Utc::now(),
        }));

        self.update_timestamp();
        Ok(())
    }

    /// Terminate the instance
    pub fn terminate(&mut self) -> Result<(), CoreError> {
        if !matches!(
            self.status,
            InstanceStatus::Running | InstanceStatus::Suspended
        ) {
            return Err(CoreError::InvalidState(format!(
                "Cannot terminate instance {} in state: {:?}",
                self.id.0, self.status
            )));
        }

        self.status = InstanceStatus::Terminated;

        self.record_event(Box::new(ProcessInstanceTerminated {
            instance_id: self.id.clone(),
            timestamp: Utc::now(),
        }));

        self.update_timestamp();
        Ok(())
    }

    /// Record a domain event
    pub fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Get and clear all domain events
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }
}
