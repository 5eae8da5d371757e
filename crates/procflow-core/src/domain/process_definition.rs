use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Node property naming the task type of a TASK node
pub const PROP_TASK_TYPE: &str = "task_type";
/// Node property naming the assignee of a TASK node
pub const PROP_ASSIGNEE: &str = "assignee";
/// Node property holding an RFC 3339 due date for a TASK node
pub const PROP_DUE_DATE: &str = "due_date";
/// Node property holding the condition of a DECISION node
pub const PROP_CONDITION: &str = "condition";
/// Node property listing the predecessors a JOIN node waits for
pub const PROP_EXPECTS: &str = "expects";

/// Value object: Process definition ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessDefinitionId(pub String);

/// Kind of a node in the process graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Entry point of the process
    Start,
    /// Creates a task
    Task,
    /// Exclusive branch on a condition
    Decision,
    /// Fan-out into concurrent branches
    Parallel,
    /// Fan-in of concurrent branches
    Join,
    /// Terminates a branch
    End,
}

/// Kind of work a TASK node creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Needs an external `complete` call
    UserTask,
    /// Completed synchronously by the engine
    ServiceTask,
    /// Completed synchronously by the engine
    ScriptTask,
}

impl TaskType {
    /// Property/serde spelling of the task type
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::UserTask => "user_task",
            TaskType::ServiceTask => "service_task",
            TaskType::ScriptTask => "script_task",
        }
    }

    /// Whether the engine completes this task without external action
    #[inline]
    pub fn is_automatic(&self) -> bool {
        matches!(self, TaskType::ServiceTask | TaskType::ScriptTask)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_task" => Ok(TaskType::UserTask),
            "service_task" => Ok(TaskType::ServiceTask),
            "script_task" => Ok(TaskType::ScriptTask),
            other => Err(CoreError::ConfigurationError(format!(
                "Unknown task type: {}",
                other
            ))),
        }
    }
}

/// A node in the process graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// ID of the node, unique within its definition
    pub id: String,

    /// Display name
    pub name: String,

    /// Kind of node
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Free-form configuration (task type, assignee, condition, expects)
    #[serde(default)]
    pub properties: HashMap<String, Value>,

    /// Ordered outgoing edge targets
    #[serde(default)]
    pub outgoing: Vec<String>,

    /// Incoming edge sources
    #[serde(default)]
    pub incoming: Vec<String>,
}

impl Node {
    /// Create a node without edges or properties
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            properties: HashMap::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Set the outgoing edges
    pub fn with_outgoing<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outgoing = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Set the incoming edges
    pub fn with_incoming<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.incoming = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Get a property value
    #[inline]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Get a property as a string slice
    #[inline]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Predecessor ids a JOIN node synchronizes, if declared as a string array
    pub fn join_expects(&self) -> Option<HashSet<String>> {
        let items = self.property(PROP_EXPECTS)?.as_array()?;
        items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    }
}

/// An immutable, versioned process graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    /// ID of the definition
    pub id: ProcessDefinitionId,

    /// Human-readable name
    pub name: String,

    /// Version, monotonic per name by convention of the deployer
    pub version: u32,

    /// Nodes keyed by node id
    pub nodes: HashMap<String, Node>,

    /// Node the process begins at
    pub start_node_id: String,

    /// Whether new instances may be started
    #[serde(default = "default_active")]
    pub active: bool,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl ProcessDefinition {
    /// Create an active definition with a generated id
    pub fn new(
        name: impl Into<String>,
        version: u32,
        start_node_id: impl Into<String>,
        nodes: Vec<Node>,
    ) -> Self {
        Self {
            id: ProcessDefinitionId(Uuid::new_v4().to_string()),
            name: name.into(),
            version,
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            start_node_id: start_node_id.into(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Replace the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = ProcessDefinitionId(id.into());
        self
    }

    /// Get a node by id
    #[inline]
    pub fn get_node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Get the start node
    #[inline]
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.get(&self.start_node_id)
    }

    /// Validate the graph
    pub fn validate(&self) -> Result<(), CoreError> {
        let start = self.start_node().ok_or_else(|| {
            CoreError::InvalidDefinition(format!(
                "Start node {} is not defined",
                self.start_node_id
            ))
        })?;

        if start.node_type != NodeType::Start {
            return Err(CoreError::InvalidDefinition(format!(
                "Start node {} has type {:?}",
                start.id, start.node_type
            )));
        }
        if !start.incoming.is_empty() {
            return Err(CoreError::InvalidDefinition(format!(
                "Start node {} has incoming edges",
                start.id
            )));
        }
        if start.outgoing.len() != 1 {
            return Err(CoreError::InvalidDefinition(format!(
                "Start node {} must have exactly one outgoing edge, found {}",
                start.id,
                start.outgoing.len()
            )));
        }

        for (key, node) in &self.nodes {
            if key != &node.id {
                return Err(CoreError::InvalidDefinition(format!(
                    "Node stored under {} has id {}",
                    key, node.id
                )));
            }

            for target in &node.outgoing {
                if !self.nodes.contains_key(target) {
                    return Err(CoreError::InvalidDefinition(format!(
                        "Node {} references undefined target: {}",
                        node.id, target
                    )));
                }
            }

            for source in &node.incoming {
                if !self.nodes.contains_key(source) {
                    return Err(CoreError::InvalidDefinition(format!(
                        "Node {} references undefined source: {}",
                        node.id, source
                    )));
                }
            }

            match node.node_type {
                NodeType::End if !node.outgoing.is_empty() => {
                    return Err(CoreError::InvalidDefinition(format!(
                        "End node {} has outgoing edges",
                        node.id
                    )));
                }
                NodeType::Task if node.outgoing.len() != 1 => {
                    return Err(CoreError::InvalidDefinition(format!(
                        "Task node {} must have exactly one outgoing edge, found {}",
                        node.id,
                        node.outgoing.len()
                    )));
                }
                NodeType::Join => self.validate_join(node)?,
                _ => {}
            }
        }

        if !self.reaches_end() {
            return Err(CoreError::InvalidDefinition(format!(
                "No end node is reachable from start node {}",
                self.start_node_id
            )));
        }

        Ok(())
    }

    fn validate_join(&self, node: &Node) -> Result<(), CoreError> {
        let expects = node.join_expects().ok_or_else(|| {
            CoreError::InvalidDefinition(format!(
                "Join node {} must declare '{}' as a list of node ids",
                node.id, PROP_EXPECTS
            ))
        })?;

        if expects.is_empty() {
            return Err(CoreError::InvalidDefinition(format!(
                "Join node {} expects zero incoming branches",
                node.id
            )));
        }

        if let Some(unknown) = expects.iter().find(|id| !self.nodes.contains_key(*id)) {
            return Err(CoreError::InvalidDefinition(format!(
                "Join node {} expects undefined node: {}",
                node.id, unknown
            )));
        }

        Ok(())
    }

    /// Breadth-first search from the start node for any END node
    fn reaches_end(&self) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(self.start_node_id.as_str());

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            let Some(node) = self.nodes.get(node_id) else {
                continue;
            };
            if node.node_type == NodeType::End {
                return true;
            }
            queue.extend(node.outgoing.iter().map(String::as_str));
        }

        false
    }
}
