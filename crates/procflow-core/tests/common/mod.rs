//! Definitions and helpers shared by the integration suites

#![allow(dead_code)]

use procflow_core::domain::process_definition::{
    PROP_ASSIGNEE, PROP_CONDITION, PROP_EXPECTS, PROP_TASK_TYPE,
};
use procflow_core::{EngineConfig, Node, NodeType, ProcessDefinition, ProcessEngine};
use serde_json::json;

/// Initialize tracing for tests with a default configuration
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("procflow_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn engine() -> ProcessEngine {
    init_test_tracing();
    ProcessEngine::in_memory(EngineConfig::default())
}

pub fn user_task(id: &str, assignee: &str) -> Node {
    Node::new(id, id, NodeType::Task)
        .with_property(PROP_TASK_TYPE, json!("user_task"))
        .with_property(PROP_ASSIGNEE, json!(assignee))
}

/// start -> work (service task) -> end
pub fn service_process() -> ProcessDefinition {
    ProcessDefinition::new(
        "service",
        1,
        "start",
        vec![
            Node::new("start", "Start", NodeType::Start).with_outgoing(["work"]),
            Node::new("work", "Work", NodeType::Task)
                .with_property(PROP_TASK_TYPE, json!("service_task"))
                .with_incoming(["start"])
                .with_outgoing(["end"]),
            Node::new("end", "End", NodeType::End).with_incoming(["work"]),
        ],
    )
}

/// start -> approve (user task for admin) -> end
pub fn single_approval_process() -> ProcessDefinition {
    ProcessDefinition::new(
        "single approval",
        1,
        "start",
        vec![
            Node::new("start", "Start", NodeType::Start).with_outgoing(["approve"]),
            user_task("approve", "admin")
                .with_incoming(["start"])
                .with_outgoing(["end"]),
            Node::new("end", "End", NodeType::End).with_incoming(["approve"]),
        ],
    )
}

/// start -> decide {{approval}} -> task_2 | task_3 (default) -> end
pub fn decision_process() -> ProcessDefinition {
    ProcessDefinition::new(
        "decision",
        1,
        "start",
        vec![
            Node::new("start", "Start", NodeType::Start).with_outgoing(["decide"]),
            Node::new("decide", "Decide", NodeType::Decision)
                .with_property(PROP_CONDITION, json!("{{approval}}"))
                .with_incoming(["start"])
                .with_outgoing(["task_2", "task_3"]),
            user_task("task_2", "admin")
                .with_incoming(["decide"])
                .with_outgoing(["end"]),
            user_task("task_3", "admin")
                .with_incoming(["decide"])
                .with_outgoing(["end"]),
            Node::new("end", "End", NodeType::End).with_incoming(["task_2", "task_3"]),
        ],
    )
}

/// start -> fork -> (a, b) -> join -> review -> end
pub fn parallel_process() -> ProcessDefinition {
    ProcessDefinition::new(
        "parallel",
        1,
        "start",
        vec![
            Node::new("start", "Start", NodeType::Start).with_outgoing(["fork"]),
            Node::new("fork", "Fork", NodeType::Parallel)
                .with_incoming(["start"])
                .with_outgoing(["a", "b"]),
            user_task("a", "alice")
                .with_incoming(["fork"])
                .with_outgoing(["join"]),
            user_task("b", "bob")
                .with_incoming(["fork"])
                .with_outgoing(["join"]),
            Node::new("join", "Join", NodeType::Join)
                .with_property(PROP_EXPECTS, json!(["a", "b"]))
                .with_incoming(["a", "b"])
                .with_outgoing(["review"]),
            user_task("review", "carol")
                .with_incoming(["join"])
                .with_outgoing(["end"]),
            Node::new("end", "End", NodeType::End).with_incoming(["review"]),
        ],
    )
}

/// start -> fork -> (handle, end); handle -> end
pub fn partial_end_process() -> ProcessDefinition {
    ProcessDefinition::new(
        "partial end",
        1,
        "start",
        vec![
            Node::new("start", "Start", NodeType::Start).with_outgoing(["fork"]),
            Node::new("fork", "Fork", NodeType::Parallel).with_outgoing(["handle", "end"]),
            user_task("handle", "alice").with_outgoing(["end"]),
            Node::new("end", "End", NodeType::End),
        ],
    )
}

/// start -> fork -> (a, b) -> join (expects a, b, c) -> end; c is never reached
pub fn unreleasable_join_process() -> ProcessDefinition {
    let service = |id: &str| {
        Node::new(id, id, NodeType::Task)
            .with_property(PROP_TASK_TYPE, json!("service_task"))
            .with_outgoing(["join"])
    };

    ProcessDefinition::new(
        "unreleasable join",
        1,
        "start",
        vec![
            Node::new("start", "Start", NodeType::Start).with_outgoing(["fork"]),
            Node::new("fork", "Fork", NodeType::Parallel).with_outgoing(["a", "b"]),
            service("a"),
            service("b"),
            service("c"),
            Node::new("join", "Join", NodeType::Join)
                .with_property(PROP_EXPECTS, json!(["a", "b", "c"]))
                .with_outgoing(["end"]),
            Node::new("end", "End", NodeType::End),
        ],
    )
}

/// start -> route (decision, "0") -> fork with no outgoing edges; route's default is end
pub fn empty_fork_process() -> ProcessDefinition {
    ProcessDefinition::new(
        "empty fork",
        1,
        "start",
        vec![
            Node::new("start", "Start", NodeType::Start).with_outgoing(["route"]),
            Node::new("route", "Route", NodeType::Decision)
                .with_property(PROP_CONDITION, json!("0"))
                .with_outgoing(["fork", "end"]),
            Node::new("fork", "Fork", NodeType::Parallel),
            Node::new("end", "End", NodeType::End),
        ],
    )
}
