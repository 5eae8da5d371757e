//! Sample approval process
//!
//! An applicant's request is approved by `admin`. Approved requests are
//! archived by a service task, rejected ones go back to the applicant for
//! resubmission.

use anyhow::{Context, Result};
use procflow_core::domain::process_definition::{
    PROP_ASSIGNEE, PROP_CONDITION, PROP_TASK_TYPE,
};
use procflow_core::types::variables;
use procflow_core::{
    InstanceStatus, Node, NodeType, ProcessDefinition, ProcessDefinitionId, ProcessEngine,
    ProcessInstanceId, Task, Variables,
};
use serde_json::json;
use tracing::info;

/// Variable the approval decision branches on; `"0"` approves
pub const APPROVAL_VARIABLE: &str = "approval_result";

/// Build the approval process definition
pub fn approval_process() -> ProcessDefinition {
    ProcessDefinition::new(
        "approval",
        1,
        "start_1",
        vec![
            Node::new("start_1", "Start", NodeType::Start).with_outgoing(["task_1"]),
            Node::new("task_1", "Approve request", NodeType::Task)
                .with_property(PROP_TASK_TYPE, json!("user_task"))
                .with_property(PROP_ASSIGNEE, json!("admin"))
                .with_incoming(["start_1"])
                .with_outgoing(["decision_1"]),
            Node::new("decision_1", "Approved?", NodeType::Decision)
                .with_property(PROP_CONDITION, json!("{{approval_result}}"))
                .with_incoming(["task_1"])
                .with_outgoing(["task_2", "task_3"]),
            Node::new("task_2", "Archive", NodeType::Task)
                .with_property(PROP_TASK_TYPE, json!("service_task"))
                .with_incoming(["decision_1"])
                .with_outgoing(["end_1"]),
            Node::new("task_3", "Resubmit", NodeType::Task)
                .with_property(PROP_TASK_TYPE, json!("user_task"))
                .with_property(PROP_ASSIGNEE, json!("user"))
                .with_incoming(["decision_1"])
                .with_outgoing(["end_1"]),
            Node::new("end_1", "End", NodeType::End).with_incoming(["task_2", "task_3"]),
        ],
    )
}

/// Variables the sample instance starts with
pub fn sample_variables() -> Variables {
    variables([("applicant", json!("alice")), ("amount", json!(10000))])
}

/// What happened during a sample run
#[derive(Debug, Clone)]
pub struct SampleReport {
    /// Deployed definition
    pub definition_id: ProcessDefinitionId,
    /// Started instance
    pub instance_id: ProcessInstanceId,
    /// Instance status at the end of the run
    pub status: InstanceStatus,
    /// Every task the instance created, in creation order
    pub tasks: Vec<Task>,
}

/// Deploy the approval process, start an instance and let `admin` decide
pub async fn run_sample(engine: &ProcessEngine, approve: bool) -> Result<SampleReport> {
    let definition_id = engine
        .deploy_process(approval_process())
        .await
        .context("Failed to deploy sample process")?;
    info!(definition_id = %definition_id.0, "Sample process deployed");

    let instance_id = engine
        .start_process(&definition_id, sample_variables())
        .await
        .context("Failed to start sample instance")?;

    let approval = engine
        .get_tasks_for_assignee("admin")
        .await?
        .into_iter()
        .find(|t| t.instance_id == instance_id)
        .context("Sample instance created no approval task")?;
    info!(task_id = %approval.id.0, name = %approval.name, "Approval task waiting");

    let decision = if approve { "0" } else { "1" };
    engine
        .complete_task(&approval.id, variables([(APPROVAL_VARIABLE, json!(decision))]))
        .await
        .context("Failed to complete approval task")?;

    let instance = engine
        .get_process_instance(&instance_id)
        .await?
        .context("Sample instance disappeared")?;
    let tasks = engine.get_tasks_for_instance(&instance_id).await?;

    for task in &tasks {
        info!(
            task = %task.name,
            status = ?task.status,
            assignee = ?task.assignee,
            "Sample task"
        );
    }
    info!(instance_id = %instance_id.0, status = ?instance.status, "Sample run finished");

    Ok(SampleReport {
        definition_id,
        instance_id,
        status: instance.status,
        tasks,
    })
}
