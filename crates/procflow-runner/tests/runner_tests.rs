use procflow_core::{EngineConfig, InstanceStatus, ProcessDefinitionId, ProcessEngine, TaskStatus};
use procflow_runner::sample::{approval_process, run_sample};
use procflow_runner::{build_engine, RunnerConfig};
use std::io::Write;
use tokio_test::assert_ok;

#[tokio::test]
async fn approved_sample_is_archived_and_completes() {
    let engine = ProcessEngine::in_memory(EngineConfig::default());

    let report = assert_ok!(run_sample(&engine, true).await);
    assert_eq!(report.status, InstanceStatus::Completed);

    let names: Vec<_> = report.tasks.iter().map(|t| t.node_id.as_str()).collect();
    assert_eq!(names, vec!["task_1", "task_2"]);
    assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Completed));

    let instance = engine
        .get_process_instance(&report.instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(instance.variables["applicant"], serde_json::json!("alice"));
    assert_eq!(instance.variables["approval_result"], serde_json::json!("0"));
}

#[tokio::test]
async fn rejected_sample_waits_for_resubmission() {
    let engine = ProcessEngine::in_memory(EngineConfig::default());

    let report = assert_ok!(run_sample(&engine, false).await);
    assert_eq!(report.status, InstanceStatus::Running);

    let resubmit = engine.get_tasks_for_assignee("user").await.unwrap();
    assert_eq!(resubmit.len(), 1);
    assert_eq!(resubmit[0].node_id, "task_3");
    assert_eq!(resubmit[0].status, TaskStatus::Assigned);
}

#[tokio::test]
async fn build_engine_deploys_definitions_file() {
    let definition = approval_process().with_id("approval-from-file");
    let yaml = serde_yaml::to_string(&vec![definition]).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = RunnerConfig {
        definitions_path: Some(file.path().to_path_buf()),
        run_sample: false,
        ..RunnerConfig::default()
    };

    let engine = assert_ok!(build_engine(&config).await);
    let deployed = engine
        .get_process_definition(&ProcessDefinitionId("approval-from-file".to_string()))
        .await
        .unwrap();
    assert!(deployed.is_some());
}

#[tokio::test]
async fn build_engine_reports_missing_file() {
    let config = RunnerConfig {
        definitions_path: Some("/nonexistent/procflow/definitions.yaml".into()),
        ..RunnerConfig::default()
    };

    let err = match build_engine(&config).await {
        Ok(_) => panic!("expected a missing definitions file to fail"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("Failed to read definitions file"));
}
