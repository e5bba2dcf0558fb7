//! End-to-end workflow tests against a real state directory
//!
//! Each test builds a driver over a `FileStateStore` in a fresh temp dir and
//! checks what ends up on disk, including across driver instances (which is
//! how a resumed process sees the record).

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde_json::Value;
use serial_test::serial;
use tempfile::TempDir;

use sparcflow::{
    CapabilityOrchestrator, CapabilityRequest, CapabilityResponse, Config, ExitCode,
    FileStateStore, Mode, NodeRegistry, PersistenceError, PhaseCapability, PhaseId,
    RuleBasedOrchestrator, RunOutcome, SparcflowError, StatusKind, TemplateCapability,
    WorkflowDriver, WorkflowInput,
};

struct Workspace {
    _td: TempDir,
    dir: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let td = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().join("workflows")).unwrap();
        Self { _td: td, dir }
    }

    fn driver(&self) -> WorkflowDriver {
        self.driver_with(NodeRegistry::offline())
    }

    fn driver_with(&self, registry: NodeRegistry) -> WorkflowDriver {
        WorkflowDriver::new(
            registry,
            Arc::new(RuleBasedOrchestrator),
            Arc::new(FileStateStore::new(self.dir.clone())),
        )
    }

    fn document(&self, issue: &str) -> Value {
        let text = std::fs::read_to_string(self.dir.join(format!("{issue}-state.json"))).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

/// Capability that fails for one phase and renders templates otherwise.
struct BrokenFor(PhaseId);

#[async_trait]
impl PhaseCapability for BrokenFor {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn generate(&self, request: CapabilityRequest) -> anyhow::Result<CapabilityResponse> {
        if request.phase == self.0 {
            bail!("model quota exhausted");
        }
        TemplateCapability.generate(request).await
    }
}

/// Capability that always names the same agent.
struct Dispatcher;

#[async_trait]
impl PhaseCapability for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    async fn generate(&self, _request: CapabilityRequest) -> anyhow::Result<CapabilityResponse> {
        Ok(CapabilityResponse::new(
            "Agent: triage-bot\nBecause it knows the codebase.",
            self.name(),
        ))
    }
}

#[tokio::test]
async fn test_design_run_writes_versioned_document_and_artifacts() {
    let ws = Workspace::new();
    let input = WorkflowInput::new("t1", Mode::Design, "X", "build X");

    let output = ws.driver().execute_workflow(input).await.unwrap();
    assert_eq!(output.outcome, RunOutcome::Completed);
    assert_eq!(output.state.current_phase, PhaseId::Completion);
    assert_eq!(output.performance.progress, 100);
    assert_eq!(output.performance.node_count, 5);

    let doc = ws.document("t1");
    assert_eq!(doc["schemaVersion"], "1");
    assert_eq!(doc["issueId"], "t1");
    assert_eq!(doc["currentPhase"], "completion");
    assert_eq!(doc["progress"], 100);
    assert_eq!(doc["metadata"]["transitions"].as_array().unwrap().len(), 5);
    assert_eq!(
        doc["metadata"]["performance"]["toolUsageCounts"]["template_render"],
        5
    );

    for key in ["requirements", "pseudocode", "architecture", "refinement", "completion"] {
        let path = ws.dir.join("t1").join(format!("{key}.md"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("X"), "{key} should mention the issue title");
    }
    assert!(!ws.dir.join("t1.lock").exists());
}

#[tokio::test]
async fn test_resume_across_driver_instances() {
    let ws = Workspace::new();
    let input = WorkflowInput::new("PROJ-3", Mode::Design, "Cache", "LRU cache for sessions");

    let first = ws.driver().with_max_iterations(3);
    let partial = first.execute_workflow(input.clone()).await.unwrap();
    assert_eq!(partial.outcome, RunOutcome::IterationBound { iterations: 3 });
    assert_eq!(partial.state.current_phase, PhaseId::Architecture);

    let status = ws.driver().get_workflow_status("PROJ-3").await.unwrap().unwrap();
    assert_eq!(status.status, StatusKind::InProgress);
    assert_eq!(status.progress, 60);
    assert_eq!(status.artifacts.len(), 3);

    let output = ws.driver().execute_workflow(input).await.unwrap();
    assert_eq!(output.outcome, RunOutcome::Completed);
    assert_eq!(output.state.created_at, partial.state.created_at);
    assert_eq!(output.performance.node_count, 2);
    assert_eq!(output.state.metadata.performance.node_executions["architecture"], 1);
}

#[tokio::test]
async fn test_debug_after_design_keeps_history() {
    let ws = Workspace::new();
    let driver = ws.driver();
    driver
        .execute_workflow(WorkflowInput::new("t1", Mode::Design, "X", "build X"))
        .await
        .unwrap();

    let output = driver
        .execute_workflow(WorkflowInput::new("t1", Mode::Debug, "X", "X crashes on start"))
        .await
        .unwrap();

    assert_eq!(output.outcome, RunOutcome::Completed);
    assert_eq!(output.state.current_phase, PhaseId::FixGeneration);
    assert!(output.artifacts.contains_key("requirements"));
    assert!(output.artifacts.contains_key("fixes"));
    assert_eq!(output.state.ai_context.decisions.len(), 7);
}

#[tokio::test]
async fn test_failed_node_is_visible_in_status() {
    let ws = Workspace::new();
    let registry = NodeRegistry::standard(Arc::new(BrokenFor(PhaseId::Testing)));
    let driver = ws.driver_with(registry);

    let output = driver
        .execute_workflow(WorkflowInput::new("b1", Mode::Build, "Parser", "fast parser"))
        .await
        .unwrap();
    let error = output.outcome.node_error().unwrap();
    assert_eq!(error.phase(), PhaseId::Testing);
    assert_eq!(SparcflowError::Node(error.clone()).to_exit_code(), ExitCode::NODE_FAILURE);

    let status = driver.get_workflow_status("b1").await.unwrap().unwrap();
    assert_eq!(status.status, StatusKind::Failed);
    let latest = status.latest_error.unwrap();
    assert_eq!(latest.kind, "node_failed");
    assert!(latest.message.contains("model quota exhausted"));

    let doc = ws.document("b1");
    assert_eq!(doc["metadata"]["errors"][0]["phase"], "testing");
    assert_eq!(doc["metadata"]["performance"]["errorRates"]["testing"], 1.0);
}

#[tokio::test]
async fn test_corrupted_record_is_not_overwritten() {
    let ws = Workspace::new();
    std::fs::create_dir_all(&ws.dir).unwrap();
    let path = ws.dir.join("t1-state.json");
    std::fs::write(&path, r#"{"schemaVersion": "7"}"#).unwrap();

    let err = ws
        .driver()
        .execute_workflow(WorkflowInput::new("t1", Mode::Design, "X", "d"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SparcflowError::Persistence(PersistenceError::Corrupted { .. })
    ));
    assert_eq!(err.to_exit_code(), ExitCode::PERSISTENCE_FAILURE);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        r#"{"schemaVersion": "7"}"#
    );
}

#[tokio::test]
async fn test_capability_orchestrator_uses_named_agent() {
    let ws = Workspace::new();
    let driver = WorkflowDriver::new(
        NodeRegistry::offline(),
        Arc::new(CapabilityOrchestrator::new(Arc::new(Dispatcher))),
        Arc::new(FileStateStore::new(ws.dir.clone())),
    );

    let output = driver
        .execute_workflow(WorkflowInput::new("c1", Mode::Debug, "Leak", "memory grows"))
        .await
        .unwrap();
    assert_eq!(output.outcome, RunOutcome::Completed);
    assert!(output.decisions.iter().all(|d| d.agent == "triage-bot"));

    let metrics = driver.get_workflow_metrics();
    assert_eq!(metrics.orchestrator_metrics.capability_calls, 2);
    assert_eq!(metrics.orchestrator_metrics.fallbacks, 0);
    assert_eq!(
        output.state.metadata.performance.tool_usage_counts["dispatcher"],
        2
    );
}

#[tokio::test]
async fn test_sanitized_issue_id_names_the_files() {
    let ws = Workspace::new();
    let output = ws
        .driver()
        .execute_workflow(WorkflowInput::new("gh 12/a", Mode::Build, "X", "d"))
        .await
        .unwrap();

    assert_eq!(output.state.issue_id, "gh_12_a");
    assert!(ws.dir.join("gh_12_a-state.json").is_file());
    assert!(
        ws.driver()
            .get_workflow_status("gh 12/a")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
#[serial]
async fn test_default_state_dir_follows_home_env() {
    let td = TempDir::new().unwrap();
    let home = td.path().join("home");
    let previous = std::env::var("SPARCFLOW_HOME").ok();
    // SAFETY: serialized with every other test that touches the environment
    unsafe { std::env::set_var("SPARCFLOW_HOME", &home) };

    let config = Config::builder().max_iterations(1).build().unwrap();
    let driver = WorkflowDriver::from_config(&config);
    let output = driver
        .execute_workflow(WorkflowInput::new("env-1", Mode::Build, "X", "d"))
        .await;

    match previous {
        Some(v) => unsafe { std::env::set_var("SPARCFLOW_HOME", v) },
        None => unsafe { std::env::remove_var("SPARCFLOW_HOME") },
    }

    assert_eq!(
        output.unwrap().outcome,
        RunOutcome::IterationBound { iterations: 1 }
    );
    assert!(home.join("workflows").join("env-1-state.json").is_file());
}
