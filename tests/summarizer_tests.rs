use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentctl::error::SummarizeError;
use agentctl::registry::{AgentRecord, AgentStatus, RegistryStore};
use agentctl::summarize::{
    InferenceClient, InferenceOutcome, InferenceRequest, Summarizer, SummaryMethod,
    SummaryStatus, SummaryStore,
};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use tempfile::TempDir;

// ─── Helper ───────────────────────────────────────────────────────────

/// Returns a fixed outcome and records every request it sees.
struct MockInference {
    outcome: InferenceOutcome,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl MockInference {
    fn new(outcome: InferenceOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl InferenceClient for MockInference {
    async fn complete_json(&self, request: &InferenceRequest) -> InferenceOutcome {
        self.requests.lock().unwrap().push(request.clone());
        self.outcome.clone()
    }
}

struct Fixture {
    registry: RegistryStore,
    summaries: SummaryStore,
    log_dir: PathBuf,
    _home: TempDir,
}

fn fixture() -> Fixture {
    let home = TempDir::new().expect("failed to create temp dir");
    let log_dir = home.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    Fixture {
        registry: RegistryStore::new(home.path().join("agent-registry.json"), 24),
        summaries: SummaryStore::new(home.path().join("summaries")),
        log_dir,
        _home: home,
    }
}

fn summarizer(fx: &Fixture, client: Arc<MockInference>, max_log_chars: usize) -> Summarizer {
    Summarizer::new(
        fx.registry.clone(),
        fx.summaries.clone(),
        fx.log_dir.clone(),
        client,
        max_log_chars,
        Duration::from_secs(1),
    )
}

/// Register a terminal agent whose log holds `body` under a standard header.
fn finished_agent(fx: &Fixture, id: &str, exit_code: i32, body: &str) -> AgentRecord {
    let log_file = format!("{id}.log");
    write_log(&fx.log_dir, &log_file, id, body);
    let mut record = AgentRecord::running(id.into(), "demo".into(), 1, log_file, IndexMap::new());
    record.finish(AgentStatus::from_exit_code(exit_code), Some(exit_code), Utc::now());
    fx.registry.register(record.clone()).unwrap();
    record
}

fn write_log(dir: &Path, name: &str, id: &str, body: &str) {
    let content = format!(
        "[Agent] ID: {id}\n[Agent] Recipe: demo.yaml\n[Agent] Started: now\n[Agent] Params: {{}}\n{}\n\n{body}\n",
        "=".repeat(60)
    );
    std::fs::write(dir.join(name), content).unwrap();
}

fn unavailable() -> Arc<MockInference> {
    MockInference::new(InferenceOutcome::Unavailable("connection refused".into()))
}

// ============================================================
// Primary path
// ============================================================

#[tokio::test]
async fn test_primary_response_is_used() {
    let fx = fixture();
    let client = MockInference::new(InferenceOutcome::Parsed(serde_json::json!({
        "status": "SUCCESS",
        "keyFindings": ["f1", "f2", "f3", "f4", "f5", "f6"],
        "actions": ["reviewed code"],
        "recommendations": [],
        "errors": [],
    })));
    finished_agent(&fx, "agent-1", 0, "some output");

    let summary = summarizer(&fx, client.clone(), 8000)
        .summarize_agent("agent-1")
        .await
        .unwrap();

    assert_eq!(summary.method, SummaryMethod::Primary);
    assert_eq!(summary.status, SummaryStatus::Success);
    assert_eq!(summary.key_findings.len(), 5, "findings are capped");
    assert_eq!(summary.actions, vec!["reviewed code"]);

    let requests = client.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].user.contains("demo"));
    assert!(requests[0].user.contains("some output"));
    assert!(!requests[0].user.contains("[Agent] ID:"), "header is stripped");
}

#[tokio::test]
async fn test_long_log_is_truncated_in_request() {
    let fx = fixture();
    let client = unavailable();
    finished_agent(&fx, "agent-1", 0, &"x".repeat(200));

    summarizer(&fx, client.clone(), 100)
        .summarize_agent("agent-1")
        .await
        .unwrap();

    let requests = client.requests.lock().unwrap();
    assert!(requests[0].user.contains("\n... [truncated]"));
    assert!(!requests[0].user.contains(&"x".repeat(101)));
}

// ============================================================
// Fallback path
// ============================================================

#[tokio::test]
async fn test_unreachable_primary_falls_back_to_heuristic() {
    let fx = fixture();
    finished_agent(&fx, "agent-1", 0, "found a stale lockfile\nMission Complete");

    let summary = summarizer(&fx, unavailable(), 8000)
        .summarize_agent("agent-1")
        .await
        .unwrap();

    assert_eq!(summary.method, SummaryMethod::Heuristic);
    assert_eq!(summary.status, SummaryStatus::Success);
    assert_eq!(summary.key_findings, vec!["found a stale lockfile"]);
}

#[tokio::test]
async fn test_malformed_primary_falls_back_to_heuristic() {
    let fx = fixture();
    let client = MockInference::new(InferenceOutcome::Malformed("no JSON".into()));
    finished_agent(&fx, "agent-1", 0, "an error occurred while parsing");

    let summary = summarizer(&fx, client, 8000)
        .summarize_agent("agent-1")
        .await
        .unwrap();

    assert_eq!(summary.method, SummaryMethod::Heuristic);
    assert_eq!(summary.status, SummaryStatus::Partial);
    assert_eq!(summary.errors.len(), 1);
}

#[tokio::test]
async fn test_primary_object_without_status_falls_back() {
    let fx = fixture();
    let client = MockInference::new(InferenceOutcome::Parsed(serde_json::json!({"foo": 1})));
    finished_agent(&fx, "agent-1", 0, "plain output line");

    let summary = summarizer(&fx, client, 8000)
        .summarize_agent("agent-1")
        .await
        .unwrap();
    assert_eq!(summary.method, SummaryMethod::Heuristic);
}

// ============================================================
// Exit code override
// ============================================================

#[tokio::test]
async fn test_nonzero_exit_forces_failure() {
    let fx = fixture();
    let client = MockInference::new(InferenceOutcome::Parsed(serde_json::json!({
        "status": "SUCCESS",
    })));
    finished_agent(&fx, "agent-primary", 2, "Mission Complete");
    finished_agent(&fx, "agent-heuristic", 1, "everything looked fine");

    let s = summarizer(&fx, client, 8000);
    let primary = s.summarize_agent("agent-primary").await.unwrap();
    assert_eq!(primary.method, SummaryMethod::Primary);
    assert_eq!(primary.status, SummaryStatus::Failure);

    let s = summarizer(&fx, unavailable(), 8000);
    let heuristic = s.summarize_agent("agent-heuristic").await.unwrap();
    assert_eq!(heuristic.status, SummaryStatus::Failure);
}

// ============================================================
// Idempotency and batch mode
// ============================================================

#[tokio::test]
async fn test_resummarizing_replaces_summary() {
    let fx = fixture();
    finished_agent(&fx, "agent-1", 0, "checking things carefully");
    let s = summarizer(&fx, unavailable(), 8000);

    let first = s.summarize_agent("agent-1").await.unwrap();
    let second = s.summarize_agent("agent-1").await.unwrap();

    assert!(second.summarized_at >= first.summarized_at);
    assert!(fx.registry.find_agent("agent-1").unwrap().summarized);

    let files: Vec<_> = std::fs::read_dir(fx.summaries.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec!["agent-1-summary.json"]);
}

#[tokio::test]
async fn test_process_pending_handles_each_agent() {
    let fx = fixture();
    finished_agent(&fx, "agent-ok", 0, "all done here");
    finished_agent(&fx, "agent-bad", 2, "it broke badly");

    let mut no_log = AgentRecord::running("agent-nolog".into(), "demo".into(), 1, "missing.log".into(), IndexMap::new());
    no_log.finish(AgentStatus::Completed, Some(0), Utc::now());
    fx.registry.register(no_log).unwrap();

    let running = AgentRecord::running("agent-running".into(), "demo".into(), 1, "r.log".into(), IndexMap::new());
    fx.registry.register(running).unwrap();

    let s = summarizer(&fx, unavailable(), 8000);
    let report = s.process_pending().await;

    let done: Vec<_> = report.summarized.iter().map(|i| i.agent_id.as_str()).collect();
    assert_eq!(done, vec!["agent-ok", "agent-bad"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "agent-nolog");

    assert!(!fx.registry.find_agent("agent-running").unwrap().summarized);
    assert!(!fx.registry.find_agent("agent-nolog").unwrap().summarized);

    let again = s.process_pending().await;
    assert!(again.summarized.is_empty());
    assert_eq!(again.failed.len(), 1, "agent without a log stays pending");
}

#[tokio::test]
async fn test_unknown_agent_and_missing_log_errors() {
    let fx = fixture();
    let s = summarizer(&fx, unavailable(), 8000);
    assert!(matches!(
        s.summarize_agent("agent-ghost").await,
        Err(SummarizeError::AgentNotFound { .. })
    ));

    let mut record = AgentRecord::running("agent-1".into(), "demo".into(), 1, "gone.log".into(), IndexMap::new());
    record.finish(AgentStatus::Completed, Some(0), Utc::now());
    fx.registry.register(record).unwrap();
    assert!(matches!(
        s.summarize_agent("agent-1").await,
        Err(SummarizeError::LogMissing { .. })
    ));
}
