use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentctl::config::{AppConfig, PartialConfig};
use agentctl::error::SpawnError;
use agentctl::orchestration::{SpawnMode, Spawner};
use agentctl::registry::{AgentStatus, RegistryStore, EXIT_SPAWN_FAILED};
use agentctl::summarize::{Summarizer, SummaryStore};
use indexmap::IndexMap;
use tempfile::TempDir;

// ─── Helper ───────────────────────────────────────────────────────────

/// Recipes are shell scripts run as `sh <recipe> --params k=v ...`.
fn test_config(home: &Path) -> Arc<AppConfig> {
    Arc::new(
        PartialConfig {
            home: Some(home.to_path_buf()),
            agent_command: Some("sh".to_string()),
            agent_args: Some(vec![]),
            summarizer_enabled: Some(false),
            inference_health_url: Some(String::new()),
            poll_interval_ms: Some(50),
            ..Default::default()
        }
        .finalize(),
    )
}

fn write_recipe(config: &AppConfig, name: &str, script: &str) {
    std::fs::create_dir_all(&config.recipes_dir).unwrap();
    std::fs::write(config.recipes_dir.join(format!("{name}.yaml")), script).unwrap();
}

fn setup(with_summarizer: bool) -> (Spawner, RegistryStore, Arc<AppConfig>, TempDir) {
    let home = TempDir::new().expect("failed to create temp dir");
    let config = test_config(home.path());
    let registry = RegistryStore::new(config.registry_path(), config.auto_cleanup_hours);
    let summarizer = with_summarizer
        .then(|| Arc::new(Summarizer::from_config(&config, registry.clone())));
    let spawner = Spawner::new(config.clone(), registry.clone(), summarizer);
    (spawner, registry, config, home)
}

fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn read_log(config: &AppConfig, log_file: &str) -> String {
    std::fs::read_to_string(config.log_dir().join(log_file)).unwrap()
}

// ============================================================
// Recipe resolution
// ============================================================

#[tokio::test]
async fn test_missing_recipe_creates_no_record() {
    let (spawner, registry, config, _home) = setup(false);

    let err = spawner
        .spawn("does-not-exist", IndexMap::new(), SpawnMode::Background)
        .await
        .unwrap_err();

    assert!(matches!(err, SpawnError::RecipeMissing { .. }));
    assert!(registry.load().agents.is_empty());
    assert!(!config.registry_path().exists());
}

// ============================================================
// Launch failures
// ============================================================

#[tokio::test]
async fn test_unstartable_executable_records_failed_agent() {
    let home = TempDir::new().unwrap();
    let mut config = (*test_config(home.path())).clone();
    config.agent_command = "/nonexistent/agentctl-missing-binary".to_string();
    let config = Arc::new(config);
    write_recipe(&config, "demo", "echo hi\n");
    let registry = RegistryStore::new(config.registry_path(), 24);
    let spawner = Spawner::new(config.clone(), registry.clone(), None);

    let err = spawner
        .spawn("demo", IndexMap::new(), SpawnMode::Background)
        .await
        .unwrap_err();
    assert!(matches!(err, SpawnError::SpawnFailed { .. }));

    let agents = registry.load().agents;
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].status, AgentStatus::Failed);
    assert_eq!(agents[0].exit_code, Some(EXIT_SPAWN_FAILED));
    assert!(agents[0].end_time.is_some());
    assert!(agents[0].error.as_deref().unwrap().contains("spawn failed"));
}

// ============================================================
// Background and blocking modes
// ============================================================

#[tokio::test]
async fn test_background_spawn_returns_before_child_exits() {
    let (spawner, registry, config, _home) = setup(false);
    write_recipe(&config, "demo", "sleep 1\necho done\n");

    let started = Instant::now();
    let spawned = spawner
        .spawn("demo", IndexMap::new(), SpawnMode::Background)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(spawned.pid > 0);
    assert_eq!(spawned.status, AgentStatus::Running);

    let record = registry.find_agent(&spawned.agent_id).unwrap();
    assert_eq!(record.status, AgentStatus::Running);
    assert!(record.end_time.is_none());
    assert!(record.exit_code.is_none());
    assert_eq!(spawner.background_len(), 1);

    spawner.join_background().await;

    let record = registry.find_agent(&spawned.agent_id).unwrap();
    assert_eq!(record.status, AgentStatus::Completed);
    assert_eq!(record.exit_code, Some(0));
    assert!(record.end_time.is_some());
}

#[tokio::test]
async fn test_blocking_spawn_waits_for_exit() {
    let (spawner, registry, config, _home) = setup(false);
    write_recipe(&config, "slow", "sleep 1\nexit 3\n");

    let started = Instant::now();
    let spawned = spawner
        .spawn("slow", IndexMap::new(), SpawnMode::Wait)
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(spawned.status, AgentStatus::Failed);
    assert_eq!(spawned.exit_code, Some(3));

    let record = registry.find_agent(&spawned.agent_id).unwrap();
    assert_eq!(record.status, AgentStatus::Failed);
    assert_eq!(record.exit_code, Some(3));
}

// ============================================================
// Log contents, arguments and environment
// ============================================================

#[tokio::test]
async fn test_log_has_header_output_and_footer() {
    let (spawner, _registry, config, _home) = setup(false);
    write_recipe(
        &config,
        "demo",
        "echo \"args: $*\"\necho \"env: $NO_COLOR $GOOSE_MODE $GOOSE_MAX_TURNS\"\necho oops >&2\n",
    );

    let spawned = spawner
        .spawn(
            "demo",
            params(&[("user_input", "Review src/"), ("depth", "2")]),
            SpawnMode::Wait,
        )
        .await
        .unwrap();

    let tag = spawned.agent_id.rsplit('-').next().unwrap();
    assert!(spawned.log_file.ends_with(&format!("-demo-{tag}.log")));
    let log = read_log(&config, &spawned.log_file);
    assert!(log.starts_with(&format!("[Agent] ID: {}\n", spawned.agent_id)));
    assert!(log.contains("[Agent] Recipe: "));
    assert!(log.contains(r#"[Agent] Params: {"user_input":"Review src/","depth":"2"}"#));
    assert!(log.contains(&"=".repeat(60)));
    assert!(log.contains("args: --params user_input=Review src/ --params depth=2"));
    assert!(log.contains("env: true auto 50"));
    assert!(log.contains("oops"));
    assert!(log.trim_end().ends_with("[Agent] Exit code: 0"));

    let header_end = log.find(&"=".repeat(60)).unwrap();
    assert!(log.find("args:").unwrap() > header_end);
}

#[tokio::test]
async fn test_recipe_name_with_extension_is_normalized() {
    let (spawner, registry, config, _home) = setup(false);
    write_recipe(&config, "demo", "true\n");

    let spawned = spawner
        .spawn("demo.yaml", IndexMap::new(), SpawnMode::Wait)
        .await
        .unwrap();
    assert_eq!(spawned.recipe, "demo");
    assert_eq!(registry.find_agent(&spawned.agent_id).unwrap().recipe, "demo");
}

// ============================================================
// Completion hook
// ============================================================

#[tokio::test]
async fn test_completion_hook_summarizes_agent() {
    let (spawner, registry, config, _home) = setup(true);
    write_recipe(&config, "demo", "echo 'checking the workspace files'\necho 'Mission Complete'\n");

    let spawned = spawner
        .spawn("demo", IndexMap::new(), SpawnMode::Background)
        .await
        .unwrap();
    spawner.join_background().await;

    let record = registry.find_agent(&spawned.agent_id).unwrap();
    assert!(record.summarized);

    let summary = SummaryStore::new(config.summaries_dir())
        .load(&spawned.agent_id)
        .expect("summary written by completion hook");
    assert_eq!(summary.actions, vec!["checking the workspace files"]);
}

#[tokio::test]
async fn test_parallel_agents_all_recorded() {
    let (spawner, registry, config, _home) = setup(false);
    write_recipe(&config, "demo", "sleep 0.2\n");

    let mut ids = Vec::new();
    for _ in 0..4 {
        let spawned = spawner
            .spawn("demo", IndexMap::new(), SpawnMode::Background)
            .await
            .unwrap();
        ids.push(spawned.agent_id);
    }
    spawner.join_background().await;

    let agents = registry.load().agents;
    assert_eq!(agents.len(), 4);
    for id in ids {
        let agent = registry.find_agent(&id).unwrap();
        assert_eq!(agent.status, AgentStatus::Completed);
    }
}

#[tokio::test]
async fn test_concurrent_spawns_get_separate_logs() {
    let (spawner, registry, config, _home) = setup(false);
    write_recipe(&config, "demo", "echo \"pid $$\"\n");

    let (a, b) = tokio::join!(
        spawner.spawn("demo", IndexMap::new(), SpawnMode::Background),
        spawner.spawn("demo", IndexMap::new(), SpawnMode::Background),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.log_file, b.log_file);
    spawner.join_background().await;

    for spawned in [&a, &b] {
        let log = read_log(&config, &spawned.log_file);
        assert!(log.starts_with(&format!("[Agent] ID: {}\n", spawned.agent_id)));
        assert_eq!(log.matches("[Agent] Exit code:").count(), 1);
        assert_eq!(log.matches("pid ").count(), 1);
        let record = registry.find_agent(&spawned.agent_id).unwrap();
        assert_eq!(record.exit_code, Some(0));
    }
}
