use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The TOML file structure for agentctl.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub agent: Option<AgentConfig>,
    pub tracker: Option<TrackerConfig>,
    pub summarizer: Option<SummarizerConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub home: Option<String>,
    pub recipes_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Executable that runs a recipe (e.g. "goose").
    pub command: Option<String>,
    /// Arguments placed before the recipe path.
    pub args: Option<Vec<String>>,
    /// Flag preceding each `key=value` parameter.
    pub param_flag: Option<String>,
    pub recipe_extension: Option<String>,
    pub max_turns: Option<u32>,
    /// Extra environment variables for every spawned agent.
    pub env: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct TrackerConfig {
    pub poll_interval_ms: Option<u64>,
    pub auto_cleanup_hours: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SummarizerConfig {
    pub enabled: Option<bool>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_log_chars: Option<usize>,
    pub health_url: Option<String>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// State directory holding the registry, logs and summaries.
    pub home: PathBuf,
    pub recipes_dir: PathBuf,
    pub agent_command: String,
    pub agent_args: Vec<String>,
    pub param_flag: String,
    pub recipe_extension: String,
    pub max_turns: u32,
    pub extra_env: Vec<(String, String)>,
    pub poll_interval_ms: u64,
    pub auto_cleanup_hours: u64,
    pub summarizer_enabled: bool,
    pub summarizer_model: String,
    pub summarizer_timeout_secs: u64,
    pub max_log_chars: usize,
    /// Probed before each inference call; `None` skips the probe.
    pub inference_health_url: Option<String>,
}

impl AppConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.home.join("agent-registry.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.home.join("summaries")
    }

    /// Environment overrides applied on top of the caller's environment:
    /// no color codes, a fixed turn budget, and non-interactive execution.
    pub fn agent_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("NO_COLOR".to_string(), "true".to_string()),
            ("GOOSE_MODE".to_string(), "auto".to_string()),
            ("GOOSE_MAX_TURNS".to_string(), self.max_turns.to_string()),
        ];
        env.extend(self.extra_env.iter().cloned());
        env
    }
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub home: Option<PathBuf>,
    pub recipes_dir: Option<PathBuf>,
    pub agent_command: Option<String>,
    pub agent_args: Option<Vec<String>>,
    pub param_flag: Option<String>,
    pub recipe_extension: Option<String>,
    pub max_turns: Option<u32>,
    pub extra_env: Option<Vec<(String, String)>>,
    pub poll_interval_ms: Option<u64>,
    pub auto_cleanup_hours: Option<u64>,
    pub summarizer_enabled: Option<bool>,
    pub summarizer_model: Option<String>,
    pub summarizer_timeout_secs: Option<u64>,
    pub max_log_chars: Option<usize>,
    pub inference_health_url: Option<String>,
}

impl ConfigFile {
    /// Flatten the sectioned file layout into a [`PartialConfig`].
    ///
    /// A relative `recipes_dir` is kept relative here and anchored to the
    /// home directory in `finalize`.
    pub fn to_partial(&self) -> PartialConfig {
        let general = self.general.as_ref();
        let agent = self.agent.as_ref();
        let tracker = self.tracker.as_ref();
        let summarizer = self.summarizer.as_ref();

        PartialConfig {
            home: general.and_then(|g| g.home.as_deref()).map(expand_home),
            recipes_dir: general
                .and_then(|g| g.recipes_dir.as_deref())
                .map(expand_home),
            agent_command: agent.and_then(|a| a.command.clone()),
            agent_args: agent.and_then(|a| a.args.clone()),
            param_flag: agent.and_then(|a| a.param_flag.clone()),
            recipe_extension: agent.and_then(|a| a.recipe_extension.clone()),
            max_turns: agent.and_then(|a| a.max_turns),
            extra_env: agent
                .and_then(|a| a.env.as_ref())
                .map(|env| env.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            poll_interval_ms: tracker.and_then(|t| t.poll_interval_ms),
            auto_cleanup_hours: tracker.and_then(|t| t.auto_cleanup_hours),
            summarizer_enabled: summarizer.and_then(|s| s.enabled),
            summarizer_model: summarizer.and_then(|s| s.model.clone()),
            summarizer_timeout_secs: summarizer.and_then(|s| s.timeout_secs),
            max_log_chars: summarizer.and_then(|s| s.max_log_chars),
            inference_health_url: summarizer.and_then(|s| s.health_url.clone()),
        }
    }
}

/// Expand a leading `~/` using the user's home directory.
fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    Path::new(raw).to_path_buf()
}
