//! Merged registry + summary views for retrieval.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::registry::{AgentRecord, AgentStatus, RegistryStore};
use crate::summarize::{format_duration, Summary, SummaryStatus, SummaryStore};

pub const DEFAULT_RECENT: usize = 5;

/// Status shown for a result: the summary's verdict when there is one,
/// otherwise derived from the registry status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayStatus {
    Success,
    Failure,
    Partial,
    Pending,
}

impl DisplayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayStatus::Success => "SUCCESS",
            DisplayStatus::Failure => "FAILURE",
            DisplayStatus::Partial => "PARTIAL",
            DisplayStatus::Pending => "PENDING",
        }
    }

    fn resolve(agent: &AgentRecord, summary: Option<&Summary>) -> Self {
        match (summary.map(|s| s.status), agent.status) {
            (Some(SummaryStatus::Success), _) => DisplayStatus::Success,
            (Some(SummaryStatus::Failure), _) => DisplayStatus::Failure,
            (Some(SummaryStatus::Partial), _) => DisplayStatus::Partial,
            (None, AgentStatus::Running) => DisplayStatus::Pending,
            (None, AgentStatus::Failed) => DisplayStatus::Failure,
            (None, AgentStatus::Completed) => DisplayStatus::Success,
        }
    }
}

impl std::fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedResult {
    pub agent_id: String,
    pub recipe: String,
    pub status: DisplayStatus,
    pub agent_status: AgentStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub log_file: String,
    pub has_summary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

/// Which results to collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultQuery {
    Id(String),
    Recipe(String),
    Recent(usize),
    All,
}

pub struct ResultCollector {
    registry: RegistryStore,
    summaries: SummaryStore,
}

impl ResultCollector {
    pub fn new(registry: RegistryStore, summaries: SummaryStore) -> Self {
        Self {
            registry,
            summaries,
        }
    }

    pub fn from_config(config: &AppConfig, registry: RegistryStore) -> Self {
        Self::new(registry, SummaryStore::new(config.summaries_dir()))
    }

    pub fn query(&self, query: &ResultQuery) -> Vec<CollectedResult> {
        match query {
            ResultQuery::Id(id) => self.by_id(id).into_iter().collect(),
            ResultQuery::Recipe(name) => self.by_recipe(name),
            ResultQuery::Recent(n) => self.recent(*n),
            ResultQuery::All => self.all(),
        }
    }

    /// Exact id or prefix.
    pub fn by_id(&self, query: &str) -> Option<CollectedResult> {
        self.registry
            .find_agent(query)
            .map(|agent| self.collect(agent, Utc::now()))
    }

    /// Agents whose recipe equals or contains `name`, newest first.
    pub fn by_recipe(&self, name: &str) -> Vec<CollectedResult> {
        self.collect_where(|agent| agent.recipe == name || agent.recipe.contains(name))
    }

    /// The `n` most recently started agents.
    pub fn recent(&self, n: usize) -> Vec<CollectedResult> {
        let mut results = self.all();
        results.truncate(n);
        results
    }

    /// Every agent, newest first.
    pub fn all(&self) -> Vec<CollectedResult> {
        self.collect_where(|_| true)
    }

    fn collect_where(&self, keep: impl Fn(&AgentRecord) -> bool) -> Vec<CollectedResult> {
        let now = Utc::now();
        let mut agents: Vec<AgentRecord> = self
            .registry
            .load()
            .agents
            .into_iter()
            .filter(|a| keep(a))
            .collect();
        agents.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        agents.into_iter().map(|a| self.collect(a, now)).collect()
    }

    fn collect(&self, agent: AgentRecord, now: DateTime<Utc>) -> CollectedResult {
        let summary = self.summaries.load(&agent.id);
        let status = DisplayStatus::resolve(&agent, summary.as_ref());
        let duration = format_duration(agent.end_time.unwrap_or(now) - agent.start_time);
        CollectedResult {
            agent_id: agent.id,
            recipe: agent.recipe,
            status,
            agent_status: agent.status,
            start_time: agent.start_time,
            end_time: agent.end_time,
            duration,
            exit_code: agent.exit_code,
            log_file: agent.log_file,
            has_summary: summary.is_some(),
            summary,
        }
    }
}
