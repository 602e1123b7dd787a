//! Persisted registry document: agent records plus retention metadata.
//!
//! Field names serialize in camelCase so the JSON document stays readable
//! by other tools that already consume the registry.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Unique, time-derived identifier for a spawned agent (`agent-<millis>-<hex>`).
pub type AgentId = String;

pub const REGISTRY_VERSION: &str = "1.0.0";
pub const REGISTRY_DESCRIPTION: &str = "Registry of spawned agents for parallel orchestration";

/// Exit code recorded when an agent is terminated with SIGTERM by `kill`.
pub const EXIT_TERMINATED: i32 = -15;

/// Exit code recorded when the agent executable could not be started.
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Lifecycle status of an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Running,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AgentStatus::Running)
    }

    /// Terminal status implied by a process exit code.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            AgentStatus::Completed
        } else {
            AgentStatus::Failed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One spawned job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: AgentId,
    /// Recipe name without extension.
    pub recipe: String,
    pub pid: u32,
    pub status: AgentStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// File name relative to the log directory.
    pub log_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
    #[serde(default)]
    pub summarized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Terminal state was inferred from liveness, not observed at exit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reconciled: bool,
}

impl AgentRecord {
    /// A fresh `running` record.
    pub fn running(
        id: AgentId,
        recipe: String,
        pid: u32,
        log_file: String,
        params: IndexMap<String, String>,
    ) -> Self {
        Self {
            id,
            recipe,
            pid,
            status: AgentStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            log_file,
            exit_code: None,
            params,
            summarized: false,
            error: None,
            reconciled: false,
        }
    }

    /// Apply a terminal transition. Returns `false` (and changes nothing)
    /// when the record is already terminal.
    pub fn finish(&mut self, status: AgentStatus, exit_code: Option<i32>, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.exit_code = exit_code;
        self.end_time = Some(at);
        true
    }

    /// Replace a reconciled guess with an exit that was actually observed.
    /// Only a record reconciled without an exit code can be corrected; the
    /// original end time is kept.
    pub fn correct_reconciled(&mut self, status: AgentStatus, exit_code: Option<i32>) -> bool {
        if !self.reconciled || self.exit_code.is_some() || exit_code.is_none() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.exit_code = exit_code;
        self.reconciled = false;
        true
    }

    /// True when `query` is this record's id or a prefix of it.
    pub fn matches_id(&self, query: &str) -> bool {
        !query.is_empty() && self.id.starts_with(query)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMetadata {
    pub auto_cleanup_hours: u64,
    pub last_cleanup: Option<DateTime<Utc>>,
}

/// The full persisted state. `agents` is in spawn order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    pub version: String,
    pub description: String,
    pub agents: Vec<AgentRecord>,
    pub metadata: RegistryMetadata,
}

impl Registry {
    pub fn empty(auto_cleanup_hours: u64) -> Self {
        Self {
            version: REGISTRY_VERSION.to_string(),
            description: REGISTRY_DESCRIPTION.to_string(),
            agents: Vec::new(),
            metadata: RegistryMetadata {
                auto_cleanup_hours,
                last_cleanup: None,
            },
        }
    }

    /// Exact id match first, then the first record whose id starts with `query`.
    pub fn find(&self, query: &str) -> Option<&AgentRecord> {
        self.agents
            .iter()
            .find(|a| a.id == query)
            .or_else(|| self.agents.iter().find(|a| a.matches_id(query)))
    }

    pub fn find_mut(&mut self, query: &str) -> Option<&mut AgentRecord> {
        let index = self
            .agents
            .iter()
            .position(|a| a.id == query)
            .or_else(|| self.agents.iter().position(|a| a.matches_id(query)))?;
        self.agents.get_mut(index)
    }
}
