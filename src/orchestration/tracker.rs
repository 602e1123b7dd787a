//! Status queries and control over registered agents.
//!
//! [`StatusTracker`] is the read/control side of the registry. Every query
//! first reconciles: a record still marked `running` whose process no longer
//! exists is moved to a terminal state, using the exit code from the log
//! footer when the drain task got far enough to write one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::agent_log;
use crate::config::AppConfig;
use crate::error::TrackerError;
use crate::exec::{ProcessProbe, SystemProbe, TerminateOutcome};
use crate::registry::{AgentRecord, AgentStatus, CleanupReport, RegistryStore, EXIT_TERMINATED};

/// Result of [`StatusTracker::wait`].
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    pub record: AgentRecord,
    /// The agent was already terminal when the wait began.
    pub already_terminal: bool,
}

/// Result of [`StatusTracker::kill`].
#[derive(Debug, Clone)]
pub enum KillOutcome {
    /// SIGTERM was sent (or the process was already gone) and the record
    /// was marked failed.
    Terminated {
        record: AgentRecord,
        signal_delivered: bool,
    },
    /// The agent was not running; nothing was done.
    NotRunning(AgentRecord),
}

#[derive(Clone)]
pub struct StatusTracker {
    registry: RegistryStore,
    probe: Arc<dyn ProcessProbe>,
    log_dir: PathBuf,
    poll_interval: Duration,
}

impl StatusTracker {
    pub fn new(
        registry: RegistryStore,
        probe: Arc<dyn ProcessProbe>,
        log_dir: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            probe,
            log_dir,
            poll_interval,
        }
    }

    pub fn from_config(config: &AppConfig, registry: RegistryStore) -> Self {
        Self::new(
            registry,
            Arc::new(SystemProbe),
            config.log_dir(),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// All records in spawn order, after reconciling dead `running` ones.
    pub fn list(&self) -> Result<Vec<AgentRecord>, TrackerError> {
        let agents = self.registry.update(|registry| {
            for agent in registry.agents.iter_mut() {
                self.reconcile(agent);
            }
            registry.agents.clone()
        })?;
        Ok(agents)
    }

    /// One record by exact id or prefix, reconciled in place.
    pub fn get(&self, query: &str) -> Result<AgentRecord, TrackerError> {
        self.registry
            .update(|registry| {
                registry.find_mut(query).map(|agent| {
                    self.reconcile(agent);
                    agent.clone()
                })
            })?
            .ok_or_else(|| TrackerError::NotFound {
                id: query.to_string(),
            })
    }

    /// Block until the agent is terminal, polling liveness. No timeout.
    pub async fn wait(&self, query: &str) -> Result<WaitOutcome, TrackerError> {
        let record = self.get(query)?;
        if record.status.is_terminal() {
            return Ok(WaitOutcome {
                record,
                already_terminal: true,
            });
        }

        let id = record.id.clone();
        tracing::debug!(agent_id = %id, pid = record.pid, "Waiting for agent");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            // Reconciles as a side effect once the process is gone; also
            // picks up a terminal update written by the drain task or `kill`.
            let current = self.get(&id)?;
            if current.status.is_terminal() {
                return Ok(WaitOutcome {
                    record: current,
                    already_terminal: false,
                });
            }
        }
    }

    /// Send SIGTERM and mark the agent failed with exit code -15.
    ///
    /// The record is updated even if the process had already exited; a
    /// terminal state written first by the drain task is kept.
    pub fn kill(&self, query: &str) -> Result<KillOutcome, TrackerError> {
        let record = self
            .registry
            .find_agent(query)
            .ok_or_else(|| TrackerError::NotFound {
                id: query.to_string(),
            })?;

        if record.status != AgentStatus::Running {
            return Ok(KillOutcome::NotRunning(record));
        }

        let signal_delivered = match self.probe.terminate(record.pid) {
            Ok(TerminateOutcome::Signalled) => true,
            Ok(TerminateOutcome::AlreadyGone) => {
                tracing::info!(agent_id = %record.id, pid = record.pid, "Agent process already gone");
                false
            }
            Err(e) => {
                tracing::warn!(agent_id = %record.id, pid = record.pid, error = %e, "Failed to signal agent");
                false
            }
        };

        self.registry
            .update_status(&record.id, AgentStatus::Failed, Some(EXIT_TERMINATED))?;
        tracing::info!(agent_id = %record.id, pid = record.pid, signal_delivered, "Agent killed");

        let record = self.registry.find_agent(&record.id).unwrap_or(record);
        Ok(KillOutcome::Terminated {
            record,
            signal_delivered,
        })
    }

    /// Drop records past the retention window regardless of status.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport, TrackerError> {
        let report = self.registry.cleanup(now)?;
        tracing::info!(removed = report.removed, remaining = report.remaining, "Registry cleanup");
        Ok(report)
    }

    /// Move a dead `running` record to a terminal state. Returns whether the
    /// record changed.
    fn reconcile(&self, agent: &mut AgentRecord) -> bool {
        if agent.status != AgentStatus::Running || self.probe.is_alive(agent.pid) {
            return false;
        }

        let recovered = agent_log::recover_exit_code_from(&self.log_dir.join(&agent.log_file));
        let status = recovered
            .map(AgentStatus::from_exit_code)
            .unwrap_or(AgentStatus::Completed);
        let changed = agent.finish(status, recovered, Utc::now());
        if changed {
            agent.reconciled = true;
            tracing::info!(
                agent_id = %agent.id,
                pid = agent.pid,
                status = %status,
                exit_code = ?recovered,
                "Reconciled agent whose process is gone"
            );
        }
        changed
    }
}
