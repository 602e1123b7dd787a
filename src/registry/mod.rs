//! Persisted agent registry.
//!
//! [`RegistryStore`] is the single source of truth for agent liveness and exit
//! state across independent `agentctl` invocations. The whole document is
//! loaded, mutated and saved per operation.
//!
//! **Concurrency model:** every read-modify-write runs under an exclusive
//! advisory lock on a sidecar `<registry>.lock` file, so two processes
//! updating the registry at once serialize instead of losing updates. Saves
//! go through a temp file and `rename`, so readers never see a partial write.
//!
//! **Corruption:** a missing or unparsable registry loads as an empty one.

pub mod types;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;

pub use types::{
    AgentId, AgentRecord, AgentStatus, Registry, RegistryMetadata, EXIT_SPAWN_FAILED,
    EXIT_TERMINATED,
};

use crate::error::RegistryError;

/// Retention windows are clamped to a century to keep the cutoff representable.
const MAX_RETENTION_HOURS: u64 = 24 * 365 * 100;

/// Outcome of a retention cleanup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub remaining: usize,
    pub retention_hours: u64,
}

/// File-backed registry handle. Cheap to clone; holds only paths.
#[derive(Clone, Debug)]
pub struct RegistryStore {
    path: PathBuf,
    lock_path: PathBuf,
    auto_cleanup_hours: u64,
}

impl RegistryStore {
    /// Create a store for the registry document at `path`.
    ///
    /// `auto_cleanup_hours` is only used when a fresh registry is created.
    pub fn new(path: impl Into<PathBuf>, auto_cleanup_hours: u64) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            auto_cleanup_hours,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the registry. Never fails: a missing or corrupt document yields
    /// an empty registry.
    pub fn load(&self) -> Registry {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<Registry>(&contents) {
                Ok(registry) => registry,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Registry is corrupt, treating as empty"
                    );
                    Registry::empty(self.auto_cleanup_hours)
                }
            },
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to read registry, treating as empty"
                    );
                }
                Registry::empty(self.auto_cleanup_hours)
            }
        }
    }

    /// Overwrite the registry document (temp file + rename).
    pub fn save(&self, registry: &Registry) -> Result<(), RegistryError> {
        let io_err = |source| RegistryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(registry)?;
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{}.tmp", std::process::id()));
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file = File::create(&tmp_path).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// Run `f` against the current registry under the exclusive lock and
    /// persist the result if `f` changed anything.
    pub fn update<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> Result<T, RegistryError> {
        let _lock = self.lock()?;
        let original = self.load();
        let mut registry = original.clone();
        let out = f(&mut registry);
        if registry != original {
            self.save(&registry)?;
        }
        Ok(out)
    }

    /// Append a new agent record.
    pub fn register(&self, agent: AgentRecord) -> Result<(), RegistryError> {
        tracing::debug!(agent_id = %agent.id, recipe = %agent.recipe, pid = agent.pid, "Registering agent");
        self.update(|registry| {
            if registry.agents.iter().any(|a| a.id == agent.id) {
                tracing::warn!(agent_id = %agent.id, "Agent id already registered, keeping existing record");
                return;
            }
            registry.agents.push(agent);
        })
    }

    /// Apply a terminal transition to the agent with exactly this id.
    ///
    /// Returns `Ok(false)` if the agent is unknown or already terminal; a
    /// terminal record is never overwritten.
    pub fn update_status(
        &self,
        id: &str,
        status: AgentStatus,
        exit_code: Option<i32>,
    ) -> Result<bool, RegistryError> {
        self.update(|registry| {
            match registry.agents.iter_mut().find(|a| a.id == id) {
                Some(agent) => {
                    let applied = agent.finish(status, exit_code, Utc::now())
                        || agent.correct_reconciled(status, exit_code);
                    if !applied {
                        tracing::debug!(
                            agent_id = %id,
                            current = %agent.status,
                            requested = %status,
                            "Agent already terminal, status update skipped"
                        );
                    }
                    applied
                }
                None => {
                    tracing::warn!(agent_id = %id, "Status update for unknown agent");
                    false
                }
            }
        })
    }

    /// Find an agent by exact id or id prefix.
    pub fn find_agent(&self, query: &str) -> Option<AgentRecord> {
        self.load().find(query).cloned()
    }

    /// Drop every record that started before `now - autoCleanupHours`,
    /// regardless of status, and stamp `lastCleanup`.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport, RegistryError> {
        self.update(|registry| {
            let hours = registry.metadata.auto_cleanup_hours;
            let cutoff = now - Duration::hours(hours.min(MAX_RETENTION_HOURS) as i64);
            let before = registry.agents.len();
            registry.agents.retain(|a| a.start_time > cutoff);
            registry.metadata.last_cleanup = Some(now);

            CleanupReport {
                removed: before - registry.agents.len(),
                remaining: registry.agents.len(),
                retention_hours: hours,
            }
        })
    }

    /// Acquire the exclusive registry lock; released when the file drops.
    fn lock(&self) -> Result<File, RegistryError> {
        let lock_err = |source| RegistryError::Lock {
            path: self.lock_path.clone(),
            source,
        };
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn store() -> (RegistryStore, TempDir) {
        let tmp = TempDir::new().expect("tempdir");
        let store = RegistryStore::new(tmp.path().join("agent-registry.json"), 24);
        (store, tmp)
    }

    fn record(id: &str) -> AgentRecord {
        AgentRecord::running(id.into(), "demo".into(), 4242, format!("{id}.log"), IndexMap::new())
    }

    #[test]
    fn missing_registry_loads_empty() {
        let (store, _tmp) = store();
        let registry = store.load();
        assert!(registry.agents.is_empty());
        assert_eq!(registry.metadata.auto_cleanup_hours, 24);
        assert!(registry.metadata.last_cleanup.is_none());
    }

    #[test]
    fn corrupt_registry_loads_empty() {
        let (store, _tmp) = store();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().agents.is_empty());
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let (store, tmp) = store();
        store.register(record("agent-1")).unwrap();

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
        assert!(names.contains(&"agent-registry.json".to_string()));
    }

    #[test]
    fn register_then_find_by_prefix() {
        let (store, _tmp) = store();
        store.register(record("agent-1700000000000-aaaa")).unwrap();
        store.register(record("agent-1700000000001-bbbb")).unwrap();

        let found = store.find_agent("agent-1700000000001").unwrap();
        assert_eq!(found.id, "agent-1700000000001-bbbb");
        assert!(store.find_agent("agent-9").is_none());
    }

    #[test]
    fn duplicate_register_keeps_one_record() {
        let (store, _tmp) = store();
        store.register(record("agent-1")).unwrap();
        store.register(record("agent-1")).unwrap();
        assert_eq!(store.load().agents.len(), 1);
    }

    #[test]
    fn update_status_is_single_terminal_write() {
        let (store, _tmp) = store();
        store.register(record("agent-1")).unwrap();

        assert!(store.update_status("agent-1", AgentStatus::Failed, Some(EXIT_TERMINATED)).unwrap());
        assert!(!store.update_status("agent-1", AgentStatus::Completed, Some(0)).unwrap());

        let agent = store.find_agent("agent-1").unwrap();
        assert_eq!(agent.status, AgentStatus::Failed);
        assert_eq!(agent.exit_code, Some(EXIT_TERMINATED));
        assert!(agent.end_time.is_some());
    }

    #[test]
    fn update_status_unknown_agent_is_noop() {
        let (store, _tmp) = store();
        assert!(!store.update_status("ghost", AgentStatus::Completed, Some(0)).unwrap());
        assert!(!store.path().exists());
    }

    #[test]
    fn cleanup_drops_only_expired_records() {
        let (store, _tmp) = store();
        let now = Utc::now();

        let mut old = record("agent-old");
        old.start_time = now - Duration::hours(25);
        old.finish(AgentStatus::Completed, Some(0), now - Duration::hours(24));
        let mut old_running = record("agent-old-running");
        old_running.start_time = now - Duration::hours(48);
        let fresh = record("agent-fresh");

        store.register(old).unwrap();
        store.register(old_running).unwrap();
        store.register(fresh).unwrap();

        let report = store.cleanup(now).unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.remaining, 1);
        assert_eq!(report.retention_hours, 24);

        let registry = store.load();
        assert_eq!(registry.agents.len(), 1);
        assert_eq!(registry.agents[0].id, "agent-fresh");
        assert_eq!(registry.metadata.last_cleanup, Some(now));
    }

    #[test]
    fn concurrent_updates_do_not_lose_records() {
        let (store, _tmp) = store();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.register(record(&format!("agent-{i}"))).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.load().agents.len(), 8);
    }
}
