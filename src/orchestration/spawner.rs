//! Agent process spawner.
//!
//! Launches the configured agent executable for a recipe as a tokio child
//! with stdin closed and stdout/stderr piped. Both streams are pumped by
//! reader tasks into a channel, and a single writer appends them to the
//! agent's log in arrival order.
//!
//! The spawned process:
//! - Runs in its own process group (`process_group(0)`) so it survives the
//!   orchestrator and is not hit by terminal signals aimed at it
//! - Is registered as `running` before `spawn` returns
//! - Gets exactly one terminal registry update when its exit is observed,
//!   followed by the summarization hook
//!
//! In [`SpawnMode::Background`] the drain runs on a [`TaskTracker`] owned by
//! the spawner; call [`Spawner::join_background`] to wait for it.

use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::agent_log::{self, AgentLog};
use super::recipe::RecipeCatalog;
use crate::config::AppConfig;
use crate::error::SpawnError;
use crate::exec::liveness;
use crate::registry::{AgentId, AgentRecord, AgentStatus, RegistryStore, EXIT_SPAWN_FAILED};
use crate::summarize::Summarizer;

const READ_CHUNK: usize = 8 * 1024;

/// Whether `spawn` returns immediately or after the agent exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    Background,
    Wait,
}

/// What the caller learns about a launched agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedAgent {
    pub agent_id: AgentId,
    pub pid: u32,
    pub recipe: String,
    pub log_file: String,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

enum Chunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// `agent-<unix-millis>-<8 hex>`.
pub fn new_agent_id() -> AgentId {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("agent-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

#[derive(Clone)]
pub struct Spawner {
    config: Arc<AppConfig>,
    registry: RegistryStore,
    catalog: RecipeCatalog,
    summarizer: Option<Arc<Summarizer>>,
    tracker: TaskTracker,
}

impl Spawner {
    pub fn new(
        config: Arc<AppConfig>,
        registry: RegistryStore,
        summarizer: Option<Arc<Summarizer>>,
    ) -> Self {
        let catalog = RecipeCatalog::new(&config.recipes_dir, config.recipe_extension.as_str());
        Self {
            config,
            registry,
            catalog,
            summarizer,
            tracker: TaskTracker::new(),
        }
    }

    pub fn catalog(&self) -> &RecipeCatalog {
        &self.catalog
    }

    /// Launch one agent for `recipe` with `params`.
    ///
    /// A missing recipe fails before any process or record exists. An
    /// executable that cannot be started still leaves a `failed` record
    /// behind so the attempt is visible in listings.
    pub async fn spawn(
        &self,
        recipe: &str,
        params: IndexMap<String, String>,
        mode: SpawnMode,
    ) -> Result<SpawnedAgent, SpawnError> {
        let recipe_path = self.catalog.resolve(recipe)?;
        let recipe_name = self.catalog.recipe_name(recipe).to_string();

        let agent_id = new_agent_id();
        let started = Utc::now();
        let log_dir = self.config.log_dir();
        let log_name = agent_log::log_file_name(&recipe_name, &agent_id, started);

        let log_err = |source| SpawnError::LogSetup {
            path: log_dir.join(&log_name),
            source,
        };
        let mut log = AgentLog::create(&log_dir, &log_name).await.map_err(log_err)?;
        log.write_header(&agent_id, &recipe_path.display().to_string(), started, &params)
            .await
            .map_err(log_err)?;

        let mut command = Command::new(&self.config.agent_command);
        command
            .args(&self.config.agent_args)
            .arg(&recipe_path)
            .envs(self.config.agent_env())
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &params {
            command.arg(&self.config.param_flag).arg(format!("{key}={value}"));
        }

        let mut record = AgentRecord::running(
            agent_id.clone(),
            recipe_name.clone(),
            0,
            log_name.clone(),
            params,
        );
        record.start_time = started;

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = e.to_string();
                tracing::error!(agent_id = %agent_id, command = %self.config.agent_command, error = %message, "Failed to spawn agent");

                record.finish(AgentStatus::Failed, Some(EXIT_SPAWN_FAILED), Utc::now());
                record.error = Some(format!("spawn failed: {message}"));
                self.registry.register(record)?;

                let note = format!("[Agent] Spawn failed: {message}\n");
                let noted = match log.append(note.as_bytes()).await {
                    Ok(()) => log.finish(EXIT_SPAWN_FAILED, Utc::now()).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = noted {
                    tracing::warn!(agent_id = %agent_id, error = %e, "Failed to note spawn failure in agent log");
                }

                return Err(SpawnError::SpawnFailed {
                    command: self.config.agent_command.clone(),
                    message,
                });
            }
        };

        let pid = child.id().unwrap_or_default();
        record.pid = pid;
        if let Err(e) = self.registry.register(record) {
            // Without a record nothing could ever observe or stop the child.
            if let Err(kill_err) = child.start_kill() {
                tracing::warn!(agent_id = %agent_id, pid, error = %kill_err, "Failed to kill unregistered agent");
            }
            return Err(e.into());
        }

        tracing::info!(agent_id = %agent_id, recipe = %recipe_name, pid, log = %log_name, "Agent spawned");

        let mut spawned = SpawnedAgent {
            agent_id: agent_id.clone(),
            pid,
            recipe: recipe_name,
            log_file: log_name,
            status: AgentStatus::Running,
            exit_code: None,
        };

        match mode {
            SpawnMode::Background => {
                let this = self.clone();
                self.tracker.spawn(async move {
                    this.supervise(agent_id, child, log, false).await;
                });
            }
            SpawnMode::Wait => {
                let finished = self.supervise(agent_id, child, log, true).await;
                if let Some(record) = finished {
                    spawned.status = record.status;
                    spawned.exit_code = record.exit_code;
                }
            }
        }

        Ok(spawned)
    }

    /// Wait for every background drain started by this spawner.
    pub async fn join_background(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Number of drains still running.
    pub fn background_len(&self) -> usize {
        self.tracker.len()
    }

    /// Drain, record the exit, then run the summarization hook. Errors are
    /// logged and never propagated. Returns the record as finally persisted.
    async fn supervise(
        &self,
        agent_id: AgentId,
        child: Child,
        log: AgentLog,
        foreground: bool,
    ) -> Option<AgentRecord> {
        let exit_code = drain(child, log, foreground).await;
        let status = AgentStatus::from_exit_code(exit_code);

        match self.registry.update_status(&agent_id, status, Some(exit_code)) {
            Ok(true) => {
                tracing::info!(agent_id = %agent_id, exit_code, status = %status, "Agent finished");
            }
            Ok(false) => {
                tracing::debug!(agent_id = %agent_id, exit_code, "Agent already terminal, keeping recorded state");
            }
            Err(e) => {
                tracing::error!(agent_id = %agent_id, error = %e, "Failed to record agent exit");
            }
        }

        if let Some(summarizer) = &self.summarizer {
            if let Err(e) = summarizer.summarize_agent(&agent_id).await {
                tracing::warn!(agent_id = %agent_id, error = %e, "Summarization hook failed");
            }
        }

        self.registry.find_agent(&agent_id)
    }
}

/// Pump both streams into the log until they close, then reap the child and
/// write the footer. Returns the exit code to record.
///
/// In the foreground output is echoed live. The first Ctrl-C is forwarded to
/// the child as SIGTERM and a second one escalates to SIGKILL; draining
/// continues until the child exits.
async fn drain(mut child: Child, mut log: AgentLog, foreground: bool) -> i32 {
    let pid = child.id().unwrap_or_default();
    let (tx, mut rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, tx.clone(), Chunk::Stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, tx.clone(), Chunk::Stderr));
    }
    drop(tx);

    let mut interrupts = 0u8;
    let mut log_ok = true;
    loop {
        tokio::select! {
            chunk = rx.recv() => {
                let Some(chunk) = chunk else { break };
                let bytes = match &chunk {
                    Chunk::Stdout(b) | Chunk::Stderr(b) => b,
                };
                if log_ok {
                    if let Err(e) = log.append(bytes).await {
                        tracing::error!(pid, error = %e, "Failed to write agent log");
                        log_ok = false;
                    }
                }
                if foreground {
                    echo(&chunk).await;
                }
            }
            _ = tokio::signal::ctrl_c(), if foreground && interrupts < 2 => {
                interrupts += 1;
                forward_interrupt(&mut child, interrupts);
            }
        }
    }

    let exit_code = match child.wait().await {
        Ok(status) => exit_code_of(status),
        Err(e) => {
            tracing::error!(pid, error = %e, "Failed to wait for agent process");
            1
        }
    };

    if let Err(e) = log.finish(exit_code, Utc::now()).await {
        tracing::error!(pid, error = %e, "Failed to finalize agent log");
    }
    exit_code
}

/// Pass the `nth` Ctrl-C on to the child: SIGTERM first, SIGKILL after.
fn forward_interrupt(child: &mut Child, nth: u8) {
    let pid = child.id().unwrap_or_default();
    if nth <= 1 {
        tracing::info!(pid, "Interrupt received, forwarding SIGTERM to agent");
        if let Err(e) = liveness::terminate(pid) {
            tracing::warn!(pid, error = %e, "Failed to forward SIGTERM");
        }
    } else {
        tracing::warn!(pid, "Second interrupt, killing agent");
        if let Err(e) = child.start_kill() {
            tracing::warn!(pid, error = %e, "Failed to kill agent");
        }
    }
}

async fn pump<R>(mut reader: R, tx: UnboundedSender<Chunk>, wrap: fn(Vec<u8>) -> Chunk)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
        }
    }
}

async fn echo(chunk: &Chunk) {
    let result = match chunk {
        Chunk::Stdout(bytes) => {
            let mut out = tokio::io::stdout();
            match out.write_all(bytes).await {
                Ok(()) => out.flush().await,
                Err(e) => Err(e),
            }
        }
        Chunk::Stderr(bytes) => tokio::io::stderr().write_all(bytes).await,
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "Failed to echo agent output");
    }
}

/// The process exit code, or `-N` when killed by signal N.
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(1)
}
