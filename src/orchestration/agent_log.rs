//! Append-only per-agent output log.
//!
//! Each spawned agent gets one text file named `{ISO8601}-{recipe}-{tag}.log`
//! in the log directory, where `tag` is the random suffix of the agent id. The file starts with a short `[Agent]` header, then holds
//! the child's combined stdout/stderr as it arrives, and ends with a footer
//! recording the exit code once the drain task observes the exit.
//!
//! The footer lets reconciliation recover an exit code even when the
//! registry update that should have followed it never happened.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

const HEADER_PREFIX: &str = "[Agent]";
const FOOTER_MARKER: &str = "[Agent] Ended:";
const EXIT_CODE_MARKER: &str = "[Agent] Exit code:";

fn separator() -> String {
    "=".repeat(60)
}

/// Log file name for agent `agent_id` of `recipe` started at `at`, with
/// colons and dots replaced for filesystem safety. The id's random suffix
/// keeps agents started in the same millisecond apart.
pub fn log_file_name(recipe: &str, agent_id: &str, at: DateTime<Utc>) -> String {
    let tag = agent_id.rsplit('-').next().unwrap_or(agent_id);
    format!("{}-{recipe}-{tag}.log", at.format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

/// Writer for one agent's log. Owned by that agent's drain task.
pub struct AgentLog {
    file: File,
    path: PathBuf,
}

impl AgentLog {
    /// Create `dir` if needed and open a new `dir/name` for appending. An
    /// existing file is never shared.
    pub async fn create(dir: &Path, name: &str) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(name);
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { file, path })
    }

    /// Write the header block. Must precede any child output.
    pub async fn write_header(
        &mut self,
        agent_id: &str,
        recipe_file: &str,
        started: DateTime<Utc>,
        params: &IndexMap<String, String>,
    ) -> std::io::Result<()> {
        let params_json = serde_json::to_string(params).unwrap_or_else(|_| "{}".to_string());
        let header = format!(
            "{HEADER_PREFIX} ID: {agent_id}\n\
             {HEADER_PREFIX} Recipe: {recipe_file}\n\
             {HEADER_PREFIX} Started: {}\n\
             {HEADER_PREFIX} Params: {params_json}\n\
             {}\n\n",
            started.to_rfc3339_opts(SecondsFormat::Millis, true),
            separator(),
        );
        self.file.write_all(header.as_bytes()).await?;
        self.file.flush().await
    }

    /// Append a chunk of child output verbatim.
    pub async fn append(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await
    }

    /// Record the exit and flush everything to disk.
    pub async fn finish(mut self, exit_code: i32, ended: DateTime<Utc>) -> std::io::Result<()> {
        let footer = format!(
            "\n{FOOTER_MARKER} {}\n{EXIT_CODE_MARKER} {exit_code}\n",
            ended.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        self.file.write_all(footer.as_bytes()).await?;
        self.file.flush().await?;
        self.file.sync_all().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The child's own output: everything between the header separator and the
/// footer. Content without a header is returned whole.
pub fn body(content: &str) -> &str {
    let sep = separator();
    let start = content
        .find(&sep)
        .filter(|_| content.starts_with(HEADER_PREFIX))
        .map(|i| i + sep.len())
        .unwrap_or(0);
    let rest = &content[start..];
    let end = rest.rfind(FOOTER_MARKER).unwrap_or(rest.len());
    rest[..end].trim_matches('\n')
}

/// Exit code from the footer, if the drain task got as far as writing it.
pub fn recover_exit_code(content: &str) -> Option<i32> {
    content
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(EXIT_CODE_MARKER))
        .and_then(|code| code.trim().parse().ok())
}

/// Read a log and recover its exit code; unreadable logs yield `None`.
pub fn recover_exit_code_from(path: &Path) -> Option<i32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| recover_exit_code(&content))
}

#[derive(Debug, Clone, Serialize)]
pub struct PrunedLog {
    pub file: String,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub deleted: Vec<PrunedLog>,
    pub kept: usize,
    pub skipped: usize,
    pub errors: Vec<(String, String)>,
    pub dry_run: bool,
}

/// Delete `*.log` files in `dir` last modified more than `max_age` ago.
///
/// Non-log entries are skipped. Per-file failures are collected in the
/// report; only an unreadable directory is an error.
pub fn prune_logs(dir: &Path, max_age: Duration, dry_run: bool) -> std::io::Result<PruneReport> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut report = PruneReport {
        dry_run,
        ..Default::default()
    };

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.errors.push((dir.display().to_string(), e.to_string()));
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".log") {
            report.skipped += 1;
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                report.errors.push((name, e.to_string()));
                continue;
            }
        };

        if modified >= cutoff {
            report.kept += 1;
            continue;
        }

        if !dry_run {
            if let Err(e) = fs::remove_file(entry.path()) {
                report.errors.push((name, e.to_string()));
                continue;
            }
        }
        tracing::debug!(file = %name, dry_run, "Pruned agent log");
        report.deleted.push(PrunedLog {
            file: name,
            modified: DateTime::<Utc>::from(modified),
        });
    }

    report.deleted.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(report)
}
