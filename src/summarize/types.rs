//! Summary document and its on-disk store.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SummarizeError;

pub const MAX_FINDINGS: usize = 5;
pub const MAX_ACTIONS: usize = 3;
pub const MAX_RECOMMENDATIONS: usize = 3;
pub const MAX_ERRORS: usize = 5;

/// Overall verdict on an agent's run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SummaryStatus {
    Success,
    Failure,
    Partial,
}

impl SummaryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryStatus::Success => "SUCCESS",
            SummaryStatus::Failure => "FAILURE",
            SummaryStatus::Partial => "PARTIAL",
        }
    }

    /// Lenient parse of a model-supplied status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Some(SummaryStatus::Success),
            "FAILURE" | "FAILED" => Some(SummaryStatus::Failure),
            "PARTIAL" => Some(SummaryStatus::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced a summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMethod {
    Primary,
    Heuristic,
}

/// Structured interpretation of one agent's output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub agent_id: String,
    pub recipe: String,
    pub status: SummaryStatus,
    pub duration: String,
    pub key_findings: Vec<String>,
    pub actions: Vec<String>,
    pub recommendations: Vec<String>,
    pub errors: Vec<String>,
    pub summarized_at: DateTime<Utc>,
    pub method: SummaryMethod,
}

impl Summary {
    /// Enforce the per-list caps.
    pub fn cap_lists(&mut self) {
        self.key_findings.truncate(MAX_FINDINGS);
        self.actions.truncate(MAX_ACTIONS);
        self.recommendations.truncate(MAX_RECOMMENDATIONS);
        self.errors.truncate(MAX_ERRORS);
    }
}

/// `1h 2m 3s`, `2m 3s` or `3s`. Negative spans render as `0s`.
pub fn format_duration(span: chrono::Duration) -> String {
    let total = span.num_seconds().max(0);
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Side table of summaries, one JSON file per agent.
#[derive(Debug, Clone)]
pub struct SummaryStore {
    dir: PathBuf,
}

impl SummaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{agent_id}-summary.json"))
    }

    /// Persist (overwriting) the summary for its agent.
    pub fn save(&self, summary: &Summary) -> Result<PathBuf, SummarizeError> {
        let path = self.path_for(&summary.agent_id);
        let io_err = |source| SummarizeError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let json = serde_json::to_string_pretty(summary)?;

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{}.tmp", std::process::id()));
        let tmp_path = path.with_file_name(tmp_name);

        let mut file = File::create(&tmp_path).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&tmp_path, &path).map_err(io_err)?;
        Ok(path)
    }

    /// Load an agent's summary. Missing or unreadable files yield `None`.
    pub fn load(&self, agent_id: &str) -> Option<Summary> {
        let path = self.path_for(agent_id);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable summary");
                None
            }
        }
    }
}
