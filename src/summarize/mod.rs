//! Post-hoc summarization of agent logs.
//!
//! [`Summarizer`] turns a terminal agent's log into a [`Summary`]: first by
//! asking the inference service for a JSON verdict, and if that fails for
//! any reason, by the keyword heuristic in [`heuristic`]. A nonzero exit code
//! always wins over whatever either path concluded.

pub mod heuristic;
pub mod inference;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

pub use heuristic::{HeuristicSummarizer, HeuristicSummary};
pub use inference::{
    DisabledInference, GenaiInference, InferenceClient, InferenceOutcome, InferenceRequest,
};
pub use types::{format_duration, Summary, SummaryMethod, SummaryStatus, SummaryStore};

use crate::config::AppConfig;
use crate::error::SummarizeError;
use crate::orchestration::agent_log;
use crate::registry::{AgentRecord, RegistryStore};

pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

const SYSTEM_PROMPT: &str = "You analyze the output of autonomous agent runs. \
Respond with ONLY a single JSON object and no other text.";

/// Keep the first `max_chars` characters of `log`, marking the cut.
pub fn truncate_log(log: &str, max_chars: usize) -> String {
    match log.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &log[..cut]),
        None => log.to_string(),
    }
}

fn user_prompt(recipe: &str, log: &str) -> String {
    format!(
        "Summarize this run of the \"{recipe}\" agent.\n\n\
         Return JSON with exactly these fields:\n\
         {{\"status\": \"SUCCESS\" | \"FAILURE\" | \"PARTIAL\", \
         \"keyFindings\": [string, at most 5], \"actions\": [string, at most 3], \
         \"recommendations\": [string, at most 3], \"errors\": [string, at most 5]}}\n\n\
         Agent output:\n{log}"
    )
}

/// Lists and status from a primary response, or `None` if it lacks a usable
/// status.
fn from_primary(value: &Value) -> Option<HeuristicSummary> {
    let status = value.get("status")?.as_str().and_then(SummaryStatus::parse)?;
    let list = |camel: &str, snake: &str| -> Vec<String> {
        value
            .get(camel)
            .or_else(|| value.get(snake))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };
    Some(HeuristicSummary {
        status,
        key_findings: list("keyFindings", "key_findings"),
        actions: list("actions", "actions"),
        recommendations: list("recommendations", "recommendations"),
        errors: list("errors", "errors"),
    })
}

/// One agent handled by [`Summarizer::process_pending`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub agent_id: String,
    pub status: SummaryStatus,
    pub method: SummaryMethod,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub summarized: Vec<BatchItem>,
    /// `(agent id, error)` for every agent that could not be summarized.
    pub failed: Vec<(String, String)>,
}

pub struct Summarizer {
    registry: RegistryStore,
    summaries: SummaryStore,
    log_dir: PathBuf,
    client: Arc<dyn InferenceClient>,
    heuristic: HeuristicSummarizer,
    max_log_chars: usize,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(
        registry: RegistryStore,
        summaries: SummaryStore,
        log_dir: PathBuf,
        client: Arc<dyn InferenceClient>,
        max_log_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            summaries,
            log_dir,
            client,
            heuristic: HeuristicSummarizer::new(),
            max_log_chars,
            timeout,
        }
    }

    /// Summarizer wired to the configured inference backend.
    pub fn from_config(config: &AppConfig, registry: RegistryStore) -> Self {
        let client: Arc<dyn InferenceClient> = if config.summarizer_enabled {
            Arc::new(GenaiInference::new(
                config.summarizer_model.clone(),
                config.inference_health_url.clone(),
            ))
        } else {
            Arc::new(DisabledInference)
        };
        Self::new(
            registry,
            SummaryStore::new(config.summaries_dir()),
            config.log_dir(),
            client,
            config.max_log_chars,
            Duration::from_secs(config.summarizer_timeout_secs),
        )
    }

    /// Build a summary for `agent` without persisting it.
    pub async fn summarize(&self, agent: &AgentRecord) -> Result<Summary, SummarizeError> {
        let path = self.log_dir.join(&agent.log_file);
        if !path.is_file() {
            return Err(SummarizeError::LogMissing { path });
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SummarizeError::Io {
                path: path.clone(),
                source,
            })?;
        let body = agent_log::body(&content);

        let request = InferenceRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: user_prompt(&agent.recipe, &truncate_log(body, self.max_log_chars)),
            timeout: self.timeout,
        };

        let primary = match self.client.complete_json(&request).await {
            InferenceOutcome::Parsed(value) => {
                let parsed = from_primary(&value);
                if parsed.is_none() {
                    tracing::info!(agent_id = %agent.id, "Inference response lacks a status, using heuristic");
                }
                parsed
            }
            InferenceOutcome::Unavailable(reason) => {
                tracing::warn!(agent_id = %agent.id, %reason, "Inference unavailable, using heuristic");
                None
            }
            InferenceOutcome::Malformed(reason) => {
                tracing::info!(agent_id = %agent.id, %reason, "Inference response malformed, using heuristic");
                None
            }
        };

        let (extracted, method) = match primary {
            Some(extracted) => (extracted, SummaryMethod::Primary),
            None => (self.heuristic.summarize(body), SummaryMethod::Heuristic),
        };

        let end = agent.end_time.unwrap_or_else(Utc::now);
        let mut summary = Summary {
            agent_id: agent.id.clone(),
            recipe: agent.recipe.clone(),
            status: extracted.status,
            duration: format_duration(end - agent.start_time),
            key_findings: extracted.key_findings,
            actions: extracted.actions,
            recommendations: extracted.recommendations,
            errors: extracted.errors,
            summarized_at: Utc::now(),
            method,
        };
        summary.cap_lists();

        if agent.exit_code.is_some_and(|code| code != 0) {
            summary.status = SummaryStatus::Failure;
        }
        Ok(summary)
    }

    /// Summarize one agent (exact id or prefix), persist the summary and mark
    /// the record. Re-summarizing overwrites the previous summary.
    pub async fn summarize_agent(&self, query: &str) -> Result<Summary, SummarizeError> {
        let agent = self
            .registry
            .find_agent(query)
            .ok_or_else(|| SummarizeError::AgentNotFound {
                id: query.to_string(),
            })?;

        let summary = self.summarize(&agent).await?;
        let path = self.summaries.save(&summary)?;

        self.registry.update(|registry| {
            if let Some(record) = registry.agents.iter_mut().find(|a| a.id == agent.id) {
                record.summarized = true;
            }
        })?;

        tracing::info!(
            agent_id = %agent.id,
            status = %summary.status,
            method = ?summary.method,
            path = %path.display(),
            "Agent summarized"
        );
        Ok(summary)
    }

    /// Summarize every terminal, unsummarized agent in registry order.
    /// Individual failures are reported and never stop the batch.
    pub async fn process_pending(&self) -> BatchReport {
        let pending: Vec<String> = self
            .registry
            .load()
            .agents
            .into_iter()
            .filter(|a| a.status.is_terminal() && !a.summarized)
            .map(|a| a.id)
            .collect();

        let mut report = BatchReport::default();
        for id in pending {
            match self.summarize_agent(&id).await {
                Ok(summary) => report.summarized.push(BatchItem {
                    agent_id: id,
                    status: summary.status,
                    method: summary.method,
                }),
                Err(e) => {
                    tracing::warn!(agent_id = %id, error = %e, "Failed to summarize agent");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        report
    }
}
