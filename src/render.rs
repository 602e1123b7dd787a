//! Plain-text output for the CLI. `--json` output bypasses this module.

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::orchestration::SpawnedAgent;
use crate::orchestration::agent_log::PruneReport;
use crate::registry::{AgentRecord, AgentStatus, CleanupReport};
use crate::results::CollectedResult;
use crate::summarize::{format_duration, BatchReport};

const RECENT_COMPLETED: usize = 5;
const RECENT_FAILED: usize = 3;

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn params_line(agent: &AgentRecord) -> Option<String> {
    if agent.params.is_empty() {
        return None;
    }
    let joined: Vec<String> = agent.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    Some(joined.join(" "))
}

fn agent_row(agent: &AgentRecord, now: DateTime<Utc>) -> String {
    let elapsed = format_duration(agent.end_time.unwrap_or(now) - agent.start_time);
    let mut row = format!("  {}  {:<20} pid {:<7} {elapsed}", agent.id, agent.recipe, agent.pid);
    if let Some(code) = agent.exit_code {
        let _ = write!(row, "  exit {code}");
    }
    if agent.reconciled {
        row.push_str("  (reconciled)");
    }
    row
}

/// Grouped agent listing: every running agent, the most recent completed
/// and failed ones, then totals.
pub fn agent_list(agents: &[AgentRecord], now: DateTime<Utc>) -> String {
    if agents.is_empty() {
        return "No agents registered.\n".to_string();
    }

    let mut out = String::new();
    let group = |status: AgentStatus| {
        let mut matching: Vec<&AgentRecord> = agents.iter().filter(|a| a.status == status).collect();
        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        matching
    };

    let running = group(AgentStatus::Running);
    let completed = group(AgentStatus::Completed);
    let failed = group(AgentStatus::Failed);

    for (title, list, limit) in [
        ("Running", &running, usize::MAX),
        ("Completed", &completed, RECENT_COMPLETED),
        ("Failed", &failed, RECENT_FAILED),
    ] {
        if list.is_empty() {
            continue;
        }
        let shown = list.len().min(limit);
        if shown < list.len() {
            let _ = writeln!(out, "{title} (last {shown} of {}):", list.len());
        } else {
            let _ = writeln!(out, "{title} ({}):", list.len());
        }
        for agent in list.iter().take(shown) {
            let _ = writeln!(out, "{}", agent_row(agent, now));
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "Total: {} agents ({} running, {} completed, {} failed)",
        agents.len(),
        running.len(),
        completed.len(),
        failed.len()
    );
    out
}

pub fn agent_detail(agent: &AgentRecord, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Agent:    {}", agent.id);
    let _ = writeln!(out, "Recipe:   {}", agent.recipe);
    let _ = writeln!(out, "Status:   {}", agent.status);
    let _ = writeln!(out, "PID:      {}", agent.pid);
    let _ = writeln!(out, "Started:  {}", timestamp(agent.start_time));
    if let Some(end) = agent.end_time {
        let _ = writeln!(out, "Ended:    {}", timestamp(end));
    }
    let _ = writeln!(
        out,
        "Duration: {}",
        format_duration(agent.end_time.unwrap_or(now) - agent.start_time)
    );
    match agent.exit_code {
        Some(code) => {
            let _ = writeln!(out, "Exit:     {code}");
        }
        None if agent.reconciled => {
            let _ = writeln!(out, "Exit:     unknown (process exited unobserved)");
        }
        None => {}
    }
    if let Some(params) = params_line(agent) {
        let _ = writeln!(out, "Params:   {params}");
    }
    let _ = writeln!(out, "Log:      {}", agent.log_file);
    let _ = writeln!(out, "Summary:  {}", if agent.summarized { "yes" } else { "no" });
    if let Some(error) = &agent.error {
        let _ = writeln!(out, "Error:    {error}");
    }
    out
}

pub fn spawned(agent: &SpawnedAgent) -> String {
    let mut out = format!(
        "Spawned {} ({}) pid {}\nLog: {}\n",
        agent.agent_id, agent.recipe, agent.pid, agent.log_file
    );
    if agent.status.is_terminal() {
        let code = agent
            .exit_code
            .map_or_else(|| "unknown".to_string(), |c| c.to_string());
        let _ = writeln!(out, "Finished: {} (exit {code})", agent.status);
    }
    out
}

fn section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {title}:");
    for item in items {
        let _ = writeln!(out, "    - {item}");
    }
}

pub fn results(results: &[CollectedResult]) -> String {
    if results.is_empty() {
        return "No results found.\n".to_string();
    }
    let mut out = String::new();
    for result in results {
        let _ = writeln!(
            out,
            "[{}] {}  {}  {}  started {}",
            result.status,
            result.agent_id,
            result.recipe,
            result.duration,
            timestamp(result.start_time)
        );
        match &result.summary {
            Some(summary) => {
                section(&mut out, "Findings", &summary.key_findings);
                section(&mut out, "Actions", &summary.actions);
                section(&mut out, "Recommendations", &summary.recommendations);
                section(&mut out, "Errors", &summary.errors);
            }
            None => {
                let _ = writeln!(out, "  (not summarized)");
            }
        }
        out.push('\n');
    }
    out
}

pub fn batch(report: &BatchReport) -> String {
    if report.summarized.is_empty() && report.failed.is_empty() {
        return "No agents pending summarization.\n".to_string();
    }
    let mut out = String::new();
    for item in &report.summarized {
        let _ = writeln!(out, "Summarized {}: {} ({:?})", item.agent_id, item.status, item.method);
    }
    for (id, error) in &report.failed {
        let _ = writeln!(out, "Failed {id}: {error}");
    }
    let _ = writeln!(
        out,
        "{} summarized, {} failed",
        report.summarized.len(),
        report.failed.len()
    );
    out
}

pub fn cleanup(report: &CleanupReport) -> String {
    format!(
        "Removed {} agent(s) older than {}h; {} remaining.\n",
        report.removed, report.retention_hours, report.remaining
    )
}

pub fn prune(report: &PruneReport, days: u64) -> String {
    let mut out = String::new();
    let verb = if report.dry_run { "Would delete" } else { "Deleted" };
    for log in &report.deleted {
        let _ = writeln!(out, "{verb} {} (modified {})", log.file, timestamp(log.modified));
    }
    for (file, error) in &report.errors {
        let _ = writeln!(out, "Error on {file}: {error}");
    }
    let _ = writeln!(
        out,
        "{verb} {} log(s) older than {days} day(s); {} kept.",
        report.deleted.len(),
        report.kept
    );
    out
}
