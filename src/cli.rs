use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "agentctl", version, about = "Spawn, track and summarize background agent jobs")]
pub struct Cli {
    /// State directory (registry, logs, summaries)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Path to config file (overrides <home>/agentctl.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Spawn an agent for a recipe (returns immediately unless --wait)
    Spawn {
        /// Recipe name, with or without extension
        recipe: String,

        /// Recipe parameter as key=value (repeatable)
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Block until the agent exits, echoing its output
        #[arg(short, long)]
        wait: bool,
    },
    /// List all agents, reconciling dead processes
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one agent by id or id prefix
    Status {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Block until an agent's process exits
    Wait {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Terminate a running agent
    Kill { id: String },
    /// Remove agents older than the retention window
    Cleanup,
    /// Summarize completed agents that have no summary yet
    Summarize {
        /// Re-summarize one agent even if it already has a summary
        #[arg(short, long, value_name = "ID")]
        force: Option<String>,
    },
    /// Show summarized results
    Results {
        /// Results for one agent
        #[arg(short, long, conflicts_with_all = ["recipe", "recent", "all"])]
        id: Option<String>,

        /// Results for agents whose recipe matches
        #[arg(short, long, conflicts_with_all = ["recent", "all"])]
        recipe: Option<String>,

        /// Most recent N results (default 5)
        #[arg(short = 'n', long, num_args = 0..=1, default_missing_value = "5")]
        recent: Option<usize>,

        /// All results
        #[arg(short, long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },
    /// Delete agent log files older than N days
    PruneLogs {
        #[arg(short, long, default_value_t = 7)]
        days: u64,

        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// List available recipes
    Recipes,
}

/// Parse a `key=value` parameter. The value may itself contain `=`.
fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}
