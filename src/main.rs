use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use indexmap::IndexMap;
use serde::Serialize;

use agentctl::cli::{Cli, Commands};
use agentctl::config::{self, AppConfig};
use agentctl::orchestration::agent_log::{self, PruneReport};
use agentctl::orchestration::{KillOutcome, RecipeCatalog, SpawnMode, Spawner, StatusTracker};
use agentctl::registry::RegistryStore;
use agentctl::render;
use agentctl::results::{ResultCollector, ResultQuery, DEFAULT_RECENT};
use agentctl::summarize::Summarizer;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(config::load_config(&cli)?);
    tracing::debug!(home = %config.home.display(), agent = %config.agent_command, "Config loaded");

    let registry = RegistryStore::new(config.registry_path(), config.auto_cleanup_hours);

    match cli.command {
        Commands::Spawn {
            recipe,
            params,
            wait,
        } => spawn(&config, registry, &recipe, params.into_iter().collect(), wait).await?,

        Commands::List { json } => {
            let agents = StatusTracker::from_config(&config, registry).list()?;
            if json {
                print_json(&agents)?;
            } else {
                print!("{}", render::agent_list(&agents, Utc::now()));
            }
        }

        Commands::Status { id, json } => {
            let agent = StatusTracker::from_config(&config, registry).get(&id)?;
            if json {
                print_json(&agent)?;
            } else {
                print!("{}", render::agent_detail(&agent, Utc::now()));
            }
        }

        Commands::Wait { id, json } => {
            let outcome = StatusTracker::from_config(&config, registry).wait(&id).await?;
            if json {
                print_json(&outcome.record)?;
            } else {
                if outcome.already_terminal {
                    println!("Agent {} had already finished.", outcome.record.id);
                }
                print!("{}", render::agent_detail(&outcome.record, Utc::now()));
            }
        }

        Commands::Kill { id } => match StatusTracker::from_config(&config, registry).kill(&id)? {
            KillOutcome::Terminated {
                record,
                signal_delivered,
            } => {
                if signal_delivered {
                    println!("Sent SIGTERM to {} (pid {}).", record.id, record.pid);
                } else {
                    println!("Process {} was already gone.", record.pid);
                }
                println!("Agent {} marked {}.", record.id, record.status);
            }
            KillOutcome::NotRunning(record) => {
                println!(
                    "Agent {} is not running (status: {}); nothing to do.",
                    record.id, record.status
                );
            }
        },

        Commands::Cleanup => {
            let report = StatusTracker::from_config(&config, registry).cleanup(Utc::now())?;
            print!("{}", render::cleanup(&report));
        }

        Commands::Summarize { force } => {
            let summarizer = Summarizer::from_config(&config, registry);
            match force {
                Some(id) => {
                    let summary = summarizer.summarize_agent(&id).await?;
                    print_json(&summary)?;
                }
                None => {
                    let report = summarizer.process_pending().await;
                    print!("{}", render::batch(&report));
                }
            }
        }

        Commands::Results {
            id,
            recipe,
            recent,
            all,
            json,
        } => {
            let query = match (id, recipe, recent, all) {
                (Some(id), ..) => ResultQuery::Id(id),
                (None, Some(recipe), ..) => ResultQuery::Recipe(recipe),
                (None, None, _, true) => ResultQuery::All,
                (None, None, recent, false) => ResultQuery::Recent(recent.unwrap_or(DEFAULT_RECENT)),
            };
            let results = ResultCollector::from_config(&config, registry).query(&query);
            if let (ResultQuery::Id(id), true) = (&query, results.is_empty()) {
                anyhow::bail!("Agent not found: {id}");
            }
            if json {
                print_json(&results)?;
            } else {
                print!("{}", render::results(&results));
            }
        }

        Commands::PruneLogs { days, dry_run } => {
            let log_dir = config.log_dir();
            let max_age = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
            let report = if log_dir.is_dir() {
                agent_log::prune_logs(&log_dir, max_age, dry_run)
                    .with_context(|| format!("Failed to prune logs in {}", log_dir.display()))?
            } else {
                PruneReport {
                    dry_run,
                    ..Default::default()
                }
            };
            print!("{}", render::prune(&report, days));
        }

        Commands::Recipes => {
            let catalog = RecipeCatalog::new(&config.recipes_dir, config.recipe_extension.as_str());
            let names = catalog
                .list()
                .with_context(|| format!("Failed to read {}", catalog.dir().display()))?;
            if names.is_empty() {
                println!("No recipes found in {}", catalog.dir().display());
            }
            for name in names {
                println!("{name}");
            }
        }
    }

    Ok(())
}

/// Spawn one agent. In background mode the launch result is printed at once
/// and the process stays resident until the agent's output is drained and
/// its exit recorded.
async fn spawn(
    config: &Arc<AppConfig>,
    registry: RegistryStore,
    recipe: &str,
    params: IndexMap<String, String>,
    wait: bool,
) -> anyhow::Result<()> {
    let summarizer = Arc::new(Summarizer::from_config(config, registry.clone()));
    let spawner = Spawner::new(config.clone(), registry, Some(summarizer));
    let mode = if wait {
        SpawnMode::Wait
    } else {
        SpawnMode::Background
    };

    let spawned = spawner.spawn(recipe, params, mode).await?;
    print_json(&spawned)?;
    std::io::stdout().flush()?;

    if mode == SpawnMode::Background {
        spawner.join_background().await;
    } else {
        eprint!("{}", render::spawned(&spawned));
    }
    Ok(())
}
