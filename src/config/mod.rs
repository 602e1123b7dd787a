pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::Cli;
use crate::error::ConfigError;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Load configuration by merging global, home, and CLI sources.
/// Precedence: CLI > explicit `--config` file or `<home>/agentctl.toml` > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply), except an
/// explicit `--config` path, which must exist and parse.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/agentctl/agentctl.toml or platform equivalent)
    let global = load_global_config();

    // Determine home from CLI or global config, for loading the home config.
    let home = cli
        .home
        .clone()
        .or_else(|| global.home.clone())
        .unwrap_or_else(default_home);

    // Layer 2: Explicit config file, or home config (home/agentctl.toml)
    let local = match &cli.config {
        Some(path) => load_explicit_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => load_toml_file(&home.join("agentctl.toml")).unwrap_or_default(),
    };

    // Layer 3: CLI args
    let cli_partial = PartialConfig {
        home: cli.home.clone(),
        ..Default::default()
    };

    // Merge: CLI > local > global > defaults. Home is pinned to the value
    // used to locate the local layer unless the local layer moves it.
    let config = cli_partial
        .with_fallback(local)
        .with_fallback(PartialConfig {
            home: Some(home),
            ..Default::default()
        })
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load a config file named on the command line. Unlike the implicit
/// layers, a missing or malformed file is an error.
pub fn load_explicit_config(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let file = toml::from_str::<ConfigFile>(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(file.to_partial())
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; logs parse errors and returns None.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/agentctl/agentctl.toml
/// macOS: ~/Library/Application Support/agentctl/agentctl.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agentctl")
        .map(|dirs| dirs.config_dir().join("agentctl.toml"))
}

/// Default state directory: the platform data dir, or `./.agentctl`.
fn default_home() -> PathBuf {
    directories::ProjectDirs::from("", "", "agentctl")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./.agentctl"))
}
