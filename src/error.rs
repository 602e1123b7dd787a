use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors related to the persisted agent registry.
///
/// A registry file that fails to parse is never reported through this type;
/// it is treated as an empty registry on load.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to lock registry at {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to launching an agent process.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Recipe not found: {name} (looked for {path})")]
    RecipeMissing { name: String, path: PathBuf },

    #[error("Failed to prepare agent log at {path}: {source}")]
    LogSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn agent process `{command}`: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("Agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors related to agent status queries and control.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Agent not found: {id}")]
    NotFound { id: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors related to summarizing one agent's output.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("Agent not found: {id}")]
    AgentNotFound { id: String },

    #[error("Log file not found: {path}")]
    LogMissing { path: PathBuf },

    #[error("Summary I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize summary: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
