//! Agent orchestration subsystem.
//!
//! The [`spawner::Spawner`] launches agents and records their exit, the
//! [`tracker::StatusTracker`] answers status queries and reconciles stale
//! records, and [`agent_log`] owns the on-disk log format both rely on.

pub mod agent_log;
pub mod recipe;
pub mod spawner;
pub mod tracker;

pub use recipe::RecipeCatalog;
pub use spawner::{SpawnMode, SpawnedAgent, Spawner};
pub use tracker::{KillOutcome, StatusTracker, WaitOutcome};
