pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod orchestration;
pub mod registry;
pub mod render;
pub mod results;
pub mod summarize;
