//! Configuration management for sparcflow
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > file > programmatic > defaults. The TOML file lives at
//! `.sparcflow/config.toml` and supports `[defaults]` and `[orchestrator]`
//! sections.

mod builder;
mod discovery;
mod model;
mod sources;

pub use builder::ConfigBuilder;
pub use model::{
    CliArgs, Config, DEFAULT_LOCK_TTL_SECS, DEFAULT_MAX_ITERATIONS, DEFAULT_NODE_TIMEOUT_SECS,
    Defaults, MIN_NODE_TIMEOUT_SECS, OnPersistenceError, OrchestratorSection,
    OrchestratorStrategy,
};
pub use sparcflow_utils::error::ConfigError;
pub use sparcflow_utils::types::ConfigSource;
