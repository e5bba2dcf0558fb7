use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sparcflow_utils::error::ConfigError;
use sparcflow_utils::types::ConfigSource;

/// Driver iteration bound.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Per-node timeout in seconds.
pub const DEFAULT_NODE_TIMEOUT_SECS: u64 = 600;

pub const MIN_NODE_TIMEOUT_SECS: u64 = 1;

/// Age after which a lock held by a live process counts as stale.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

/// What to do when writing the state record fails.
///
/// Artifact file writes are always best-effort; this only governs the
/// `<issue>-state.json` checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnPersistenceError {
    /// Log a warning and keep running
    Log,
    /// Abort the run with a persistence error (default)
    #[default]
    Raise,
}

impl fmt::Display for OnPersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Raise => write!(f, "raise"),
        }
    }
}

impl FromStr for OnPersistenceError {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "raise" => Ok(Self::Raise),
            _ => Err(ConfigError::InvalidValue {
                key: "on_persistence_error".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Which decision policy the driver consults before each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrchestratorStrategy {
    Passthrough,
    #[default]
    RuleBased,
    Capability,
}

impl fmt::Display for OrchestratorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough => write!(f, "passthrough"),
            Self::RuleBased => write!(f, "rule-based"),
            Self::Capability => write!(f, "capability"),
        }
    }
}

impl FromStr for OrchestratorStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "rule-based" => Ok(Self::RuleBased),
            "capability" => Ok(Self::Capability),
            _ => Err(ConfigError::InvalidValue {
                key: "strategy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// `[defaults]` section of config.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub max_iterations: Option<u32>,
    pub node_timeout: Option<u64>,
    pub on_persistence_error: Option<String>,
    pub lock_ttl_seconds: Option<u64>,
    pub state_dir: Option<String>,
    pub verbose: Option<bool>,
}

/// `[orchestrator]` section of config.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorSection {
    pub strategy: Option<String>,
}

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<Utf8PathBuf>,
    pub max_iterations: Option<u32>,
    pub node_timeout: Option<u64>,
    pub on_persistence_error: Option<OnPersistenceError>,
    pub lock_ttl_seconds: Option<u64>,
    pub state_dir: Option<Utf8PathBuf>,
    pub verbose: Option<bool>,
    pub strategy: Option<OrchestratorStrategy>,
}

/// Effective configuration after applying precedence.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_iterations: u32,
    pub node_timeout_secs: u64,
    pub on_persistence_error: OnPersistenceError,
    pub lock_ttl_seconds: u64,
    pub state_dir: Utf8PathBuf,
    pub verbose: bool,
    pub strategy: OrchestratorStrategy,
    /// Config file that contributed values, if any
    pub config_path: Option<Utf8PathBuf>,
    /// Where each effective value came from
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    #[must_use]
    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .copied()
            .unwrap_or(ConfigSource::Default)
    }

    /// Built-in defaults, every value attributed to `ConfigSource::Default`.
    #[must_use]
    pub fn defaults() -> Self {
        let source_attribution = Self::KEYS
            .iter()
            .map(|k| ((*k).to_string(), ConfigSource::Default))
            .collect();

        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            node_timeout_secs: DEFAULT_NODE_TIMEOUT_SECS,
            on_persistence_error: OnPersistenceError::default(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECS,
            state_dir: sparcflow_utils::paths::default_state_dir(),
            verbose: false,
            strategy: OrchestratorStrategy::default(),
            config_path: None,
            source_attribution,
        }
    }

    pub(crate) const KEYS: [&'static str; 7] = [
        "max_iterations",
        "node_timeout",
        "on_persistence_error",
        "lock_ttl_seconds",
        "state_dir",
        "verbose",
        "strategy",
    ];

    /// Reject values the driver cannot work with.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_iterations".to_string(),
                value: "0".to_string(),
            });
        }
        if self.node_timeout_secs < MIN_NODE_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                key: "node_timeout".to_string(),
                value: self.node_timeout_secs.to_string(),
            });
        }
        if self.lock_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "lock_ttl_seconds".to_string(),
                value: "0".to_string(),
            });
        }
        if self.state_dir.as_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "state_dir".to_string(),
                value: String::new(),
            });
        }
        Ok(())
    }
}
