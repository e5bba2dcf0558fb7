use camino::Utf8PathBuf;
use std::time::Duration;

use sparcflow_utils::error::ConfigError;
use sparcflow_utils::types::ConfigSource;

use crate::model::{Config, OnPersistenceError, OrchestratorStrategy};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Use this when embedding the engine: no files or environment variables
    /// are consulted beyond the default state directory.
    ///
    /// ```rust,no_run
    /// use sparcflow_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .state_dir("/var/lib/sparcflow")
    ///     .node_timeout(Duration::from_secs(120))
    ///     .max_iterations(20)
    ///     .build()
    ///     .expect("valid config");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent builder for [`Config`].
///
/// Every value set here is attributed to `ConfigSource::Programmatic`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    max_iterations: Option<u32>,
    node_timeout: Option<Duration>,
    on_persistence_error: Option<OnPersistenceError>,
    lock_ttl_seconds: Option<u64>,
    state_dir: Option<Utf8PathBuf>,
    verbose: Option<bool>,
    strategy: Option<OrchestratorStrategy>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Per-node timeout. Sub-second precision is truncated to whole seconds.
    #[must_use]
    pub fn node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn on_persistence_error(mut self, policy: OnPersistenceError) -> Self {
        self.on_persistence_error = Some(policy);
        self
    }

    #[must_use]
    pub fn lock_ttl_seconds(mut self, secs: u64) -> Self {
        self.lock_ttl_seconds = Some(secs);
        self
    }

    #[must_use]
    pub fn state_dir(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.state_dir = Some(path.into());
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: OrchestratorStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero iteration bound, a
    /// timeout under one second, a zero lock TTL or an empty state directory.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = Config::defaults();
        let source = ConfigSource::Programmatic;

        if let Some(v) = self.max_iterations {
            config.max_iterations = v;
            config.attribute("max_iterations", source);
        }
        if let Some(v) = self.node_timeout {
            config.node_timeout_secs = v.as_secs();
            config.attribute("node_timeout", source);
        }
        if let Some(v) = self.on_persistence_error {
            config.on_persistence_error = v;
            config.attribute("on_persistence_error", source);
        }
        if let Some(v) = self.lock_ttl_seconds {
            config.lock_ttl_seconds = v;
            config.attribute("lock_ttl_seconds", source);
        }
        if let Some(v) = self.state_dir {
            config.state_dir = v;
            config.attribute("state_dir", source);
        }
        if let Some(v) = self.verbose {
            config.verbose = v;
            config.attribute("verbose", source);
        }
        if let Some(v) = self.strategy {
            config.strategy = v;
            config.attribute("strategy", source);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_programmatic_source() {
        let config = Config::builder()
            .max_iterations(3)
            .node_timeout(Duration::from_secs(5))
            .state_dir("/tmp/sf")
            .on_persistence_error(OnPersistenceError::Log)
            .build()
            .unwrap();

        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.node_timeout(), Duration::from_secs(5));
        assert_eq!(config.state_dir, Utf8PathBuf::from("/tmp/sf"));
        assert_eq!(config.source_of("max_iterations"), ConfigSource::Programmatic);
        assert_eq!(config.source_of("strategy"), ConfigSource::Default);
    }

    #[test]
    fn test_builder_rejects_subsecond_timeout() {
        let err = Config::builder()
            .node_timeout(Duration::from_millis(500))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "node_timeout"));
    }

    #[test]
    fn test_default_state_dir_follows_home() {
        let guard = sparcflow_utils::paths::with_isolated_home();
        let config = Config::builder().build().unwrap();
        assert_eq!(config.state_dir.as_std_path(), guard.path().join("workflows"));
    }
}
