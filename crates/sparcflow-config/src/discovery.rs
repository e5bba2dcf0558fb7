use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use sparcflow_utils::error::ConfigError;
use sparcflow_utils::types::ConfigSource;

use crate::model::{CliArgs, Config, Defaults, OrchestratorSection};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<Defaults>,
    orchestrator: Option<OrchestratorSection>,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for discovery when no explicit path
    /// is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("Failed to get current directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self::defaults();

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.to_string(),
                    });
                }
                Some(explicit.as_std_path().to_path_buf())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)?;
            let utf8 = to_utf8(path)?;
            config.apply_file(file_config, &utf8)?;
            config.config_path = Some(utf8);
        }

        config.apply_cli(cli_args);
        config.validate()?;
        Ok(config)
    }

    /// Walk upward from `start_dir` looking for `.sparcflow/config.toml`.
    ///
    /// The search stops at the first repository root (`.git`, `.hg`, `.svn`).
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(".sparcflow").join("config.toml");
            if candidate.is_file() {
                return Some(candidate);
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }
            current = dir.parent();
        }

        None
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::InvalidFile(format!("Failed to read {}: {e}", path.display()))
            }
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }

    fn apply_file(&mut self, file: TomlConfig, path: &Utf8Path) -> Result<(), ConfigError> {
        let source = ConfigSource::Config;
        // Relative state_dir values are anchored at the project root, the
        // parent of the `.sparcflow/` directory holding the file.
        let project_root = path
            .parent()
            .and_then(Utf8Path::parent)
            .unwrap_or_else(|| Utf8Path::new("."));

        if let Some(defaults) = file.defaults {
            if let Some(v) = defaults.max_iterations {
                self.max_iterations = v;
                self.attribute("max_iterations", source);
            }
            if let Some(v) = defaults.node_timeout {
                self.node_timeout_secs = v;
                self.attribute("node_timeout", source);
            }
            if let Some(v) = defaults.on_persistence_error {
                self.on_persistence_error = v.parse()?;
                self.attribute("on_persistence_error", source);
            }
            if let Some(v) = defaults.lock_ttl_seconds {
                self.lock_ttl_seconds = v;
                self.attribute("lock_ttl_seconds", source);
            }
            if let Some(v) = defaults.state_dir {
                let dir = Utf8PathBuf::from(v);
                self.state_dir = if dir.is_absolute() {
                    dir
                } else {
                    project_root.join(dir)
                };
                self.attribute("state_dir", source);
            }
            if let Some(v) = defaults.verbose {
                self.verbose = v;
                self.attribute("verbose", source);
            }
        }

        if let Some(orchestrator) = file.orchestrator
            && let Some(v) = orchestrator.strategy
        {
            self.strategy = v.parse()?;
            self.attribute("strategy", source);
        }

        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        let source = ConfigSource::Cli;
        if let Some(v) = cli.max_iterations {
            self.max_iterations = v;
            self.attribute("max_iterations", source);
        }
        if let Some(v) = cli.node_timeout {
            self.node_timeout_secs = v;
            self.attribute("node_timeout", source);
        }
        if let Some(v) = cli.on_persistence_error {
            self.on_persistence_error = v;
            self.attribute("on_persistence_error", source);
        }
        if let Some(v) = cli.lock_ttl_seconds {
            self.lock_ttl_seconds = v;
            self.attribute("lock_ttl_seconds", source);
        }
        if let Some(v) = &cli.state_dir {
            self.state_dir = v.clone();
            self.attribute("state_dir", source);
        }
        if let Some(v) = cli.verbose {
            self.verbose = v;
            self.attribute("verbose", source);
        }
        if let Some(v) = cli.strategy {
            self.strategy = v;
            self.attribute("strategy", source);
        }
    }

    pub(crate) fn attribute(&mut self, key: &str, source: ConfigSource) {
        self.source_attribution.insert(key.to_string(), source);
    }
}

fn to_utf8(path: &Path) -> Result<Utf8PathBuf, ConfigError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|p| ConfigError::DiscoveryFailed {
        reason: format!("Config path is not valid UTF-8: {}", p.display()),
    })
}
