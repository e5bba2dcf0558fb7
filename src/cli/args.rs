//! CLI argument definitions and parsing structures
//!
//! Defines the command-line surface with clap: the global configuration
//! flags and the `run`, `status` and `reset` subcommands.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::{CliArgs, Mode, OnPersistenceError, OrchestratorStrategy};

/// sparcflow - resumable multi-phase workflows for tracked issues
#[derive(Parser, Debug)]
#[command(name = "sparcflow")]
#[command(about = "Drive an issue through design, build and debug phases with resumable checkpoints")]
#[command(long_about = r#"
sparcflow runs an issue through a fixed sequence of phases, asking an
orchestrator to pick an agent before each one and checkpointing the workflow
record after every step. An interrupted or bounded run resumes where it stopped.

EXAMPLES:
  # Design a feature from scratch
  sparcflow run PROJ-142 --mode design --title "Rate limiter" \
      --description "Token bucket per API key"

  # Build it, printing the run report as canonical JSON
  sparcflow run PROJ-142 --mode build --title "Rate limiter" --description "..." --json

  # Inspect the stored record
  sparcflow status PROJ-142 --json

  # Start over
  sparcflow reset PROJ-142

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for .sparcflow/config.toml
  Use --config to specify an explicit config file path

MODES:
  design: specification → pseudocode → architecture → refinement → completion
  build:  implementation → testing
  debug:  analysis → fix_generation
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Directory holding workflow records (default: .sparcflow/workflows)
    #[arg(long, global = true)]
    pub state_dir: Option<Utf8PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Orchestrator policy: passthrough, rule-based or capability
    #[arg(long, global = true)]
    pub strategy: Option<OrchestratorStrategy>,

    /// Node timeout in seconds (default: 600, min: 1)
    #[arg(long, global = true)]
    pub node_timeout: Option<u64>,

    /// Node executions allowed per run (default: 10)
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    /// What to do when a checkpoint cannot be written: raise or log
    #[arg(long, global = true)]
    pub on_persistence_error: Option<OnPersistenceError>,

    /// Lock TTL in seconds (default: 3600)
    #[arg(long, global = true)]
    pub lock_ttl_seconds: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Configuration overrides carried by the global flags.
    #[must_use]
    pub fn cli_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            max_iterations: self.max_iterations,
            node_timeout: self.node_timeout,
            on_persistence_error: self.on_persistence_error,
            lock_ttl_seconds: self.lock_ttl_seconds,
            state_dir: self.state_dir.clone(),
            // Only an explicit flag overrides the file
            verbose: self.verbose.then_some(true),
            strategy: self.strategy,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run (or resume) the workflow for an issue
    ///
    /// A stored record in the same mode that has not completed is resumed at
    /// its phase. Otherwise the record is re-entered at the first phase of
    /// the requested mode, keeping earlier artifacts.
    ///
    /// EXAMPLES:
    ///   sparcflow run PROJ-142 --mode design --title "Rate limiter" --description "..."
    ///   sparcflow run bug-7 --mode debug --title "Crash" --description "panic on empty list" --json
    Run {
        /// Issue identifier, e.g. PROJ-142
        issue: String,

        /// Workflow mode: design, build or debug
        #[arg(long)]
        mode: Mode,

        /// Issue title
        #[arg(long)]
        title: String,

        /// Issue description
        #[arg(long)]
        description: String,

        /// Request text for this run (defaults to the description)
        #[arg(long)]
        input: Option<String>,

        /// Print the run report as canonical JSON
        #[arg(long)]
        json: bool,

        /// Also print orchestrator metrics gathered during this run
        #[arg(long)]
        metrics: bool,
    },

    /// Show the stored record of an issue
    ///
    /// EXAMPLES:
    ///   sparcflow status PROJ-142
    ///   sparcflow status PROJ-142 --json
    Status {
        /// Issue identifier
        issue: String,

        /// Output status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete the stored record and artifacts of an issue
    ///
    /// EXAMPLES:
    ///   sparcflow reset PROJ-142
    ///   sparcflow reset PROJ-142 --force
    Reset {
        /// Issue identifier
        issue: String,

        /// Reset even while a lock file names a live process
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Operation name used in error reports.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Status { .. } => "status",
            Self::Reset { .. } => "reset",
        }
    }
}
