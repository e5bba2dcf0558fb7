//! Core vocabulary shared by every sparcflow crate: workflow modes, phase
//! identifiers and configuration value sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing a [`Mode`] or [`PhaseId`] from text fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseVariantError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

/// Top-level workflow kind. Each mode owns a contiguous run of phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Design,
    Build,
    Debug,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Design, Mode::Build, Mode::Debug];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Mode::Design => "design",
            Mode::Build => "build",
            Mode::Debug => "debug",
        }
    }

    /// Phases belonging to this mode, in execution order.
    #[must_use]
    pub const fn phases(self) -> &'static [PhaseId] {
        match self {
            Mode::Design => &[
                PhaseId::Specification,
                PhaseId::Pseudocode,
                PhaseId::Architecture,
                PhaseId::Refinement,
                PhaseId::Completion,
            ],
            Mode::Build => &[PhaseId::Implementation, PhaseId::Testing],
            Mode::Debug => &[PhaseId::Analysis, PhaseId::FixGeneration],
        }
    }

    /// Phase a fresh workflow in this mode starts at.
    #[must_use]
    pub const fn initial_phase(self) -> PhaseId {
        match self {
            Mode::Design => PhaseId::Specification,
            Mode::Build => PhaseId::Implementation,
            Mode::Debug => PhaseId::Analysis,
        }
    }

    /// Last phase of the mode; reaching it completes the workflow.
    #[must_use]
    pub const fn terminal_phase(self) -> PhaseId {
        match self {
            Mode::Design => PhaseId::Completion,
            Mode::Build => PhaseId::Testing,
            Mode::Debug => PhaseId::FixGeneration,
        }
    }

    #[must_use]
    pub fn contains(self, phase: PhaseId) -> bool {
        self.phases().contains(&phase)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseVariantError {
                kind: "mode",
                value: s.to_string(),
                expected: Mode::ALL.map(Mode::as_str).join(", "),
            })
    }
}

/// One of the nine named phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    Specification,
    Pseudocode,
    Architecture,
    Refinement,
    Completion,
    Implementation,
    Testing,
    Analysis,
    FixGeneration,
}

impl PhaseId {
    pub const ALL: [PhaseId; 9] = [
        PhaseId::Specification,
        PhaseId::Pseudocode,
        PhaseId::Architecture,
        PhaseId::Refinement,
        PhaseId::Completion,
        PhaseId::Implementation,
        PhaseId::Testing,
        PhaseId::Analysis,
        PhaseId::FixGeneration,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PhaseId::Specification => "specification",
            PhaseId::Pseudocode => "pseudocode",
            PhaseId::Architecture => "architecture",
            PhaseId::Refinement => "refinement",
            PhaseId::Completion => "completion",
            PhaseId::Implementation => "implementation",
            PhaseId::Testing => "testing",
            PhaseId::Analysis => "analysis",
            PhaseId::FixGeneration => "fix_generation",
        }
    }

    /// The mode this phase belongs to.
    #[must_use]
    pub const fn mode(self) -> Mode {
        match self {
            PhaseId::Specification
            | PhaseId::Pseudocode
            | PhaseId::Architecture
            | PhaseId::Refinement
            | PhaseId::Completion => Mode::Design,
            PhaseId::Implementation | PhaseId::Testing => Mode::Build,
            PhaseId::Analysis | PhaseId::FixGeneration => Mode::Debug,
        }
    }

    /// Key under which this phase stores its artifact.
    #[must_use]
    pub const fn artifact_key(self) -> &'static str {
        match self {
            PhaseId::Specification => "requirements",
            PhaseId::Pseudocode => "pseudocode",
            PhaseId::Architecture => "architecture",
            PhaseId::Refinement => "refinement",
            PhaseId::Completion => "completion",
            PhaseId::Implementation => "implementation",
            PhaseId::Testing => "test_plan",
            PhaseId::Analysis => "analysis",
            PhaseId::FixGeneration => "fixes",
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseId {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        PhaseId::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ParseVariantError {
                kind: "phase",
                value: s.to_string(),
                expected: PhaseId::ALL.map(PhaseId::as_str).join(", "),
            })
    }
}

/// Source of a configuration value.
///
/// Precedence: CLI arguments > config file > programmatic overrides > built-in defaults.
/// Serializes to lowercase strings: `"cli"`, `"config"`, `"programmatic"`, `"default"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Cli,
    Config,
    Programmatic,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigSource::Cli => "cli",
            ConfigSource::Config => "config",
            ConfigSource::Programmatic => "programmatic",
            ConfigSource::Default => "default",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase_per_mode() {
        assert_eq!(Mode::Design.initial_phase(), PhaseId::Specification);
        assert_eq!(Mode::Build.initial_phase(), PhaseId::Implementation);
        assert_eq!(Mode::Debug.initial_phase(), PhaseId::Analysis);
    }

    #[test]
    fn test_every_phase_belongs_to_exactly_one_mode() {
        for phase in PhaseId::ALL {
            let owners: Vec<Mode> = Mode::ALL.into_iter().filter(|m| m.contains(phase)).collect();
            assert_eq!(owners, vec![phase.mode()], "phase {phase}");
        }
        let total: usize = Mode::ALL.iter().map(|m| m.phases().len()).sum();
        assert_eq!(total, PhaseId::ALL.len());
    }

    #[test]
    fn test_terminal_phase_is_last_in_mode() {
        for mode in Mode::ALL {
            assert_eq!(mode.phases().last().copied(), Some(mode.terminal_phase()));
            assert_eq!(mode.phases().first().copied(), Some(mode.initial_phase()));
        }
    }

    #[test]
    fn test_serde_names_match_as_str() {
        for phase in PhaseId::ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase.as_str()));
        }
        for mode in Mode::ALL {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode.as_str()));
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("design".parse::<Mode>().unwrap(), Mode::Design);
        assert_eq!(" BUILD ".parse::<Mode>().unwrap(), Mode::Build);
        assert_eq!("fix-generation".parse::<PhaseId>().unwrap(), PhaseId::FixGeneration);
        assert_eq!("fix_generation".parse::<PhaseId>().unwrap(), PhaseId::FixGeneration);

        let err = "deploy".parse::<Mode>().unwrap_err();
        assert_eq!(err.kind, "mode");
        assert!(err.to_string().contains("design, build, debug"));
    }

    #[test]
    fn test_config_source_serialization() {
        assert_eq!(serde_json::to_string(&ConfigSource::Cli).unwrap(), r#""cli""#);
        assert_eq!(ConfigSource::Programmatic.to_string(), "programmatic");
    }
}
