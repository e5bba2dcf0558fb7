//! Decision policies for the sparcflow driver
//!
//! The driver calls [`Orchestrator::decide`] once per iteration, before the
//! node for the current phase runs. Policies annotate `aiContext` (current
//! agent, decision log) and report [`DecisionMetrics`]; the driver folds
//! those into an [`OrchestratorMetrics`] it owns, so no policy keeps shared
//! counters of its own.
//!
//! Three policies ship with the crate:
//! - [`PassthroughOrchestrator`]: no annotation at all
//! - [`RuleBasedOrchestrator`]: fixed agent per phase with a rationale
//! - [`CapabilityOrchestrator`]: asks a generation capability, falls back to
//!   the rule table

mod capability;
mod decision;
mod rules;

pub use capability::{CapabilityOrchestrator, parse_agent};
pub use decision::{Decision, DecisionMetrics, Orchestrator, OrchestratorMetrics};
pub use rules::{PassthroughOrchestrator, RuleBasedOrchestrator, agent_for, known_agents};
