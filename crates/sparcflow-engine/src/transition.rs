//! Phase graph and completion predicate.
//!
//! The standard table is one cycle through all nine phases:
//!
//! ```text
//! specification -> pseudocode -> architecture -> refinement -> completion
//!   -> implementation (build) -> testing -> analysis (debug) -> fix_generation
//!   -> specification (design)
//! ```
//!
//! [`is_complete`] is checked before the table is consulted, so a single run
//! never follows the edge out of a mode's terminal phase.

use std::collections::BTreeMap;

use sparcflow_state::WorkflowState;
use sparcflow_utils::types::{Mode, PhaseId};

/// Condition recorded for an edge that stays inside its mode.
pub const CONDITION_NEXT: &str = "next";

/// Condition recorded when the completion predicate stops a run.
pub const CONDITION_COMPLETE: &str = "complete";

/// Outgoing edge of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub to: PhaseId,
    /// Mode assigned when the edge is followed
    pub mode: Mode,
    pub condition: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("edge {from} -> {to} assigns mode {mode}, but {to} belongs to {}", to.mode())]
    ModeMismatch {
        from: PhaseId,
        to: PhaseId,
        mode: Mode,
    },

    #[error("phase {from} has more than one outgoing edge")]
    DuplicateEdge { from: PhaseId },
}

/// Pure lookup from the current phase to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    edges: BTreeMap<PhaseId, Edge>,
}

impl TransitionTable {
    /// The documented nine-phase cycle.
    #[must_use]
    pub fn standard() -> Self {
        let edges = PhaseId::ALL
            .iter()
            .zip(PhaseId::ALL.iter().cycle().skip(1))
            .map(|(from, to)| (*from, edge(*from, *to, to.mode())))
            .collect();
        Self { edges }
    }

    /// Build a table from `(from, to, mode)` triples.
    ///
    /// # Errors
    ///
    /// Rejects an edge whose target does not belong to the mode it assigns,
    /// and a phase listed twice as a source.
    pub fn from_edges(
        triples: impl IntoIterator<Item = (PhaseId, PhaseId, Mode)>,
    ) -> Result<Self, TransitionError> {
        let mut edges = BTreeMap::new();
        for (from, to, mode) in triples {
            if !mode.contains(to) {
                return Err(TransitionError::ModeMismatch { from, to, mode });
            }
            if edges.insert(from, edge(from, to, mode)).is_some() {
                return Err(TransitionError::DuplicateEdge { from });
            }
        }
        Ok(Self { edges })
    }

    /// Edge out of `phase`; `None` means no further transition.
    #[must_use]
    pub fn next(&self, phase: PhaseId) -> Option<&Edge> {
        self.edges.get(&phase)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn edge(from: PhaseId, to: PhaseId, mode: Mode) -> Edge {
    let condition = if from.mode() == mode {
        CONDITION_NEXT.to_string()
    } else {
        format!("enter_{mode}")
    };
    Edge {
        to,
        mode,
        condition,
    }
}

/// True once the state needs no further phase in this run.
#[must_use]
pub fn is_complete(state: &WorkflowState) -> bool {
    state.progress >= 100 || state.current_phase == state.current_mode.terminal_phase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sparcflow_state::{WorkflowInput, create_initial_state};

    fn state(mode: Mode, phase: PhaseId, progress: u8) -> WorkflowState {
        let mut state = create_initial_state(&WorkflowInput::new("t", mode, "X", "d"));
        state.current_phase = phase;
        state.progress = progress;
        state
    }

    #[test]
    fn test_every_phase_has_an_edge() {
        let table = TransitionTable::standard();
        assert_eq!(table.len(), 9);
        for phase in PhaseId::ALL {
            assert!(table.next(phase).is_some(), "{phase} has no edge");
        }
    }

    #[test]
    fn test_nine_steps_close_the_cycle() {
        let table = TransitionTable::standard();
        let mut phase = PhaseId::Specification;
        for _ in 0..9 {
            phase = table.next(phase).unwrap().to;
        }
        assert_eq!(phase, PhaseId::Specification);
    }

    #[test]
    fn test_mode_changes_on_three_edges() {
        let table = TransitionTable::standard();

        let build = table.next(PhaseId::Completion).unwrap();
        assert_eq!((build.to, build.mode), (PhaseId::Implementation, Mode::Build));
        assert_eq!(build.condition, "enter_build");

        let debug = table.next(PhaseId::Testing).unwrap();
        assert_eq!((debug.to, debug.mode), (PhaseId::Analysis, Mode::Debug));

        let design = table.next(PhaseId::FixGeneration).unwrap();
        assert_eq!((design.to, design.mode), (PhaseId::Specification, Mode::Design));

        let changing = PhaseId::ALL
            .iter()
            .filter(|p| table.next(**p).unwrap().condition != CONDITION_NEXT)
            .count();
        assert_eq!(changing, 3);
    }

    #[test]
    fn test_custom_table_validation() {
        let ok = TransitionTable::from_edges([
            (PhaseId::Specification, PhaseId::Pseudocode, Mode::Design),
            (PhaseId::Pseudocode, PhaseId::Specification, Mode::Design),
        ])
        .unwrap();
        assert_eq!(ok.next(PhaseId::Pseudocode).unwrap().to, PhaseId::Specification);
        assert!(ok.next(PhaseId::Architecture).is_none());

        assert_eq!(
            TransitionTable::from_edges([(PhaseId::Completion, PhaseId::Testing, Mode::Design)]),
            Err(TransitionError::ModeMismatch {
                from: PhaseId::Completion,
                to: PhaseId::Testing,
                mode: Mode::Design,
            })
        );

        assert!(matches!(
            TransitionTable::from_edges([
                (PhaseId::Testing, PhaseId::Analysis, Mode::Debug),
                (PhaseId::Testing, PhaseId::Implementation, Mode::Build),
            ]),
            Err(TransitionError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn test_terminal_phases_are_complete() {
        assert!(is_complete(&state(Mode::Design, PhaseId::Completion, 0)));
        assert!(is_complete(&state(Mode::Build, PhaseId::Testing, 0)));
        assert!(is_complete(&state(Mode::Debug, PhaseId::FixGeneration, 0)));
        assert!(is_complete(&state(Mode::Design, PhaseId::Pseudocode, 100)));
        assert!(!is_complete(&state(Mode::Design, PhaseId::Refinement, 99)));
        assert!(!is_complete(&state(Mode::Debug, PhaseId::Analysis, 50)));
    }

    proptest! {
        #[test]
        fn prop_standard_edges_keep_phase_in_mode(index in 0usize..9) {
            let table = TransitionTable::standard();
            let from = PhaseId::ALL[index];
            let edge = table.next(from).unwrap();
            prop_assert!(edge.mode.contains(edge.to));
            prop_assert_eq!(edge.to, PhaseId::ALL[(index + 1) % 9]);
        }

        #[test]
        fn prop_progress_at_least_100_is_complete(
            index in 0usize..9,
            progress in 100u8..=u8::MAX,
        ) {
            let phase = PhaseId::ALL[index];
            prop_assert!(is_complete(&state(phase.mode(), phase, progress)));
        }
    }
}
