//! On-disk document format of a workflow record.
//!
//! The document is the camelCase JSON of [`WorkflowState`] plus a top-level
//! `schemaVersion` field. Decoding checks the version and the record's
//! structural invariants before handing the state back.

use serde_json::Value;

use crate::state::WorkflowState;

pub const SCHEMA_VERSION: &str = "1";
const VERSION_KEY: &str = "schemaVersion";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schema version '{found}' (expected '{SCHEMA_VERSION}')")]
    UnsupportedVersion { found: String },

    #[error("invalid workflow record: {reason}")]
    Invalid { reason: String },
}

/// Serialize `state` as a pretty-printed, versioned document.
pub fn encode(state: &WorkflowState) -> Result<String, DocumentError> {
    let mut value = serde_json::to_value(state)?;
    if let Value::Object(map) = &mut value {
        map.insert(
            VERSION_KEY.to_string(),
            Value::String(SCHEMA_VERSION.to_string()),
        );
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Parse a document produced by [`encode`].
pub fn decode(text: &str) -> Result<WorkflowState, DocumentError> {
    let mut value: Value = serde_json::from_str(text)?;

    let Value::Object(map) = &mut value else {
        return Err(DocumentError::Invalid {
            reason: "top-level value is not an object".to_string(),
        });
    };

    match map.remove(VERSION_KEY) {
        Some(Value::String(v)) if v == SCHEMA_VERSION => {}
        Some(other) => {
            let found = match other {
                Value::String(s) => s,
                v => v.to_string(),
            };
            return Err(DocumentError::UnsupportedVersion { found });
        }
        None => {
            return Err(DocumentError::UnsupportedVersion {
                found: "<missing>".to_string(),
            });
        }
    }

    let state: WorkflowState = serde_json::from_value(value)?;
    validate(&state)?;
    Ok(state)
}

fn validate(state: &WorkflowState) -> Result<(), DocumentError> {
    if state.progress > 100 {
        return Err(DocumentError::Invalid {
            reason: format!("progress {} exceeds 100", state.progress),
        });
    }
    if !state.current_mode.contains(state.current_phase) {
        return Err(DocumentError::Invalid {
            reason: format!(
                "phase {} does not belong to mode {}",
                state.current_phase, state.current_mode
            ),
        });
    }
    if state.issue_id.is_empty() {
        return Err(DocumentError::Invalid {
            reason: "empty issueId".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{WorkflowInput, create_initial_state};
    use crate::state::{DecisionRecord, ErrorRecord, TransitionRecord};
    use chrono::Utc;
    use proptest::prelude::*;
    use sparcflow_utils::types::{Mode, PhaseId};

    fn populated() -> WorkflowState {
        let mut state =
            create_initial_state(&WorkflowInput::new("t1", Mode::Design, "X", "build X"));
        state.progress = 40;
        state.current_phase = PhaseId::Pseudocode;
        state.set_artifact("requirements", "# Requirements\n- a");
        state.artifacts.insert("draft".to_string(), None);
        state.ai_context.current_agent = Some("architect".to_string());
        state.ai_context.decisions.push(DecisionRecord {
            phase: PhaseId::Specification,
            mode: Mode::Design,
            agent: "spec-writer".to_string(),
            rationale: "initial phase".to_string(),
            confidence: 0.9,
            timestamp: Utc::now(),
        });
        state.metadata.transitions.push(TransitionRecord {
            from: PhaseId::Specification,
            to: Some(PhaseId::Pseudocode),
            condition: "next".to_string(),
            timestamp: Utc::now(),
            success: true,
        });
        state.metadata.errors.push(ErrorRecord {
            phase: PhaseId::Specification,
            kind: "node_failed".to_string(),
            message: "transient".to_string(),
            timestamp: Utc::now(),
        });
        let perf = &mut state.metadata.performance;
        perf.node_execution_times.insert("specification".to_string(), 12);
        perf.tool_usage_counts.insert("template_render".to_string(), 3);
        perf.error_rates.insert("specification".to_string(), 0.5);
        perf.success_rate = 0.5;
        state
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let state = populated();
        let text = encode(&state).unwrap();
        let back = decode(&text).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_document_shape() {
        let text = encode(&populated()).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert!(value["createdAt"].is_string());
        assert_eq!(
            value["metadata"]["performance"]["toolUsageCounts"]["template_render"],
            3
        );
        assert_eq!(value["artifacts"]["draft"], Value::Null);
    }

    #[test]
    fn test_wrong_or_missing_version_is_rejected() {
        let text = encode(&populated()).unwrap();

        let bumped = text.replace("\"schemaVersion\": \"1\"", "\"schemaVersion\": \"2\"");
        assert!(matches!(
            decode(&bumped),
            Err(DocumentError::UnsupportedVersion { found }) if found == "2"
        ));

        let mut value: Value = serde_json::from_str(&text).unwrap();
        value.as_object_mut().unwrap().remove("schemaVersion");
        assert!(matches!(
            decode(&value.to_string()),
            Err(DocumentError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_phase_outside_mode_is_invalid() {
        let mut value: Value = serde_json::from_str(&encode(&populated()).unwrap()).unwrap();
        value["currentPhase"] = Value::String("testing".to_string());
        assert!(matches!(
            decode(&value.to_string()),
            Err(DocumentError::Invalid { .. })
        ));
    }

    #[test]
    fn test_garbage_is_json_error() {
        assert!(matches!(decode("{not json"), Err(DocumentError::Json(_))));
        assert!(matches!(decode("[1,2]"), Err(DocumentError::Invalid { .. })));
    }

    proptest! {
        #[test]
        fn prop_counter_maps_round_trip(
            times in proptest::collection::btree_map("[a-z_]{1,12}", 0u64..1_000_000, 0..8),
            tools in proptest::collection::btree_map("[a-z_]{1,12}", 0u64..1_000, 0..8),
            rates in proptest::collection::btree_map("[a-z_]{1,12}", 0u32..=1000, 0..8),
            progress in 0u8..=100,
        ) {
            let mut state = populated();
            state.progress = progress;
            state.metadata.performance.node_execution_times = times;
            state.metadata.performance.tool_usage_counts = tools;
            state.metadata.performance.error_rates = rates
                .into_iter()
                .map(|(k, v)| (k, f64::from(v) / 1000.0))
                .collect();

            let back = decode(&encode(&state).unwrap()).unwrap();
            prop_assert_eq!(back.progress, state.progress);
            prop_assert_eq!(&back.metadata.performance, &state.metadata.performance);
        }
    }
}
