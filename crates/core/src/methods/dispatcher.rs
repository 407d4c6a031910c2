//! Routes a method kind to its progression engine.
//!
//! The single place that branches on [`MethodKind`]; everything else goes
//! through these functions with raw persisted blobs.

use serde_json::Value;

use crate::errors::{Error, Result};

use super::wendler::Lift;
use super::{bilbo, wendler, MethodKind, PerformedSet, PlannedSet};

/// A planned attempt plus the normalized blobs it was computed from.
///
/// Callers freeze `config`/`state` into the session exercise so the session
/// stays reproducible after later instance edits.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAttempt {
    pub planned_sets: Vec<PlannedSet>,
    pub config: Value,
    pub state: Value,
}

/// The state produced by applying a session result.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedResult {
    pub state: Value,
    pub completed: bool,
}

fn wendler_binding(binding: Option<Lift>) -> Result<Lift> {
    binding.ok_or_else(|| Error::validation("Wendler 5/3/1 requires a lift binding"))
}

/// Normalize raw config/state blobs for a method kind.
pub fn normalize(kind: MethodKind, raw_config: &Value, raw_state: &Value) -> Result<(Value, Value)> {
    match kind {
        MethodKind::Bilbo => {
            let config = bilbo::normalize_config(raw_config);
            let state = bilbo::normalize_state(raw_state, &config);
            Ok((serde_json::to_value(config)?, serde_json::to_value(state)?))
        }
        MethodKind::Wendler531 => {
            let config = wendler::normalize_config(raw_config);
            let state = wendler::normalize_state(raw_state, &config);
            Ok((serde_json::to_value(config)?, serde_json::to_value(state)?))
        }
    }
}

/// Compute the next attempt for a method binding from raw persisted blobs.
pub fn plan_next_attempt(
    kind: MethodKind,
    binding: Option<Lift>,
    raw_config: &Value,
    raw_state: &Value,
) -> Result<PlannedAttempt> {
    match kind {
        MethodKind::Bilbo => {
            let config = bilbo::normalize_config(raw_config);
            let state = bilbo::normalize_state(raw_state, &config);
            Ok(PlannedAttempt {
                planned_sets: bilbo::plan_next_attempt(&config, &state),
                config: serde_json::to_value(config)?,
                state: serde_json::to_value(state)?,
            })
        }
        MethodKind::Wendler531 => {
            let lift = wendler_binding(binding)?;
            let config = wendler::normalize_config(raw_config);
            let state = wendler::normalize_state(raw_state, &config);
            Ok(PlannedAttempt {
                planned_sets: wendler::plan_next_attempt(&config, &state, lift),
                config: serde_json::to_value(config)?,
                state: serde_json::to_value(state)?,
            })
        }
    }
}

/// Apply a recorded result to raw persisted blobs.
pub fn apply_result(
    kind: MethodKind,
    raw_config: &Value,
    raw_state: &Value,
    performed: &[PerformedSet],
) -> Result<AppliedResult> {
    match kind {
        MethodKind::Bilbo => {
            let config = bilbo::normalize_config(raw_config);
            let state = bilbo::normalize_state(raw_state, &config);
            let (next, completed) = bilbo::apply_result(&config, &state, performed);
            Ok(AppliedResult {
                state: serde_json::to_value(next)?,
                completed,
            })
        }
        MethodKind::Wendler531 => {
            let config = wendler::normalize_config(raw_config);
            let state = wendler::normalize_state(raw_state, &config);
            let (next, completed) = wendler::apply_result(&config, &state, performed);
            Ok(AppliedResult {
                state: serde_json::to_value(next)?,
                completed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn plans_bilbo_without_a_binding() {
        let attempt =
            plan_next_attempt(MethodKind::Bilbo, None, &json!({}), &json!({})).unwrap();
        assert_eq!(attempt.planned_sets.len(), 1);
        assert_eq!(attempt.state["currentWeight"], json!(20.0));
    }

    #[test]
    fn wendler_requires_a_lift_binding() {
        let err = plan_next_attempt(MethodKind::Wendler531, None, &json!({}), &json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn applies_results_through_the_matching_engine() {
        let performed = vec![PerformedSet {
            id: "set-1".to_string(),
            weight: dec!(20),
            reps: 16,
            rir: None,
            done: Some(true),
        }];
        let applied =
            apply_result(MethodKind::Bilbo, &json!({}), &json!({}), &performed).unwrap();
        assert!(applied.completed);
        assert_eq!(applied.state["currentWeight"], json!(22.5));
    }
}
