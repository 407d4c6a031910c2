//! Bilbo method: single-set AMRAP ladder progression.
//!
//! One top set per session at the current weight. Beating the reset
//! threshold moves the weight up by the increment; hitting it or less drops
//! the ladder back to the start weight. A session with no recorded reps does
//! not advance the state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{reps_or, weight_or, PerformedSet, PlannedSet, SetKind};

fn default_start_weight() -> Decimal {
    Decimal::new(20, 0)
}

fn default_increment_weight() -> Decimal {
    Decimal::new(25, 1)
}

const DEFAULT_RESET_AT_REPS: i32 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilboConfig {
    pub start_weight: Decimal,
    pub increment_weight: Decimal,
    pub reset_at_reps: i32,
}

impl Default for BilboConfig {
    fn default() -> Self {
        Self {
            start_weight: default_start_weight(),
            increment_weight: default_increment_weight(),
            reset_at_reps: DEFAULT_RESET_AT_REPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilboState {
    pub current_weight: Decimal,
}

/// Coerce a persisted config blob, substituting defaults per field.
pub fn normalize_config(raw: &Value) -> BilboConfig {
    BilboConfig {
        start_weight: weight_or(raw.get("startWeight"), default_start_weight()),
        increment_weight: weight_or(raw.get("incrementWeight"), default_increment_weight()),
        reset_at_reps: reps_or(raw.get("resetAtReps"), DEFAULT_RESET_AT_REPS),
    }
}

/// Coerce a persisted state blob, seeding the weight from the config.
pub fn normalize_state(raw: &Value, config: &BilboConfig) -> BilboState {
    BilboState {
        current_weight: weight_or(raw.get("currentWeight"), config.start_weight),
    }
}

/// One AMRAP top set at the current ladder weight.
pub fn plan_next_attempt(_config: &BilboConfig, state: &BilboState) -> Vec<PlannedSet> {
    vec![PlannedSet {
        id: "set-1".to_string(),
        kind: SetKind::Top,
        weight: state.current_weight,
        target_reps: None,
        amrap: true,
        label: "Top set".to_string(),
    }]
}

/// Next ladder state from the recorded result.
///
/// The completion flag is false when no set with reps was recorded; the
/// returned state is then the input state unchanged.
pub fn apply_result(
    config: &BilboConfig,
    state: &BilboState,
    performed: &[PerformedSet],
) -> (BilboState, bool) {
    let best_reps = performed.iter().map(|set| set.reps).max().unwrap_or(0);
    if best_reps <= 0 {
        return (state.clone(), false);
    }

    let next_weight = if best_reps <= config.reset_at_reps {
        config.start_weight
    } else {
        state.current_weight + config.increment_weight
    };

    (
        BilboState {
            current_weight: next_weight,
        },
        true,
    )
}
