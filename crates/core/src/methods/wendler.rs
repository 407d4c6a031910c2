//! Wendler-style 5/3/1: four-week periodized progression over four lifts.
//!
//! State tracks the week index and a training max per lift. Weeks 1-3
//! prescribe three percentage sets with an AMRAP final set; week 4 is a
//! deload. Completing week 4 starts the next cycle and raises each training
//! max by its lift-class increment.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{int_or, weight_or, PerformedSet, PlannedSet, SetKind};

/// The four lifts a 5/3/1 instance covers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Lift {
    Squat,
    Bench,
    Deadlift,
    Press,
}

impl Lift {
    pub const ALL: [Lift; 4] = [Lift::Squat, Lift::Bench, Lift::Deadlift, Lift::Press];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lift::Squat => "squat",
            Lift::Bench => "bench",
            Lift::Deadlift => "deadlift",
            Lift::Press => "press",
        }
    }

    pub fn lift_class(&self) -> LiftClass {
        match self {
            Lift::Bench | Lift::Press => LiftClass::Upper,
            Lift::Squat | Lift::Deadlift => LiftClass::Lower,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiftClass {
    Upper,
    Lower,
}

fn default_training_max() -> Decimal {
    Decimal::new(60, 0)
}

fn default_rounding_increment() -> Decimal {
    Decimal::new(25, 1)
}

fn default_upper_increment() -> Decimal {
    Decimal::new(25, 1)
}

fn default_lower_increment() -> Decimal {
    Decimal::new(5, 0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WendlerConfig {
    pub training_maxes: BTreeMap<Lift, Decimal>,
    pub rounding_increment: Decimal,
    pub upper_increment: Decimal,
    pub lower_increment: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WendlerState {
    pub week: i32,
    pub cycle: i32,
    pub training_maxes: BTreeMap<Lift, Decimal>,
}

fn lift_map(raw: Option<&Value>, fallback: impl Fn(Lift) -> Decimal) -> BTreeMap<Lift, Decimal> {
    let obj = raw.and_then(Value::as_object);
    Lift::ALL
        .iter()
        .map(|lift| {
            let value = obj
                .and_then(|map| map.get(lift.as_str()))
                .map(|v| weight_or(Some(v), fallback(*lift)))
                .unwrap_or_else(|| fallback(*lift));
            (*lift, value)
        })
        .collect()
}

/// Coerce a persisted config blob; every lift always ends up with a
/// training max.
pub fn normalize_config(raw: &Value) -> WendlerConfig {
    WendlerConfig {
        training_maxes: lift_map(raw.get("trainingMaxes"), |_| default_training_max()),
        rounding_increment: weight_or(raw.get("roundingIncrement"), default_rounding_increment()),
        upper_increment: weight_or(raw.get("upperIncrement"), default_upper_increment()),
        lower_increment: weight_or(raw.get("lowerIncrement"), default_lower_increment()),
    }
}

/// Coerce a persisted state blob, seeding training maxes from the config.
pub fn normalize_state(raw: &Value, config: &WendlerConfig) -> WendlerState {
    let seeded = config.training_maxes.clone();
    WendlerState {
        week: int_or(raw.get("week"), 1).clamp(1, 4),
        cycle: int_or(raw.get("cycle"), 1).max(1),
        training_maxes: lift_map(raw.get("trainingMaxes"), |lift| {
            seeded
                .get(&lift)
                .copied()
                .unwrap_or_else(default_training_max)
        }),
    }
}

/// Round a weight half-up to the nearest multiple of `increment`.
/// Idempotent: re-rounding an already rounded weight is a no-op.
pub fn round_to_increment(weight: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return weight;
    }
    let steps = (weight / increment)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    (steps * increment).normalize()
}

/// Percent-of-training-max and target reps per set, by week.
fn week_rows(week: i32) -> [(Decimal, i32); 3] {
    let pct = |n: i64| Decimal::new(n, 2);
    match week {
        1 => [(pct(65), 5), (pct(75), 5), (pct(85), 5)],
        2 => [(pct(70), 3), (pct(80), 3), (pct(90), 3)],
        3 => [(pct(75), 5), (pct(85), 3), (pct(95), 1)],
        // Week 4: deload, reduced percentages, never AMRAP.
        _ => [(pct(40), 5), (pct(50), 5), (pct(60), 5)],
    }
}

/// Three percentage sets for one lift at the current week.
pub fn plan_next_attempt(
    config: &WendlerConfig,
    state: &WendlerState,
    lift: Lift,
) -> Vec<PlannedSet> {
    let training_max = state
        .training_maxes
        .get(&lift)
        .copied()
        .unwrap_or_else(default_training_max);
    let deload = state.week == 4;

    week_rows(state.week)
        .iter()
        .enumerate()
        .map(|(index, &(pct, reps))| {
            let amrap = !deload && index == 2;
            let kind = if deload {
                SetKind::Deload
            } else if index == 2 {
                SetKind::Top
            } else {
                SetKind::Work
            };
            PlannedSet {
                id: format!("set-{}", index + 1),
                kind,
                weight: round_to_increment(training_max * pct, config.rounding_increment),
                target_reps: Some(reps),
                amrap,
                label: format!(
                    "{}% × {}{}",
                    (pct * Decimal::ONE_HUNDRED).normalize(),
                    reps,
                    if amrap { "+" } else { "" }
                ),
            }
        })
        .collect()
}

/// Next state after a session touching this instance.
///
/// Completion is any recorded set. Weeks 1-3 advance the week; finishing the
/// deload week starts the next cycle and bumps every training max by its
/// lift-class increment.
pub fn apply_result(
    config: &WendlerConfig,
    state: &WendlerState,
    performed: &[PerformedSet],
) -> (WendlerState, bool) {
    if performed.is_empty() {
        return (state.clone(), false);
    }

    if state.week < 4 {
        let mut next = state.clone();
        next.week += 1;
        return (next, true);
    }

    let training_maxes = state
        .training_maxes
        .iter()
        .map(|(lift, max)| {
            let increment = match lift.lift_class() {
                LiftClass::Upper => config.upper_increment,
                LiftClass::Lower => config.lower_increment,
            };
            (*lift, *max + increment)
        })
        .collect();

    (
        WendlerState {
            week: 1,
            cycle: state.cycle + 1,
            training_maxes,
        },
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn state_for_week(week: i32) -> WendlerState {
        normalize_state(&json!({ "week": week }), &normalize_config(&json!({})))
    }

    fn one_performed_set() -> Vec<PerformedSet> {
        vec![PerformedSet {
            id: "set-3".to_string(),
            weight: dec!(60),
            reps: 8,
            rir: None,
            done: Some(true),
        }]
    }

    #[test]
    fn config_defaults_cover_every_lift() {
        let config = normalize_config(&json!({ "trainingMaxes": { "bench": 80 } }));
        assert_eq!(config.training_maxes[&Lift::Bench], dec!(80));
        assert_eq!(config.training_maxes[&Lift::Squat], dec!(60));
        assert_eq!(config.training_maxes.len(), 4);
        assert_eq!(config.rounding_increment, dec!(2.5));
    }

    #[test]
    fn week_one_bench_weights_round_to_increment() {
        let config = normalize_config(&json!({
            "trainingMaxes": { "bench": 80 },
            "roundingIncrement": 2.5,
        }));
        let state = normalize_state(&json!({}), &config);
        let sets = plan_next_attempt(&config, &state, Lift::Bench);

        let weights: Vec<Decimal> = sets.iter().map(|s| s.weight).collect();
        assert_eq!(weights, vec![dec!(52.5), dec!(60), dec!(67.5)]);
        assert!(!sets[0].amrap && !sets[1].amrap && sets[2].amrap);
        assert_eq!(sets[2].label, "85% × 5+");
    }

    #[test]
    fn deload_week_has_no_amrap_and_reduced_load() {
        let config = normalize_config(&json!({ "trainingMaxes": { "squat": 100 } }));
        let sets = plan_next_attempt(&config, &state_for_week(4), Lift::Squat);
        assert!(sets.iter().all(|s| !s.amrap));
        assert!(sets.iter().all(|s| s.kind == SetKind::Deload));
        assert_eq!(sets[0].weight, dec!(40));
        assert_eq!(sets[2].weight, dec!(60));
    }

    #[test]
    fn rounding_is_idempotent_and_a_multiple_of_the_increment() {
        let increment = dec!(2.5);
        for raw in [dec!(51.24), dec!(53.75), dec!(68.0), dec!(0.1)] {
            let rounded = round_to_increment(raw, increment);
            assert_eq!(round_to_increment(rounded, increment), rounded);
            assert_eq!((rounded / increment) % Decimal::ONE, Decimal::ZERO);
        }
    }

    #[test]
    fn weeks_one_to_three_advance_week_only() {
        let config = normalize_config(&json!({}));
        for week in 1..=3 {
            let state = state_for_week(week);
            let (next, completed) = apply_result(&config, &state, &one_performed_set());
            assert!(completed);
            assert_eq!(next.week, week + 1);
            assert_eq!(next.cycle, state.cycle);
            assert_eq!(next.training_maxes, state.training_maxes);
        }
    }

    #[test]
    fn deload_completion_starts_next_cycle_with_class_increments() {
        let config = normalize_config(&json!({
            "trainingMaxes": { "squat": 100, "bench": 80, "deadlift": 120, "press": 50 },
            "upperIncrement": 2.5,
            "lowerIncrement": 5,
        }));
        let state = normalize_state(&json!({ "week": 4, "cycle": 2 }), &config);

        let (next, completed) = apply_result(&config, &state, &one_performed_set());
        assert!(completed);
        assert_eq!(next.week, 1);
        assert_eq!(next.cycle, 3);
        assert_eq!(next.training_maxes[&Lift::Squat], dec!(105));
        assert_eq!(next.training_maxes[&Lift::Deadlift], dec!(125));
        assert_eq!(next.training_maxes[&Lift::Bench], dec!(82.5));
        assert_eq!(next.training_maxes[&Lift::Press], dec!(52.5));
    }

    #[test]
    fn no_recorded_sets_leaves_state_unchanged() {
        let config = normalize_config(&json!({}));
        let state = state_for_week(2);
        let (next, completed) = apply_result(&config, &state, &[]);
        assert!(!completed);
        assert_eq!(next, state);
    }

    #[test]
    fn malformed_state_clamps_week_and_cycle() {
        let config = normalize_config(&json!({}));
        let state = normalize_state(&json!({ "week": 99, "cycle": -3 }), &config);
        assert_eq!(state.week, 4);
        assert_eq!(state.cycle, 1);
    }
}
