//! Per-instance history read model for the analytics layer.
//!
//! Read-only: derived from completed sessions, never part of the write path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::methods::bilbo::BilboConfig;
use crate::methods::PerformedSet;
use crate::sessions::{merge_performed_sets, WorkoutSession};

/// One completed session's contribution to an instance's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSessionEntry {
    pub session_id: String,
    pub ended_at: DateTime<Utc>,
    pub state_at_start: Value,
    pub performed_sets: Vec<PerformedSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceHistory {
    /// Chronological, oldest first.
    pub entries: Vec<InstanceSessionEntry>,
    /// Indices into `entries` where a new cycle begins (Bilbo only).
    pub cycle_starts: Vec<usize>,
}

/// Build chronological history entries from completed sessions
/// (given most-recent-first, as the repository returns them).
pub fn instance_entries(
    sessions: &[WorkoutSession],
    instance_id: &str,
) -> Vec<InstanceSessionEntry> {
    let mut entries: Vec<InstanceSessionEntry> = sessions
        .iter()
        .filter_map(|session| {
            let ended_at = session.ended_at?;
            let bound = session.exercises_for_instance(instance_id);
            let source = bound.first().and_then(|ex| ex.source.method())?;
            Some(InstanceSessionEntry {
                session_id: session.id.clone(),
                ended_at,
                state_at_start: source.state_at_start.clone(),
                performed_sets: merge_performed_sets(&bound),
            })
        })
        .collect();
    entries.reverse();
    entries
}

fn best_reps(entry: &InstanceSessionEntry) -> i32 {
    entry
        .performed_sets
        .iter()
        .map(|set| set.reps)
        .max()
        .unwrap_or(0)
}

/// Indices of entries that start a new Bilbo cycle.
///
/// The first session ever is the start of cycle 1 by definition. After
/// that, a session starts a new cycle only when the previous session's
/// recorded reps hit the reset threshold. A ladder still sitting at the
/// start weight without a prior reset is not a new cycle.
pub fn bilbo_cycle_starts(entries: &[InstanceSessionEntry], config: &BilboConfig) -> Vec<usize> {
    let mut starts = Vec::new();
    for (index, _) in entries.iter().enumerate() {
        if index == 0 {
            starts.push(0);
            continue;
        }
        let previous_reps = best_reps(&entries[index - 1]);
        if previous_reps > 0 && previous_reps <= config.reset_at_reps {
            starts.push(index);
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn entry(session_id: &str, reps: i32) -> InstanceSessionEntry {
        InstanceSessionEntry {
            session_id: session_id.to_string(),
            ended_at: Utc::now(),
            state_at_start: json!({ "currentWeight": 20 }),
            performed_sets: if reps >= 0 {
                vec![PerformedSet {
                    id: format!("{session_id}:set-1"),
                    weight: dec!(20),
                    reps,
                    rir: None,
                    done: Some(true),
                }]
            } else {
                vec![]
            },
        }
    }

    #[test]
    fn first_session_always_starts_a_cycle() {
        let config = BilboConfig::default();
        let entries = vec![entry("s1", 20)];
        assert_eq!(bilbo_cycle_starts(&entries, &config), vec![0]);
    }

    #[test]
    fn cycle_starts_after_each_reset() {
        let config = BilboConfig::default();
        // 20 reps (progress), 12 reps (reset), then back up the ladder.
        let entries = vec![
            entry("s1", 20),
            entry("s2", 12),
            entry("s3", 19),
            entry("s4", 18),
        ];
        assert_eq!(bilbo_cycle_starts(&entries, &config), vec![0, 2]);
    }

    #[test]
    fn sessions_without_reps_do_not_split_cycles() {
        let config = BilboConfig::default();
        let entries = vec![entry("s1", 20), entry("s2", -1), entry("s3", 17)];
        assert_eq!(bilbo_cycle_starts(&entries, &config), vec![0]);
    }
}
