//! Authoritative method state by replaying completed session history.
//!
//! The cached `state` on a method instance can be stale: a session built
//! from the instance may not have been finalized yet when another session is
//! created against it (duplicating a session, overlapping sessions). The
//! reconciler therefore derives the current state from the most recent
//! completed session instead of trusting the cache.

use std::sync::Arc;

use log::debug;

use crate::errors::Result;
use crate::methods::{dispatcher, MethodInstance};
use crate::sessions::{merge_performed_sets, SessionRepositoryTrait};

/// The state a new session exercise must be planned from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMethodState {
    pub config: serde_json::Value,
    pub state: serde_json::Value,
}

pub struct StateReconciler {
    sessions: Arc<dyn SessionRepositoryTrait>,
}

impl StateReconciler {
    pub fn new(sessions: Arc<dyn SessionRepositoryTrait>) -> Self {
        Self { sessions }
    }

    /// Resolve the authoritative config/state for an instance.
    ///
    /// Replays the most recent completed session bound to the instance:
    /// all bound exercises share the same frozen `state_at_start`, their
    /// performed sets are merged, and the result is applied against the
    /// **current** instance config (config edits apply going forward). When
    /// the replay did not complete, the frozen start state stands. With no
    /// history at all, the cached instance fields are the only state that
    /// can exist and are used as-is.
    pub fn resolve(
        &self,
        user_id: &str,
        instance: &MethodInstance,
    ) -> Result<ResolvedMethodState> {
        let history = self
            .sessions
            .list_completed_sessions_for_instance(user_id, &instance.id)?;

        for session in &history {
            let bound = session.exercises_for_instance(&instance.id);
            let Some(first) = bound.first() else {
                continue;
            };
            let Some(source) = first.source.method() else {
                continue;
            };

            let performed = merge_performed_sets(&bound);
            let applied = dispatcher::apply_result(
                instance.kind,
                &instance.config,
                &source.state_at_start,
                &performed,
            )?;

            debug!(
                "Reconciled method instance {} from session {} (completed: {})",
                instance.id, session.id, applied.completed
            );

            let state = if applied.completed {
                applied.state
            } else {
                source.state_at_start.clone()
            };
            return Ok(ResolvedMethodState {
                config: instance.config.clone(),
                state,
            });
        }

        // Reconciliation miss: no completed history, cached fields stand.
        Ok(ResolvedMethodState {
            config: instance.config.clone(),
            state: instance.state.clone(),
        })
    }
}
