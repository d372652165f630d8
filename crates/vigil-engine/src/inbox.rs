//! Priority-resolving buffer of client-submitted actions.
//!
//! [`ActionInbox`] accepts actions from any number of producer threads
//! and hands the tick driver an atomic snapshot of everything buffered
//! since the previous drain.
//!
//! # Merge rule
//!
//! Per session, at most one action is buffered per action name. A new
//! action with the same name replaces the buffered one only when its
//! priority is strictly greater; otherwise it is discarded.

use std::sync::Mutex;

use indexmap::IndexMap;
use tracing::trace;
use vigil_core::{Action, ActionBatch, SessionId};

use crate::sync::lock;

/// What [`ActionInbox::submit`] did with an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No action of that name was buffered for the session.
    Inserted,
    /// The buffered action had a strictly lower priority and was replaced.
    Replaced,
    /// The buffered action had an equal or higher priority and was kept.
    Discarded,
}

/// Concurrency-safe, per-session action buffer.
#[derive(Debug, Default)]
pub struct ActionInbox {
    pending: Mutex<IndexMap<SessionId, IndexMap<String, Action>>>,
}

impl ActionInbox {
    /// Create an empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `raw` and merge the resulting action.
    ///
    /// Never rejects input: a malformed payload becomes a name-only action
    /// named after the raw text.
    pub fn submit(&self, session: SessionId, raw: &str) -> MergeOutcome {
        self.submit_action(Action::parse(session, raw))
    }

    /// Merge an already-built action.
    pub fn submit_action(&self, action: Action) -> MergeOutcome {
        let mut pending = lock(&self.pending);
        let slots = pending.entry(action.session.clone()).or_default();
        let outcome = match slots.get_mut(&action.name) {
            None => {
                slots.insert(action.name.clone(), action);
                MergeOutcome::Inserted
            }
            Some(buffered) if action.priority > buffered.priority => {
                *buffered = action;
                MergeOutcome::Replaced
            }
            Some(_) => MergeOutcome::Discarded,
        };
        trace!(?outcome, "action merged");
        outcome
    }

    /// Atomically remove and return everything buffered.
    pub fn drain(&self) -> ActionBatch {
        let pending = std::mem::take(&mut *lock(&self.pending));
        pending
            .into_values()
            .flat_map(IndexMap::into_values)
            .collect()
    }

    /// Number of buffered actions across all sessions.
    pub fn len(&self) -> usize {
        lock(&self.pending).values().map(IndexMap::len).sum()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
