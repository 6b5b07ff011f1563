//! Query lifecycle states

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a query is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Received,
    Retrieving,
    Assembling,
    Invoking,
    Completed,
    Degraded,
}

impl QueryState {
    pub fn can_transition_to(self, next: QueryState) -> bool {
        use QueryState::*;
        matches!(
            (self, next),
            (Received, Retrieving)
                | (Retrieving, Assembling)
                | (Assembling, Invoking)
                | (Invoking, Completed)
                | (Invoking, Degraded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Completed | QueryState::Degraded)
    }
}

/// Tracks one query through its states, refusing illegal jumps
#[derive(Debug)]
pub(crate) struct StateTracker {
    query_id: Uuid,
    state: QueryState,
}

impl StateTracker {
    pub(crate) fn new(query_id: Uuid) -> Self {
        Self {
            query_id,
            state: QueryState::Received,
        }
    }

    pub(crate) fn state(&self) -> QueryState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: QueryState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::Internal {
                message: format!("illegal query transition {:?} -> {:?}", self.state, next),
            });
        }
        tracing::debug!(query_id = %self.query_id, from = ?self.state, to = ?next, "Query state");
        self.state = next;
        Ok(())
    }
}
