//! Post-operation state refresh events

use serde::{Deserialize, Serialize};

use super::FailureContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ReconcileEvent {
    Started {
        trigger: String,
        queries: Vec<String>,
    },

    /// Waiting before re-reading state that lags the controlling command
    Settling { delay_ms: u64 },

    QueryCompleted { query: String, items: usize },

    Completed { queries: usize, duration_ms: u64 },

    Failed {
        query: String,
        failure: FailureContext,
    },
}
