//! Operation controller events

use serde::{Deserialize, Serialize};
use taphouse_types::{OperationKind, OperationStatus, OutputLine};

use super::FailureContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OperationEvent {
    /// A new operation took the slot
    Started { kind: OperationKind, label: String },

    /// A second start was refused while one was running
    Rejected {
        label: String,
        running_label: String,
    },

    /// Lines appended to the operation log, `first_index` is the position of
    /// the first line in the full log
    LinesAppended {
        first_index: usize,
        lines: Vec<OutputLine>,
    },

    StatusChanged {
        from: OperationStatus,
        to: OperationStatus,
    },

    /// Terminal state reached
    Finished {
        status: OperationStatus,
        exit_code: i32,
        duration_ms: u64,
        failure: Option<FailureContext>,
    },
}
