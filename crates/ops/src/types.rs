//! Types for operations and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taphouse_errors::{OpsError, ReconcileError};
use taphouse_events::FailureContext;
use taphouse_state::RefreshedState;
use taphouse_types::{
    OperationKind, OperationStatus, OutputLine, ProcessExit, TerminationReason,
};

/// The single operation slot owned by the controller
#[derive(Debug, Clone, Default)]
pub struct Operation {
    /// `None` while the slot has never been used or was dismissed
    pub kind: Option<OperationKind>,
    pub label: String,
    pub status: OperationStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub output: Vec<OutputLine>,
    pub exit: Option<ProcessExit>,
    /// Ties the operation's events together
    pub correlation_id: Option<String>,
}

impl Operation {
    pub(crate) fn begin(kind: OperationKind, label: String, correlation_id: String) -> Self {
        Self {
            kind: Some(kind),
            label,
            status: OperationStatus::Idle,
            started_at: Some(Utc::now()),
            output: Vec::new(),
            exit: None,
            correlation_id: Some(correlation_id),
        }
    }

    /// Text of the last `n` output lines, escapes preserved
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<String> {
        let start = self.output.len().saturating_sub(n);
        self.output[start..]
            .iter()
            .map(|line| line.text.clone())
            .collect()
    }
}

/// What reconciliation did after an operation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Reconciliation {
    /// The operation did not succeed, so state was not re-read
    Skipped,
    Refreshed {
        sections: Vec<String>,
        observed_at: DateTime<Utc>,
    },
    /// Displayed state may be stale; the operation outcome is unaffected
    Failed {
        error: ReconcileError,
        failure: FailureContext,
    },
}

impl Reconciliation {
    pub(crate) fn from_result(result: &Result<RefreshedState, ReconcileError>) -> Self {
        match result {
            Ok(refreshed) => Self::Refreshed {
                sections: refreshed
                    .sections()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                observed_at: refreshed.observed_at,
            },
            Err(error) => Self::Failed {
                error: error.clone(),
                failure: FailureContext::from_error(error),
            },
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Final account of one operation, serializable for CLI output
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationReport {
    pub kind: OperationKind,
    pub label: String,
    pub status: OperationStatus,
    pub exit_code: i32,
    pub reason: TerminationReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Number of output lines captured
    pub lines: usize,
    /// Last output lines, kept as diagnostics for failures
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tail: Vec<String>,
    /// Why the operation did not succeed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<OpsError>,
    pub reconciliation: Reconciliation,
}

impl OperationReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Succeeded
    }

    /// Convert to JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, taphouse_errors::Error> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}
