use serde::{Deserialize, Serialize};

use crate::{EventLevel, EventSource};
use taphouse_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureContext {
    /// Stable error code, e.g. `ops.non_zero_exit`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod general;
pub mod operation;
pub mod process;
pub mod reconcile;

pub use general::*;
pub use operation::*;
pub use process::*;
pub use reconcile::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Warnings, errors and debug output
    General(GeneralEvent),

    /// Child process lifecycle
    Process(ProcessEvent),

    /// Operation slot lifecycle and live output
    Operation(OperationEvent),

    /// State refresh after an operation
    Reconcile(ReconcileEvent),
}

impl AppEvent {
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Process(_) => EventSource::PROCESS,
            Self::Operation(_) => EventSource::OPERATION,
            Self::Reconcile(_) => EventSource::RECONCILE,
        }
    }

    /// Severity used when the event is forwarded to tracing
    #[must_use]
    pub fn log_level(&self) -> EventLevel {
        use taphouse_types::OperationStatus;

        match self {
            Self::Process(ProcessEvent::SpawnFailed { .. })
            | Self::Operation(OperationEvent::Finished {
                status: OperationStatus::Failed,
                ..
            }) => EventLevel::Error,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Process(
                ProcessEvent::OutputReadFailed { .. } | ProcessEvent::KillEscalated { .. },
            )
            | Self::Operation(OperationEvent::Rejected { .. })
            | Self::Reconcile(ReconcileEvent::Failed { .. }) => EventLevel::Warn,

            Self::General(GeneralEvent::Debug { .. })
            | Self::Operation(
                OperationEvent::LinesAppended { .. } | OperationEvent::StatusChanged { .. },
            )
            | Self::Reconcile(
                ReconcileEvent::QueryCompleted { .. } | ReconcileEvent::Settling { .. },
            ) => EventLevel::Debug,

            _ => EventLevel::Info,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "taphouse::events::general",
            Self::Process(_) => "taphouse::events::process",
            Self::Operation(_) => "taphouse::events::operation",
            Self::Reconcile(_) => "taphouse::events::reconcile",
        }
    }
}
