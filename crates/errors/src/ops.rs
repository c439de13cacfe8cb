//! Operation lifecycle error types

use std::borrow::Cow;

use crate::{PlatformError, UserFacingError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpsError {
    #[error("an operation is already running: {label}")]
    AlreadyRunning { label: String },

    #[error("no operation is running")]
    NotRunning,

    #[error("failed to start {command}: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: PlatformError,
    },

    #[error("{label} exited with code {exit_code}")]
    NonZeroExit {
        label: String,
        exit_code: i32,
        tail: Vec<String>,
    },

    #[error("{label} was cancelled")]
    Cancelled { label: String },

    #[error("{label} was killed by signal (exit code {exit_code})")]
    Killed { label: String, exit_code: i32 },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("missing component: {component}")]
    MissingComponent { component: String },
}

impl UserFacingError for OpsError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::NonZeroExit {
                label,
                exit_code,
                tail,
            } => match tail.last() {
                Some(last) => Cow::Owned(format!("{label} exited with code {exit_code}: {last}")),
                None => Cow::Owned(self.to_string()),
            },
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::AlreadyRunning { .. } => {
                Some("Wait for the current operation to finish or cancel it first.")
            }
            Self::SpawnFailure { source, .. } => source.user_hint(),
            Self::NonZeroExit { .. } => Some("Review the captured output above for details."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NonZeroExit { .. } | Self::Cancelled { .. } | Self::Killed { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::AlreadyRunning { .. } => "ops.already_running",
            Self::NotRunning => "ops.not_running",
            Self::SpawnFailure { .. } => "ops.spawn_failure",
            Self::NonZeroExit { .. } => "ops.non_zero_exit",
            Self::Cancelled { .. } => "ops.cancelled",
            Self::Killed { .. } => "ops.killed",
            Self::InvalidRequest { .. } => "ops.invalid_request",
            Self::MissingComponent { .. } => "ops.missing_component",
        })
    }
}
