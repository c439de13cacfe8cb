//! Process spawning and platform errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Errors raised while launching or talking to an external process
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlatformError {
    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("permission denied: {command} - {message}")]
    PermissionDenied { command: String, message: String },

    #[error("process execution failed: {command} - {message}")]
    ProcessExecutionFailed { command: String, message: String },

    #[error("failed to read process output: {message}")]
    OutputReadFailed { message: String },

    #[error("platform capability not available: {capability}")]
    CapabilityUnavailable { capability: String },
}

impl PlatformError {
    /// Classify an `io::Error` returned by `spawn` for the given command
    #[must_use]
    pub fn from_spawn(command: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::CommandNotFound {
                command: command.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                command: command.to_string(),
                message: err.to_string(),
            },
            _ => Self::ProcessExecutionFailed {
                command: command.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Shell-style exit code reported for a process that never started
    #[must_use]
    pub fn spawn_exit_code(&self) -> i32 {
        match self {
            Self::CommandNotFound { .. } => 127,
            Self::PermissionDenied { .. } => 126,
            _ => -1,
        }
    }
}

impl UserFacingError for PlatformError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandNotFound { .. } => {
                Some("Check that the command is installed and on your PATH.")
            }
            Self::PermissionDenied { .. } => Some("Check the executable's permissions."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::CommandNotFound { .. } => "platform.command_not_found",
            Self::PermissionDenied { .. } => "platform.permission_denied",
            Self::ProcessExecutionFailed { .. } => "platform.process_execution_failed",
            Self::OutputReadFailed { .. } => "platform.output_read_failed",
            Self::CapabilityUnavailable { .. } => "platform.capability_unavailable",
        })
    }
}
